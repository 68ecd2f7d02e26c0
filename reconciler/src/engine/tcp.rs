use super::entrypoint_entries;
use crate::instances::SourceInstance;
use crate::keys::{Field, Protocol, RouterName, router_key};
use crate::types::{EntrySet, TcpRouter};

/// Entries for one TCP router. TCP routers are keyed by their service name and
/// always route through the instance's anchor service.
pub fn router_entries(instance: &SourceInstance, router: &TcpRouter, out: &mut EntrySet) {
    let local_name = RouterName::parse(&router.service).local_name(&instance.name);

    let matched = entrypoint_entries(
        Protocol::Tcp,
        &local_name,
        &instance.entry_points,
        &router.entry_points,
        out,
    );
    if matched == 0 {
        return;
    }

    out.insert(
        router_key(Protocol::Tcp, &local_name, Field::Rule),
        router.rule.clone(),
    );
    out.insert(
        router_key(Protocol::Tcp, &local_name, Field::Service),
        instance.name.clone(),
    );
}
