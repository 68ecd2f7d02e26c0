//! Reconciliation engine.
//!
//! One cycle fetches every instance's routers, maps them into the flattened key
//! schema, removes keys that the previous cycle published but this one no longer
//! wants, and rewrites the full desired state.
//!
//! A router fetch failure removes that instance's router entries for the cycle
//! (its anchor entries stay). With `preserve_on_fetch_failure` set, the entries
//! published by the previous cycle are kept instead.

mod http;
mod tcp;

pub use http::{HttpForwarding, KnownNames};

use crate::config::Config;
use crate::diff::stale_keys;
use crate::instances::{Instance, Instances};
use crate::keys::{Field, Protocol, anchor_key, namespace_prefix, resolve, router_key, routers_prefix};
use crate::metrics_defs::{
    CYCLE_DURATION, DESIRED_ENTRIES, SOURCE_FETCH_ERRORS, STALE_KEYS_DELETED, STORE_ERRORS,
};
use crate::store::{StoreAdapter, StoreError};
use crate::types::EntrySet;
use indexmap::IndexMap;
use serde::Serialize;
use shared::{counter, gauge, histogram};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

/// Summary of one reconciliation cycle.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct CycleReport {
    pub instances: usize,
    /// `<instance>/<resource>` for every router fetch that failed.
    pub failed_fetches: Vec<String>,
    pub entries: usize,
    pub stale_keys: usize,
    pub stale_deleted: usize,
    pub store_errors: usize,
    pub duration_secs: f64,
}

#[derive(Default)]
struct InstanceOutcome {
    entries: EntrySet,
    http_failed: bool,
    tcp_failed: bool,
}

pub struct Reconciler {
    instances: Instances,
    store: Arc<dyn StoreAdapter>,
    forward_middlewares: bool,
    forward_services: bool,
    preserve_on_fetch_failure: bool,
    // Entries published by the last cycle, per instance in configuration order.
    // Replaced wholesale at the end of every cycle.
    published: IndexMap<String, EntrySet>,
    // Keys that should be gone from the store but are not known to be: failed
    // deletions and keys adopted at startup.
    orphans: BTreeSet<String>,
}

impl Reconciler {
    pub fn new(instances: Instances, store: Arc<dyn StoreAdapter>) -> Self {
        Reconciler {
            instances,
            store,
            forward_middlewares: false,
            forward_services: false,
            preserve_on_fetch_failure: false,
            published: IndexMap::new(),
            orphans: BTreeSet::new(),
        }
    }

    pub fn from_config(config: &Config, instances: Instances, store: Arc<dyn StoreAdapter>) -> Self {
        Reconciler::new(instances, store)
            .with_forwarding(config.forward_middlewares, config.forward_services)
            .with_preserve_on_fetch_failure(config.preserve_on_fetch_failure)
    }

    /// Global forwarding defaults. Instances may override either one.
    pub fn with_forwarding(mut self, middlewares: bool, services: bool) -> Self {
        self.forward_middlewares = middlewares;
        self.forward_services = services;
        self
    }

    pub fn with_preserve_on_fetch_failure(mut self, preserve: bool) -> Self {
        self.preserve_on_fetch_failure = preserve;
        self
    }

    /// Marks every key already present under the namespace as a leftover, so the next
    /// cycle removes the ones it does not rewrite.
    pub async fn adopt_existing_keys(&mut self) -> Result<usize, StoreError> {
        let keys = self.store.keys(&namespace_prefix()).await?;
        let count = keys.len();
        self.orphans.extend(keys);
        Ok(count)
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport {
            instances: self.instances.iter().count(),
            ..Default::default()
        };

        let instances = self.instances.clone();
        let mut next = IndexMap::new();

        for instance in instances.iter() {
            let name = &instance.spec.name;
            let mut outcome = self.process_instance(instance).await;

            for (failed, protocol) in [
                (outcome.http_failed, Protocol::Http),
                (outcome.tcp_failed, Protocol::Tcp),
            ] {
                if !failed {
                    continue;
                }
                report.failed_fetches.push(format!("{name}/{}", protocol.as_str()));
                if self.preserve_on_fetch_failure {
                    self.carry_over(name, protocol, &mut outcome.entries);
                }
            }

            next.insert(name.clone(), outcome.entries);
        }

        let desired = flatten(&next);
        report.entries = desired.len();

        let stale = stale_keys(
            self.published
                .values()
                .flat_map(|entries| entries.keys())
                .chain(self.orphans.iter()),
            &desired,
        );
        report.stale_keys = stale.len();

        // Deletions are best effort. Whatever could not be removed is retried next cycle.
        self.orphans = BTreeSet::new();
        if !stale.is_empty() {
            match self.store.delete_keys(&stale).await {
                Ok(()) => {
                    report.stale_deleted = stale.len();
                    counter!(STALE_KEYS_DELETED).increment(stale.len() as u64);
                    tracing::info!(count = stale.len(), "Deleted stale keys");
                }
                Err(e) => {
                    tracing::error!(error = %e, count = stale.len(), "Error deleting stale keys");
                    counter!(STORE_ERRORS, "operation" => "delete").increment(1);
                    report.store_errors += 1;
                    self.orphans = stale;
                }
            }
        }

        if let Err(e) = self.store.upsert(&desired).await {
            tracing::error!(error = %e, count = desired.len(), "Error storing entries");
            counter!(STORE_ERRORS, "operation" => "upsert").increment(1);
            report.store_errors += 1;
        }

        self.published = next;

        report.duration_secs = started.elapsed().as_secs_f64();
        histogram!(CYCLE_DURATION).record(report.duration_secs);
        gauge!(DESIRED_ENTRIES).set(report.entries as f64);

        tracing::info!(
            instances = report.instances,
            entries = report.entries,
            stale = report.stale_keys,
            failed_fetches = report.failed_fetches.len(),
            duration_secs = report.duration_secs,
            "Reconciliation cycle finished"
        );

        report
    }

    /// Anchor entries plus everything derived from the instance's HTTP and TCP routers.
    async fn process_instance(&self, instance: &Instance) -> InstanceOutcome {
        let spec = &instance.spec;
        let mut outcome = InstanceOutcome::default();

        for protocol in [Protocol::Http, Protocol::Tcp] {
            outcome.entries.insert(
                anchor_key(protocol, &spec.name),
                spec.destination_address.clone(),
            );
        }

        match instance.source.http_routers().await {
            Ok(routers) => {
                tracing::info!(server = %spec.name, count = routers.len(), "Retrieved HTTP routers");
                if !routers.is_empty() {
                    let forwarding = self.http_forwarding(instance).await;
                    for router in &routers {
                        http::router_entries(spec, router, &forwarding, &mut outcome.entries);
                    }
                }
            }
            Err(e) => {
                tracing::error!(server = %spec.name, error = %e, "Error fetching HTTP routers");
                counter!(SOURCE_FETCH_ERRORS, "server" => spec.name.clone(), "resource" => "http_routers")
                    .increment(1);
                outcome.http_failed = true;
            }
        }

        match instance.source.tcp_routers().await {
            Ok(routers) => {
                tracing::info!(server = %spec.name, count = routers.len(), "Retrieved TCP routers");
                for router in &routers {
                    tcp::router_entries(spec, router, &mut outcome.entries);
                }
            }
            Err(e) => {
                tracing::error!(server = %spec.name, error = %e, "Error fetching TCP routers");
                counter!(SOURCE_FETCH_ERRORS, "server" => spec.name.clone(), "resource" => "tcp_routers")
                    .increment(1);
                outcome.tcp_failed = true;
            }
        }

        outcome
    }

    /// Fetches the middleware and service lists once per instance, only for the kinds
    /// that are forwarded. A failed list fetch is treated as an empty list.
    async fn http_forwarding(&self, instance: &Instance) -> HttpForwarding {
        let spec = &instance.spec;
        let mut forwarding = HttpForwarding::default();

        if resolve(spec.forward_middlewares, self.forward_middlewares) {
            let known = match instance.source.middlewares().await {
                Ok(middlewares) => KnownNames::new(middlewares.into_iter().map(|m| m.name)),
                Err(e) => {
                    tracing::warn!(server = %spec.name, error = %e, "Error fetching middlewares");
                    counter!(SOURCE_FETCH_ERRORS, "server" => spec.name.clone(), "resource" => "middlewares")
                        .increment(1);
                    KnownNames::default()
                }
            };
            forwarding.middlewares = Some(known);
        }

        if resolve(spec.forward_services, self.forward_services) {
            let known = match instance.source.services().await {
                Ok(services) => KnownNames::new(services.into_iter().map(|s| s.name)),
                Err(e) => {
                    tracing::warn!(server = %spec.name, error = %e, "Error fetching services");
                    counter!(SOURCE_FETCH_ERRORS, "server" => spec.name.clone(), "resource" => "services")
                        .increment(1);
                    KnownNames::default()
                }
            };
            forwarding.services = Some(known);
        }

        forwarding
    }

    /// Copies the router entries `instance` published last cycle for `protocol`.
    fn carry_over(&self, instance: &str, protocol: Protocol, entries: &mut EntrySet) {
        let Some(previous) = self.published.get(instance) else {
            return;
        };
        let prefix = routers_prefix(protocol);
        let kept = previous
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, value)| (key.clone(), value.clone()));

        let before = entries.len();
        entries.extend(kept);
        tracing::warn!(
            server = instance,
            protocol = protocol.as_str(),
            kept = entries.len() - before,
            "Keeping previously published routers after fetch failure"
        );
    }
}

/// Emits one indexed entrypoint entry per (relay entrypoint, local entrypoint) pair the
/// router is bound to, in mapping order. Returns the number of matches.
fn entrypoint_entries(
    protocol: Protocol,
    name: &str,
    entry_points: &IndexMap<String, String>,
    router_entry_points: &[String],
    out: &mut EntrySet,
) -> usize {
    let mut index = 0;
    for (global, local) in entry_points {
        for bound in router_entry_points {
            if bound == local {
                out.insert(
                    router_key(protocol, name, Field::EntryPoint(index)),
                    global.clone(),
                );
                index += 1;
            }
        }
    }
    index
}

/// Union of all per-instance entries. Later instances win on key collisions.
fn flatten(per_instance: &IndexMap<String, EntrySet>) -> EntrySet {
    per_instance
        .values()
        .flat_map(|entries| entries.iter())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
