use super::entrypoint_entries;
use crate::instances::SourceInstance;
use crate::keys::{Field, Protocol, RouterName, router_key};
use crate::types::{EntrySet, HttpRouter};

/// Names already defined on an instance. Matching ignores case.
#[derive(Clone, Debug, Default)]
pub struct KnownNames(Vec<String>);

impl KnownNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KnownNames(names.into_iter().map(|n| n.into().to_lowercase()).collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.0.iter().any(|known| *known == name)
    }
}

/// Per-instance forwarding state, resolved once per cycle.
/// `None` means forwarding of that kind is disabled for the instance.
#[derive(Clone, Debug, Default)]
pub struct HttpForwarding {
    pub services: Option<KnownNames>,
    pub middlewares: Option<KnownNames>,
}

/// Entries for one HTTP router. Routers bound to none of the instance's mapped
/// entrypoints contribute nothing.
pub fn router_entries(
    instance: &SourceInstance,
    router: &HttpRouter,
    forwarding: &HttpForwarding,
    out: &mut EntrySet,
) {
    let local_name = RouterName::parse(&router.name).local_name(&instance.name);

    let matched = entrypoint_entries(
        Protocol::Http,
        &local_name,
        &instance.entry_points,
        &router.entry_points,
        out,
    );
    if matched == 0 {
        return;
    }

    out.insert(
        router_key(Protocol::Http, &local_name, Field::Rule),
        router.rule.clone(),
    );

    // Route through the instance's anchor service unless the service is forwarded.
    let service = match &forwarding.services {
        Some(known) if !known.contains(&local_name) && !known.contains(&router.service) => {
            router.service.clone()
        }
        _ => instance.name.clone(),
    };
    out.insert(router_key(Protocol::Http, &local_name, Field::Service), service);

    if let Some(known) = &forwarding.middlewares {
        for (index, middleware) in router.middlewares.iter().enumerate() {
            if known.contains(middleware) {
                continue;
            }
            out.insert(
                router_key(Protocol::Http, &local_name, Field::Middleware(index)),
                middleware.clone(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{http_router, source_instance};

    fn entries_for(router: &HttpRouter, forwarding: &HttpForwarding) -> EntrySet {
        let instance = source_instance("east", &[("web", "http"), ("websecure", "https")]);
        let mut out = EntrySet::new();
        router_entries(&instance, router, forwarding, &mut out);
        out
    }

    #[test]
    fn test_known_names() {
        let known = KnownNames::new(["Auth@File", "svc1"]);
        assert!(known.contains("auth@file"));
        assert!(known.contains("SVC1"));
        assert!(!known.contains("svc2"));
        assert!(!KnownNames::default().contains("svc1"));
    }

    #[test]
    fn test_single_entrypoint() {
        let router = http_router("r1", "Host(`a.com`)", &["http"], "svc1", &[]);
        let out = entries_for(&router, &HttpForwarding::default());

        assert_eq!(
            out,
            EntrySet::from([
                ("traefik/http/routers/r1/entrypoints/0".into(), "web".into()),
                ("traefik/http/routers/r1/rule".into(), "Host(`a.com`)".into()),
                ("traefik/http/routers/r1/service".into(), "east".into()),
            ])
        );
    }

    #[test]
    fn test_entrypoint_indexes_follow_mapping_order() {
        let router = http_router("r1", "Host(`a.com`)", &["https", "http"], "svc1", &[]);
        let out = entries_for(&router, &HttpForwarding::default());

        assert_eq!(out["traefik/http/routers/r1/entrypoints/0"], "web");
        assert_eq!(out["traefik/http/routers/r1/entrypoints/1"], "websecure");
    }

    #[test]
    fn test_unmapped_router_is_filtered() {
        let router = http_router("r1", "Host(`a.com`)", &["traefik"], "svc1", &["auth"]);
        let forwarding = HttpForwarding {
            services: Some(KnownNames::default()),
            middlewares: Some(KnownNames::default()),
        };
        assert!(entries_for(&router, &forwarding).is_empty());
    }

    #[test]
    fn test_provider_suffix_renamed() {
        let router = http_router("api@docker", "Host(`a.com`)", &["http"], "api@docker", &[]);
        let out = entries_for(&router, &HttpForwarding::default());

        assert!(out.contains_key("traefik/http/routers/api_east/rule"));
        assert!(!out.keys().any(|k| k.contains("api@docker")));
    }

    #[test]
    fn test_service_kept_when_already_defined() {
        let router = http_router("api", "Host(`a.com`)", &["http"], "svc1", &[]);
        let forwarding = HttpForwarding {
            services: Some(KnownNames::new(["svc1"])),
            middlewares: None,
        };
        let out = entries_for(&router, &forwarding);
        assert_eq!(out["traefik/http/routers/api/service"], "east");

        // A service named after the router also blocks the override
        let forwarding = HttpForwarding {
            services: Some(KnownNames::new(["API"])),
            middlewares: None,
        };
        let out = entries_for(&router, &forwarding);
        assert_eq!(out["traefik/http/routers/api/service"], "east");
    }

    #[test]
    fn test_service_forwarded() {
        let router = http_router("api", "Host(`a.com`)", &["http"], "svc1", &[]);
        let forwarding = HttpForwarding {
            services: Some(KnownNames::new(["other"])),
            middlewares: None,
        };
        let out = entries_for(&router, &forwarding);
        assert_eq!(out["traefik/http/routers/api/service"], "svc1");
    }

    #[test]
    fn test_middlewares_forwarded_unless_defined() {
        let router = http_router(
            "api",
            "Host(`a.com`)",
            &["http"],
            "svc1",
            &["auth@file", "compress@file", "headers@docker"],
        );
        let forwarding = HttpForwarding {
            services: None,
            middlewares: Some(KnownNames::new(["Compress@File"])),
        };
        let out = entries_for(&router, &forwarding);

        assert_eq!(out["traefik/http/routers/api/middlewares/0"], "auth@file");
        assert!(!out.contains_key("traefik/http/routers/api/middlewares/1"));
        assert_eq!(out["traefik/http/routers/api/middlewares/2"], "headers@docker");
    }

    #[test]
    fn test_middlewares_not_forwarded_when_disabled() {
        let router = http_router("api", "Host(`a.com`)", &["http"], "svc1", &["auth@file"]);
        let out = entries_for(&router, &HttpForwarding::default());
        assert!(!out.keys().any(|k| k.contains("/middlewares/")));
    }
}
