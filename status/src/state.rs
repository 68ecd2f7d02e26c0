//! Online/offline state of every configured server, probed through the same source
//! adapters the reconciler uses but kept entirely separate from its state.

use crate::metrics_defs::STATUS_PROBES;
use parking_lot::RwLock;
use reconciler::config::ServerConfig;
use reconciler::types::{HttpRouter, Middleware, Service, TcpRouter};
use reconciler::{Instance, Instances, SourceError};
use serde::Serialize;
use shared::counter;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::MissedTickBehavior;

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
    pub http_routers: usize,
    pub tcp_routers: usize,
    pub middlewares: usize,
    pub services: usize,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub name: String,
    pub online: bool,
    /// Unix seconds. `None` until the first probe.
    pub last_checked: Option<u64>,
    pub counts: Counts,
    pub error: Option<String>,
    /// Server configuration with credentials masked.
    pub configuration: ServerConfig,
}

/// Everything a server currently reports, fetched concurrently.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDetail {
    pub http_routers: Vec<HttpRouter>,
    pub tcp_routers: Vec<TcpRouter>,
    pub middlewares: Vec<Middleware>,
    pub services: Vec<Service>,
    pub errors: Vec<String>,
}

impl ServerDetail {
    pub async fn fetch(instance: &Instance) -> Self {
        let source = &instance.source;
        let (http_routers, tcp_routers, middlewares, services) = tokio::join!(
            source.http_routers(),
            source.tcp_routers(),
            source.middlewares(),
            source.services(),
        );

        let mut errors = Vec::new();
        let mut take = |resource: &str, error: SourceError| {
            errors.push(format!("{resource}: {error}"));
        };

        let http_routers = http_routers.unwrap_or_else(|e| {
            take("http routers", e);
            Vec::new()
        });
        let tcp_routers = tcp_routers.unwrap_or_else(|e| {
            take("tcp routers", e);
            Vec::new()
        });
        let middlewares = middlewares.unwrap_or_else(|e| {
            take("middlewares", e);
            Vec::new()
        });
        let services = services.unwrap_or_else(|e| {
            take("services", e);
            Vec::new()
        });

        ServerDetail {
            http_routers,
            tcp_routers,
            middlewares,
            services,
            errors,
        }
    }

    fn counts(&self) -> Counts {
        Counts {
            http_routers: self.http_routers.len(),
            tcp_routers: self.tcp_routers.len(),
            middlewares: self.middlewares.len(),
            services: self.services.len(),
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub servers: Vec<ServerStatus>,
}

#[derive(Clone)]
pub struct StatusBoard {
    instances: Instances,
    statuses: Arc<RwLock<Vec<ServerStatus>>>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl StatusBoard {
    /// `servers` are the configurations the instances were built from.
    pub fn new(instances: Instances, servers: &[ServerConfig]) -> Self {
        let statuses = servers
            .iter()
            .map(|server| ServerStatus {
                name: server.name.clone(),
                online: false,
                last_checked: None,
                counts: Counts::default(),
                error: None,
                configuration: server.redacted(),
            })
            .collect();

        StatusBoard {
            instances,
            statuses: Arc::new(RwLock::new(statuses)),
        }
    }

    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.instances.get(name)
    }

    pub fn servers(&self) -> Vec<ServerStatus> {
        self.statuses.read().clone()
    }

    pub fn get(&self, name: &str) -> Option<ServerStatus> {
        self.statuses.read().iter().find(|s| s.name == name).cloned()
    }

    pub fn overview(&self) -> Overview {
        let servers = self.servers();
        let online = servers.iter().filter(|s| s.online).count();
        Overview {
            total: servers.len(),
            online,
            offline: servers.len() - online,
            servers,
        }
    }

    /// Probes one server and records the result. Returns `None` for unknown servers.
    pub async fn refresh_one(&self, name: &str) -> Option<ServerStatus> {
        let instance = self.instances.get(name)?;
        // The lock is only taken to record the result.
        let detail = ServerDetail::fetch(instance).await;
        self.record(name, &detail)
    }

    pub async fn refresh_all(&self) {
        for instance in self.instances.iter() {
            let detail = ServerDetail::fetch(instance).await;
            self.record(&instance.spec.name, &detail);
        }
    }

    fn record(&self, name: &str, detail: &ServerDetail) -> Option<ServerStatus> {
        let online = detail.errors.is_empty();
        let outcome = if online { "online" } else { "offline" };
        counter!(STATUS_PROBES, "outcome" => outcome).increment(1);

        if !online {
            tracing::warn!(server = name, errors = ?detail.errors, "Server is offline");
        }

        let mut statuses = self.statuses.write();
        let status = statuses.iter_mut().find(|s| s.name == name)?;
        status.online = online;
        status.last_checked = Some(unix_now());
        status.counts = detail.counts();
        status.error = (!online).then(|| detail.errors.join("; "));
        Some(status.clone())
    }

    /// Probes every server now and then every `every`, forever.
    pub async fn run_updater(&self, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.refresh_all().await;
            tracing::debug!("Refreshed server statuses");
        }
    }
}
