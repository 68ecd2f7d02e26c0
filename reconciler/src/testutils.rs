use crate::instances::{Instance, Instances, SourceInstance};
use crate::source::{SourceAdapter, SourceError};
use crate::store::{MemoryStore, StoreAdapter, StoreError};
use crate::types::{EntrySet, HttpRouter, Middleware, Service, TcpRouter};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

pub fn source_instance(name: &str, entry_points: &[(&str, &str)]) -> SourceInstance {
    SourceInstance {
        name: name.to_string(),
        api_address: Url::parse(&format!("http://{name}.internal:8080")).unwrap(),
        api_host: None,
        destination_address: format!("http://{name}.internal:80"),
        entry_points: entry_points
            .iter()
            .map(|(global, local)| (global.to_string(), local.to_string()))
            .collect::<IndexMap<_, _>>(),
        forward_middlewares: None,
        forward_services: None,
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn http_router(
    name: &str,
    rule: &str,
    entry_points: &[&str],
    service: &str,
    middlewares: &[&str],
) -> HttpRouter {
    HttpRouter {
        entry_points: strings(entry_points),
        middlewares: strings(middlewares),
        service: service.to_string(),
        rule: rule.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn tcp_router(name: &str, rule: &str, entry_points: &[&str], service: &str) -> TcpRouter {
    TcpRouter {
        entry_points: strings(entry_points),
        service: service.to_string(),
        rule: rule.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

#[derive(Default)]
struct FakeState {
    http_routers: Vec<HttpRouter>,
    tcp_routers: Vec<TcpRouter>,
    middlewares: Vec<Middleware>,
    services: Vec<Service>,
    fail_http: bool,
    fail_tcp: bool,
    fail_lists: bool,
    // Applied to every router fetch
    delay: Option<Duration>,
}

/// Scriptable source. Every call reads the current state, so tests can change it
/// between cycles.
#[derive(Default)]
pub struct FakeSource {
    state: Mutex<FakeState>,
    list_calls: AtomicUsize,
}

fn unavailable() -> SourceError {
    SourceError::Status {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "unavailable".into(),
    }
}

impl FakeSource {
    pub fn set_http_routers(&self, routers: Vec<HttpRouter>) {
        self.state.lock().http_routers = routers;
    }

    pub fn set_tcp_routers(&self, routers: Vec<TcpRouter>) {
        self.state.lock().tcp_routers = routers;
    }

    pub fn set_middlewares(&self, names: &[&str]) {
        self.state.lock().middlewares = names
            .iter()
            .map(|n| Middleware {
                name: n.to_string(),
                ..Default::default()
            })
            .collect();
    }

    pub fn set_services(&self, names: &[&str]) {
        self.state.lock().services = names
            .iter()
            .map(|n| Service {
                name: n.to_string(),
                ..Default::default()
            })
            .collect();
    }

    pub fn fail_http(&self, fail: bool) {
        self.state.lock().fail_http = fail;
    }

    pub fn fail_tcp(&self, fail: bool) {
        self.state.lock().fail_tcp = fail;
    }

    pub fn fail_lists(&self, fail: bool) {
        self.state.lock().fail_lists = fail;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    /// Number of middleware and service list requests served.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for FakeSource {
    async fn http_routers(&self) -> Result<Vec<HttpRouter>, SourceError> {
        let delay = self.state.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock();
        if state.fail_http {
            return Err(unavailable());
        }
        Ok(state.http_routers.clone())
    }

    async fn tcp_routers(&self) -> Result<Vec<TcpRouter>, SourceError> {
        let delay = self.state.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock();
        if state.fail_tcp {
            return Err(unavailable());
        }
        Ok(state.tcp_routers.clone())
    }

    async fn middlewares(&self) -> Result<Vec<Middleware>, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if state.fail_lists {
            return Err(unavailable());
        }
        Ok(state.middlewares.clone())
    }

    async fn services(&self) -> Result<Vec<Service>, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if state.fail_lists {
            return Err(unavailable());
        }
        Ok(state.services.clone())
    }
}

/// Builds an instance set backed by fake sources, returned alongside so tests
/// can script them.
pub fn fake_instances(specs: Vec<SourceInstance>) -> (Instances, Vec<Arc<FakeSource>>) {
    let mut fakes = Vec::new();
    let instances = specs
        .into_iter()
        .map(|spec| {
            let fake = Arc::new(FakeSource::default());
            fakes.push(fake.clone());
            Instance {
                spec,
                source: fake,
            }
        })
        .collect();
    (Instances::new(instances), fakes)
}

/// Memory store whose writes can be made to fail.
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    fail_deletes: AtomicBool,
    fail_upserts: AtomicBool,
    delete_calls: AtomicUsize,
}

impl FailingStore {
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreAdapter for FailingStore {
    async fn upsert(&self, entries: &EntrySet) -> Result<(), StoreError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("upsert disabled".into()));
        }
        self.inner.upsert(entries).await
    }

    async fn delete_keys(&self, keys: &BTreeSet<String>) -> Result<(), StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("delete disabled".into()));
        }
        self.inner.delete_keys(keys).await
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.keys(prefix).await
    }
}
