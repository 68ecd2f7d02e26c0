//! Source instances, built once from configuration and shared read-only between
//! the reconciliation engine and the status surface.

use crate::config::{Config, ServerConfig};
use crate::source::{ApiClient, SourceAdapter, SourceError};
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Clone, Debug, PartialEq)]
pub struct SourceInstance {
    pub name: String,
    pub api_address: Url,
    pub api_host: Option<String>,
    pub destination_address: String,
    /// Relay entrypoint name -> local entrypoint name, in configuration order.
    pub entry_points: IndexMap<String, String>,
    pub forward_middlewares: Option<bool>,
    pub forward_services: Option<bool>,
}

impl TryFrom<&ServerConfig> for SourceInstance {
    type Error = SourceError;

    fn try_from(config: &ServerConfig) -> Result<Self, Self::Error> {
        let entry_points = if config.entry_points.is_empty() {
            IndexMap::from([("http".to_string(), "http".to_string())])
        } else {
            config.entry_points.clone()
        };

        Ok(SourceInstance {
            name: config.name.clone(),
            api_address: Url::parse(&config.api_address)?,
            api_host: config.api_host.clone().filter(|h| !h.is_empty()),
            destination_address: config.destination_address.clone(),
            entry_points,
            forward_middlewares: config.forward_middlewares,
            forward_services: config.forward_services,
        })
    }
}

/// A configured instance together with the adapter used to read its state.
pub struct Instance {
    pub spec: SourceInstance,
    pub source: Arc<dyn SourceAdapter>,
}

#[derive(Clone)]
pub struct Instances {
    inner: Arc<Vec<Instance>>,
}

impl Instances {
    pub fn new(instances: Vec<Instance>) -> Self {
        Instances {
            inner: Arc::new(instances),
        }
    }

    /// Builds one API client per configured server.
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let instances = config
            .servers
            .iter()
            .map(|server| {
                let spec = SourceInstance::try_from(server)?;
                let source: Arc<dyn SourceAdapter> = Arc::new(ApiClient::new(&spec, timeout)?);
                Ok(Instance { spec, source })
            })
            .collect::<Result<Vec<_>, SourceError>>()?;

        Ok(Instances::new(instances))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.inner.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.inner.iter().find(|i| i.spec.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn server(name: &str) -> ServerConfig {
        ServerConfig {
            name: name.into(),
            api_address: "http://10.0.0.1:8080".into(),
            api_host: Some("".into()),
            destination_address: "http://10.0.0.1:80".into(),
            entry_points: IndexMap::new(),
            forward_middlewares: None,
            forward_services: Some(true),
        }
    }

    #[test]
    fn test_source_instance_defaults() {
        let instance = SourceInstance::try_from(&server("east")).unwrap();
        assert_eq!(
            instance.entry_points,
            IndexMap::from([("http".to_string(), "http".to_string())])
        );
        // Empty host override is ignored
        assert_eq!(instance.api_host, None);
        assert_eq!(instance.forward_services, Some(true));
    }

    #[test]
    fn test_from_config() {
        let config = Config {
            servers: vec![server("east"), server("west")],
            run_every_secs: 60,
            forward_middlewares: false,
            forward_services: false,
            preserve_on_fetch_failure: false,
            adopt_existing_keys: true,
            request_timeout_secs: 10,
            store: StoreConfig::default(),
        };

        let instances = Instances::from_config(&config).unwrap();
        assert_eq!(instances.iter().count(), 2);
        assert!(instances.get("west").is_some());
        assert!(instances.get("north").is_none());
        let names: Vec<_> = instances.iter().map(|i| i.spec.name.as_str()).collect();
        assert_eq!(names, vec!["east", "west"]);
    }
}
