use reconciler::config::Config as ReconcilerConfig;
use serde::Deserialize;
use status::config::{Config as StatusConfig, Listener, ListenerError};
use std::fs::File;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive. `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,
    pub sentry_dsn: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            sentry_dsn: None,
        }
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 3001,
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub metrics: Option<MetricsConfig>,
    /// Serves `/health` and `/ready`.
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reconciler.validate()?;
        self.admin_listener.validate()?;
        if self.status.enabled {
            self.status.listener.validate()?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Validation(#[from] reconciler::ValidationError),
    #[error("invalid listener: {0}")]
    Listener(#[from] ListenerError),
}
