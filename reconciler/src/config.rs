use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("no servers configured")]
    NoServers,

    #[error("server #{0} is missing a name")]
    EmptyServerName(usize),

    #[error("duplicate server name: {0}")]
    DuplicateServer(String),

    #[error("server '{server}' has an invalid {field}: {reason}")]
    InvalidAddress {
        server: String,
        field: &'static str,
        reason: String,
    },

    #[error("run_every_secs must be greater than 0")]
    InvalidInterval,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreType {
    Redis { url: String },
    Memory,
}

impl Default for StoreType {
    fn default() -> Self {
        StoreType::Redis {
            url: "redis://redis:6379".into(),
        }
    }
}

impl StoreType {
    /// Copy with any password in the connection URL masked.
    pub fn redacted(&self) -> Self {
        match self {
            StoreType::Redis { url } => StoreType::Redis {
                url: redact_url(url),
            },
            StoreType::Memory => StoreType::Memory,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct StoreConfig {
    #[serde(flatten)]
    pub r#type: StoreType,
}

/// Masks the password of `raw`. Anything that does not parse as a URL is returned as is.
pub fn redact_url(raw: &str) -> String {
    if let Ok(mut url) = Url::parse(raw)
        && url.password().is_some()
        && url.set_password(Some("xxxxx")).is_ok()
    {
        return url.to_string();
    }
    raw.to_string()
}

/// One source instance whose routing state is mirrored.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    pub name: String,
    /// Base URL of the inspection API. Basic auth credentials may be embedded.
    pub api_address: String,
    /// Overrides the Host header sent to the inspection API.
    pub api_host: Option<String>,
    /// Where traffic for this instance's routes is forwarded to.
    pub destination_address: String,
    /// Relay entrypoint name -> this instance's entrypoint name.
    /// Empty means `{http: http}`.
    #[serde(default)]
    pub entry_points: IndexMap<String, String>,
    pub forward_middlewares: Option<bool>,
    pub forward_services: Option<bool>,
}

impl ServerConfig {
    fn validate(&self, index: usize) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyServerName(index + 1));
        }

        for (field, value) in [
            ("api_address", &self.api_address),
            ("destination_address", &self.destination_address),
        ] {
            Url::parse(value).map_err(|e| ValidationError::InvalidAddress {
                server: self.name.clone(),
                field,
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// Copy of this server with any password in `api_address` masked.
    pub fn redacted(&self) -> Self {
        ServerConfig {
            api_address: redact_url(&self.api_address),
            ..self.clone()
        }
    }
}

fn default_run_every_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Config {
    pub servers: Vec<ServerConfig>,
    #[serde(default = "default_run_every_secs")]
    pub run_every_secs: u64,
    /// Global default, overridable per server.
    #[serde(default)]
    pub forward_middlewares: bool,
    /// Global default, overridable per server.
    #[serde(default)]
    pub forward_services: bool,
    /// Keep an instance's previous router entries when its router fetch fails,
    /// instead of removing them for that cycle.
    #[serde(default)]
    pub preserve_on_fetch_failure: bool,
    /// Treat keys already in the store's namespace at startup as leftovers to clean up.
    #[serde(default = "default_true")]
    pub adopt_existing_keys: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.servers.is_empty() {
            return Err(ValidationError::NoServers);
        }

        if self.run_every_secs == 0 {
            return Err(ValidationError::InvalidInterval);
        }

        let mut names = HashSet::new();
        for (index, server) in self.servers.iter().enumerate() {
            server.validate(index)?;
            if !names.insert(&server.name) {
                return Err(ValidationError::DuplicateServer(server.name.clone()));
            }
        }

        Ok(())
    }

    /// Copy safe to expose over the status API.
    pub fn redacted(&self) -> Self {
        Config {
            servers: self.servers.iter().map(ServerConfig::redacted).collect(),
            store: StoreConfig {
                r#type: self.store.r#type.redacted(),
            },
            ..self.clone()
        }
    }
}
