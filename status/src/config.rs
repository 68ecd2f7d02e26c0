use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ListenerError {
    #[error("listener port must not be 0")]
    InvalidPort,
    #[error("listener host must not be empty")]
    EmptyHost,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ListenerError> {
        if self.host.is_empty() {
            return Err(ListenerError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ListenerError::InvalidPort);
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_refresh_every_secs() -> u64 {
    60
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub listener: Listener,
    /// How often every server is probed in the background.
    #[serde(default = "default_refresh_every_secs")]
    pub refresh_every_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enabled: default_enabled(),
            listener: Listener::default(),
            refresh_every_secs: default_refresh_every_secs(),
        }
    }
}
