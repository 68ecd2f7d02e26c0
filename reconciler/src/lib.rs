//! Mirrors the routing state of several source reverse proxies into the shared
//! key-value store a relay proxy reads its dynamic configuration from.

pub mod config;
pub mod diff;
pub mod engine;
pub mod instances;
pub mod keys;
pub mod metrics_defs;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod types;

#[cfg(test)]
mod testutils;

pub use config::{Config, ValidationError};
pub use engine::{CycleReport, Reconciler};
pub use instances::{Instance, Instances, SourceInstance};
pub use scheduler::{Scheduler, SchedulerError, SchedulerHandle};
pub use source::{SourceAdapter, SourceError};
pub use store::{StoreAdapter, StoreError, get_store};
