use crate::config::MetricsConfig;
use metrics_exporter_statsd::{StatsdBuilder, StatsdError};
use shared::metrics_defs::describe_all;

const PREFIX: &str = "relay_sync";

#[derive(thiserror::Error, Debug)]
pub enum MetricsError {
    #[error("could not build statsd recorder: {0}")]
    Statsd(#[from] StatsdError),
    #[error("a metrics recorder is already installed")]
    AlreadyInstalled,
}

/// Installs the statsd recorder as the global `metrics` recorder and registers every
/// metric description.
pub fn init(config: &MetricsConfig) -> Result<(), MetricsError> {
    let recorder =
        StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port).build(Some(PREFIX))?;
    metrics::set_global_recorder(recorder).map_err(|_| MetricsError::AlreadyInstalled)?;

    describe_all(reconciler::metrics_defs::ALL_METRICS);
    describe_all(status::metrics_defs::ALL_METRICS);

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Sending metrics to statsd"
    );
    Ok(())
}
