use crate::config::LoggingConfig;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber: fmt output filtered by `RUST_LOG` (or the configured
/// level), plus Sentry when a DSN is configured. The returned guard flushes Sentry
/// on drop and must be held for the lifetime of the process.
pub fn init(config: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            guard
                .as_ref()
                .map(|_| sentry::integrations::tracing::layer()),
        )
        .init();

    guard
}
