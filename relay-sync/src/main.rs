mod config;
mod logging;
mod statsd;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError};
use reconciler::config::StoreType;
use reconciler::{
    Instances, Reconciler, Scheduler, SchedulerHandle, SourceError, StoreAdapter, StoreError,
    get_store,
};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
enum RelaySyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not set up source clients: {0}")]
    Source(#[from] SourceError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("scheduler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("could not encode report: {0}")]
    Report(#[from] serde_json::Error),
}

#[derive(Parser)]
#[command(name = "relay-sync", about = "Mirrors source proxy routers into the relay's store")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Reconcile on a fixed interval until interrupted.
    Run(RunArgs),
    /// Run a single cycle and print its report.
    Once(ConfigArgs),
    /// Load and validate the configuration, then exit.
    Validate(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, env = "CONFIG_PATH")]
    config: PathBuf,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// Redis URL or `host:port`, replaces the configured store.
    #[arg(long, env = "REDIS_URL")]
    store_url: Option<String>,
    /// Seconds between cycles.
    #[arg(long, env = "RUN_EVERY")]
    run_every: Option<u64>,
    #[arg(long, env = "API_PORT")]
    status_port: Option<u16>,
    #[arg(long, env = "ENABLE_API", hide = true)]
    enable_status: Option<bool>,
    #[arg(long)]
    disable_status: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.store_url {
            config.reconciler.store.r#type = StoreType::Redis {
                url: redis_url(url),
            };
        }
        if let Some(secs) = self.run_every {
            config.reconciler.run_every_secs = secs;
        }
        if let Some(port) = self.status_port {
            config.status.listener.port = port;
        }
        if let Some(enabled) = self.enable_status {
            config.status.enabled = enabled;
        }
        if self.disable_status {
            config.status.enabled = false;
        }
    }
}

/// Accepts either a full URL or a bare `host:port`.
fn redis_url(value: &str) -> String {
    if value.contains("://") {
        value.to_string()
    } else {
        format!("redis://{value}")
    }
}

fn load(args: &ConfigArgs, run_args: Option<&RunArgs>) -> Result<Config, ConfigError> {
    let mut config = Config::from_file(&args.config)?;
    if let Some(run_args) = run_args {
        run_args.apply(&mut config);
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), RelaySyncError> {
    let cli = Cli::parse();

    let config = match &cli.command {
        CliCommand::Run(args) => load(&args.config, Some(args))?,
        CliCommand::Once(args) => load(args, None)?,
        CliCommand::Validate(args) => {
            let config = load(args, None)?;
            println!(
                "Configuration OK: {} server(s)",
                config.reconciler.servers.len()
            );
            return Ok(());
        }
    };

    let _sentry = logging::init(&config.logging);

    if let Some(metrics_config) = &config.metrics
        && let Err(e) = statsd::init(metrics_config)
    {
        tracing::error!(error = %e, "Metrics disabled");
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        CliCommand::Once(_) => rt.block_on(once(config)),
        _ => rt.block_on(run(config)),
    }
}

async fn build_reconciler(
    config: &Config,
) -> Result<(Reconciler, Instances, Arc<dyn StoreAdapter>), RelaySyncError> {
    let instances = Instances::from_config(&config.reconciler)?;
    let store = get_store(config.reconciler.store.r#type.clone()).await?;

    let mut reconciler =
        Reconciler::from_config(&config.reconciler, instances.clone(), store.clone());
    if config.reconciler.adopt_existing_keys {
        let adopted = reconciler.adopt_existing_keys().await?;
        tracing::info!(adopted, "Adopted existing keys from the store");
    }

    Ok((reconciler, instances, store))
}

async fn once(config: Config) -> Result<(), RelaySyncError> {
    let (mut reconciler, _, _) = build_reconciler(&config).await?;
    let report = reconciler.run_cycle().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(config: Config) -> Result<(), RelaySyncError> {
    let (reconciler, instances, store) = build_reconciler(&config).await?;

    let every = Duration::from_secs(config.reconciler.run_every_secs);
    let (scheduler, handle) = Scheduler::new(reconciler, every);
    let scheduler_task = tokio::spawn(scheduler.run());

    let ready = handle.clone();
    let admin: AdminService<_, Infallible> = AdminService::new(move || ready.is_ready());
    let admin_listener = config.admin_listener.clone();
    tokio::spawn(async move {
        if let Err(e) = run_http_service(&admin_listener.host, admin_listener.port, admin).await {
            tracing::error!(error = %e, "Admin listener failed");
        }
    });

    if config.status.enabled {
        let status_config = config.status.clone();
        let reconciler_config = config.reconciler.clone();
        tokio::spawn(async move {
            if let Err(e) = status::serve(status_config, &reconciler_config, instances, store).await
            {
                tracing::error!(error = %e, "Status API failed");
            }
        });
    }

    wait_for_signals(&handle).await?;
    if handle.shutdown().await.is_err() {
        tracing::warn!("Scheduler already stopped");
    }
    scheduler_task.await?;

    tracing::info!("Shut down");
    Ok(())
}

/// SIGINT/SIGTERM return. SIGHUP requests an immediate cycle.
#[cfg(unix)]
async fn wait_for_signals(handle: &SchedulerHandle) -> Result<(), std::io::Error> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("Received SIGINT");
                return Ok(());
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM");
                return Ok(());
            }
            _ = hangup.recv() => {
                let handle = handle.clone();
                tokio::spawn(async move {
                    match handle.refresh().await {
                        Ok(report) => tracing::info!(entries = report.entries, "Refreshed on SIGHUP"),
                        Err(e) => tracing::warn!(error = %e, "Refresh on SIGHUP failed"),
                    }
                });
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(_handle: &SchedulerHandle) -> Result<(), std::io::Error> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl-C");
    Ok(())
}
