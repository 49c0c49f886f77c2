//! GPU Allocation Exporter
//!
//! Reports which running containers hold which GPUs as Prometheus metrics.
//! Runs on a GPU host next to the Docker daemon and refreshes the
//! allocation table on a fixed interval.

mod cli;
mod config;
mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;
use config::Config;
use gpu_alloc_core::gpu::NvidiaSmiEnumerator;
use gpu_alloc_core::metrics::{AllocationRegistry, CycleOutcome};
use gpu_alloc_core::scheduler::{CollectionScheduler, IntervalTicker};
use gpu_alloc_docker::{DockerClient, DockerInspector, GpuRequestMatcher, InspectorConfig};
use server::MetricsServer;

/// Initialize the tracing/logging subsystem
///
/// Logs go to stderr; stdout is reserved for the startup line and `--once`
/// output.
fn init_logging(log_level: &str, json_format: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Build the Docker-backed container inspector
fn build_inspector(config: &Config) -> DockerInspector {
    let client = DockerClient::new(&config.docker.socket, config.docker.timeout);
    let inspector_config = InspectorConfig {
        group_label: config.docker.group_label.clone(),
        matcher: GpuRequestMatcher::new(config.gpu.driver.clone(), config.gpu.capability.clone()),
        concurrency: config.docker.concurrency,
        timeout: config.docker.timeout,
    };
    DockerInspector::new(client, inspector_config)
}

/// Build the scheduler and its collaborators
fn build_scheduler(
    config: &Config,
    registry: Arc<AllocationRegistry>,
) -> (CollectionScheduler, Arc<DockerInspector>) {
    let inspector = Arc::new(build_inspector(config));
    let enumerator = Arc::new(NvidiaSmiEnumerator::with_command(
        config.gpu.command.clone(),
        config.gpu.timeout,
    ));

    let scheduler =
        CollectionScheduler::new(enumerator, inspector.clone(), registry, config.interval);
    (scheduler, inspector)
}

/// Run one cycle and print the allocation table as JSON
async fn run_once(config: Config) -> Result<()> {
    let registry = Arc::new(AllocationRegistry::new().context("Failed to create metrics registry")?);
    let (scheduler, _) = build_scheduler(&config, registry);

    let report = scheduler.run_once().await;
    if report.outcome == CycleOutcome::Skipped {
        anyhow::bail!("Container listing failed, no allocation table available");
    }
    if report.gpu_query_failed {
        warn!("GPU query failed, table only lists GPUs held by containers");
    }

    let json = serde_json::to_string_pretty(&report.table).context("Failed to encode allocation table")?;
    println!("{}", json);
    Ok(())
}

/// Start the metrics endpoint and run the collection loop
async fn run(config: Config, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
    let registry = Arc::new(AllocationRegistry::new().context("Failed to create metrics registry")?);

    // The exporter is useless without its endpoint, so bind before anything else
    let server = MetricsServer::bind(
        &config.metrics.bind_address,
        config.metrics.port,
        &config.metrics.path,
        registry.clone(),
    )
    .await?;
    tokio::spawn(server.serve());
    println!(
        "Exporter running on :{}{}",
        config.metrics.port, config.metrics.path
    );

    let (scheduler, inspector) = build_scheduler(&config, registry);
    if let Err(e) = inspector.client().health_check().await {
        warn!(error = %e, "Docker daemon not reachable yet, will retry every cycle");
    }

    let mut ticker = IntervalTicker::new(scheduler.interval());
    scheduler.run(&mut ticker, shutdown_rx).await;

    info!("GPU allocation exporter shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(&cli.log_level, cli.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), "GPU allocation exporter starting");

    // Load configuration
    let mut config = if cli.config.exists() {
        Config::from_file(&cli.config)
            .with_context(|| format!("Failed to load config from {:?}", cli.config))?
    } else {
        info!(path = ?cli.config, "Config file not found, using defaults");
        Config::default()
    };

    // Apply CLI overrides
    if let Some(port) = cli.port {
        config.metrics.port = port;
    }

    // Validate configuration
    config.validate().context("Invalid configuration")?;

    info!(
        interval = ?config.interval,
        port = config.metrics.port,
        socket = %config.docker.socket,
        "Configuration loaded"
    );

    if cli.once {
        return run_once(config).await;
    }

    // Setup shutdown signal handler
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, initiating shutdown");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating shutdown");
            }
        }

        let _ = shutdown_tx.send(true);
    });

    run(config, shutdown_rx).await
}
