//! ---
//! ta_section: "01-core-functionality"
//! ta_subsection: "binary"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Binary entrypoint for the test agent daemon."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use test_agent_common::config::AppConfig;
use test_agent_common::logging::{init_tracing, LogFormat};
use test_agent_common::version::VersionInfo;
use test_agent_core::{CallDispatcher, StateStore, StaticFacts, TraceSettings};
use test_agent_metrics::{new_registry, spawn_http_server, DaemonMetrics, DispatchMetrics};
use test_agent_net::{resolve_listen, GrpcServerBuilder};
use tokio::signal;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "configs/test-agent.toml";

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "Test agent gRPC daemon",
    long_about = None,
    after_help = "Examples:\n  test-agentd                      # localhost:50051\n  test-agentd -p 8080              # localhost:8080\n  test-agentd -a 0.0.0.0 -p 9090   # 0.0.0.0:9090"
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        short = 'a',
        long,
        value_name = "ADDR",
        help = "Server address (default: localhost)"
    )]
    address: Option<String>,

    #[arg(
        short = 'p',
        long,
        value_name = "PORT",
        value_parser = clap::value_parser!(u16).range(1..),
        help = "Server port (default: 50051)"
    )]
    port: Option<u16>,

    #[arg(long, value_enum, help = "Override stdout log format")]
    log_format: Option<CliLogFormat>,

    #[arg(long, help = "Disable the metrics and health endpoint")]
    no_metrics: bool,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print extended version information and exit"
    )]
    version: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogFormat {
    Json,
    Pretty,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Json => LogFormat::StructuredJson,
            CliLogFormat::Pretty => LogFormat::Pretty,
        }
    }
}

/// Fold command-line overrides into the loaded configuration.
fn apply_overrides(mut config: AppConfig, cli: &Cli) -> Result<AppConfig> {
    if let Some(address) = &cli.address {
        config.server.address = address.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format.into();
    }
    if cli.no_metrics {
        config.metrics.enabled = false;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let version = VersionInfo::current();
    if cli.version {
        println!("test-agentd {}", version.extended());
        return Ok(());
    }

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(cli.config.as_deref(), &[DEFAULT_CONFIG_PATH])?;
    let load_duration = load_started.elapsed();
    let config = apply_overrides(loaded.config, &cli)?;

    init_tracing("test-agentd", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; running with defaults"),
    }

    let registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(registry.clone())?;
    daemon_metrics.observe_config_load(load_duration.as_secs_f64());
    daemon_metrics.inc_start();
    daemon_metrics.set_build_info(&version.semver, &version.profile);
    let dispatch_metrics = DispatchMetrics::new(registry.clone())?;

    run_daemon(config, registry, dispatch_metrics).await
}

async fn run_daemon(
    config: AppConfig,
    registry: test_agent_metrics::SharedRegistry,
    dispatch_metrics: DispatchMetrics,
) -> Result<()> {
    let store = Arc::new(StateStore::new(StaticFacts::from(&config.facts)));
    store.set_integration_state(config.state.initial_integration);
    info!(
        mock_mode = config.facts.mock_mode,
        version = %config.facts.version,
        model_id = %config.facts.model_id,
        integration = %config.state.initial_integration,
        "state store initialised"
    );

    let dispatcher = CallDispatcher::new(store.clone(), TraceSettings::from(&config.trace))
        .with_metrics(dispatch_metrics);

    let metrics_server = if config.metrics.enabled {
        match spawn_http_server(registry, config.metrics.listen) {
            Ok(server) => {
                info!(address = %server.addr(), "metrics exporter enabled");
                Some(server)
            }
            Err(err) => {
                warn!(error = %err, "failed to start metrics exporter");
                None
            }
        }
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let endpoint = config.server.endpoint();
    let listen = resolve_listen(&endpoint).await?;
    let grpc = GrpcServerBuilder::new(listen, dispatcher)
        .max_message_bytes(config.server.max_message_bytes)
        .spawn()
        .await
        .with_context(|| format!("failed to start server on {endpoint}"))?;
    info!(address = %grpc.local_addr(), "test agent service listening; waiting for termination signal");

    let received = shutdown_signal().await?;
    info!(signal = received, "shutting down server");
    grpc.shutdown().await?;

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    let snapshot = store.snapshot();
    info!(
        integration = %snapshot.integration,
        run_states = ?snapshot.run_states,
        "server shutdown complete"
    );
    Ok(())
}

async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};
        let mut term =
            unix_signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("failed to listen for ctrl-c")?;
                Ok("SIGINT")
            }
            _ = term.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        Ok("ctrl-c")
    }
}
