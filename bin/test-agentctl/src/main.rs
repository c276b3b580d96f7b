//! ---
//! ta_section: "05-networking-external-interfaces"
//! ta_subsection: "binary"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Client CLI for operators and test harnesses driving the test agent."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use test_agent_common::logging::init_cli_tracing;
use test_agent_common::model::ServiceKind;
use test_agent_common::version::VersionInfo;

mod commands;
mod stream;

use stream::StreamLimits;

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "Test agent gRPC client",
    long_about = None
)]
struct Cli {
    #[arg(long, global = true, default_value = "localhost", help = "Server host")]
    host: String,

    #[arg(long, global = true, default_value_t = 50051, help = "Server port")]
    port: u16,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print extended version information and exit"
    )]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Report whether the driver runs in mock mode.
    Mock,
    /// Report the driver version string.
    Version,
    /// Report the current integration state.
    Integration,
    /// Report the loaded model identifier.
    ModelId,
    /// Fetch mock mode, version, integration state and model id.
    Info,
    /// Report the run state of one service kind.
    Status(KindArg),
    /// Mark a service kind as running.
    Start(KindArg),
    /// Mark a service kind as stopped.
    Stop(KindArg),
    /// Switch the driver into autonomous mode.
    Engage,
    /// Return the driver to idle.
    Disengage,
    /// Print trace events until the server closes the stream or a limit is hit.
    Stream(StreamArgs),
    /// Exercise every remote call once.
    Demo,
    /// Stream trace events while polling server info on an interval.
    Concurrent(ConcurrentArgs),
}

#[derive(Debug, Args)]
struct KindArg {
    /// trajectory | navigation | inference | unknown
    #[arg(value_name = "KIND")]
    kind: ServiceKind,
}

#[derive(Debug, Args)]
struct StreamArgs {
    /// Stop after this many events.
    #[arg(long, default_value_t = 10)]
    max_events: usize,
    /// Stop after this many seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Debug, Args)]
struct ConcurrentArgs {
    /// Total run time in seconds.
    #[arg(long, default_value_t = 15)]
    duration_secs: u64,
    /// Seconds between info polls.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_cli_tracing();
    let cli = Cli::parse();
    if cli.version {
        println!("test-agentctl {}", VersionInfo::current().extended());
        return Ok(());
    }
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    println!("Connecting to TestAgent server at {}:{}", cli.host, cli.port);
    let mut client = test_agent_net::connect(&cli.host, cli.port).await?;

    match command {
        Commands::Mock => {
            commands::mock_mode(&mut client).await?;
        }
        Commands::Version => {
            commands::version(&mut client).await?;
        }
        Commands::Integration => {
            commands::integration(&mut client).await?;
        }
        Commands::ModelId => {
            commands::model_id(&mut client).await?;
        }
        Commands::Info => {
            commands::info(&mut client).await?;
        }
        Commands::Status(arg) => {
            commands::service_status(&mut client, arg.kind).await?;
        }
        Commands::Start(arg) => commands::start_service(&mut client, arg.kind).await?,
        Commands::Stop(arg) => commands::stop_service(&mut client, arg.kind).await?,
        Commands::Engage => commands::engage(&mut client).await?,
        Commands::Disengage => commands::disengage(&mut client).await?,
        Commands::Stream(args) => {
            let limits = StreamLimits {
                max_events: args.max_events,
                timeout: Duration::from_secs(args.timeout_secs),
            };
            stream::print_events(&mut client, limits).await?;
        }
        Commands::Demo => commands::demo(&mut client).await?,
        Commands::Concurrent(args) => {
            stream::stream_while_polling(
                &client,
                Duration::from_secs(args.duration_secs),
                Duration::from_secs(args.poll_interval_secs),
            )
            .await?;
        }
    }
    Ok(())
}
