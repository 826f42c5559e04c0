use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;

use clap::Parser;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use wallwatch::error::{report, ExitCode, WallWatchError};
use wallwatch::transport::fakes::{ScriptedTransport, StaticResolver};
use wallwatch::{ConsoleSink, Sink, SinkDispatcher, Supervisor, SupervisorConfig};

/// Watches depth-of-book and trade flow for large resting limit orders and
/// raises lifecycle alerts.
#[derive(Parser, Debug)]
#[command(name = "wallwatch", version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, env = "WALLWATCH_CONFIG", default_value = "wallwatch.yaml")]
    config: String,

    /// Comma-separated symbol list overriding the config file's `symbols`.
    #[arg(long, env = "WALLWATCH_SYMBOLS", value_delimiter = ',')]
    symbols: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> ProcessExitCode {
    let _ = dotenvy::dotenv();
    wallwatch::init_logging();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ProcessExitCode::from(ExitCode::Clean as u8),
        Err(err) => {
            report(&err);
            eprintln!("wallwatch: {}", err);
            ProcessExitCode::from(err.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<(), WallWatchError> {
    let mut config = SupervisorConfig::load_from_file(&cli.config)?;
    if let Some(symbols) = cli.symbols {
        config.symbols = symbols;
    }
    config.validate()?;

    tracing::info!(symbols = ?config.symbols, "starting wallwatch");

    // No concrete network transport ships with this crate -- wiring one up
    // is an integrator's job. Until then the bundled in-memory resolver and
    // an empty scripted transport let the supervisor start and idle until
    // cancelled, which is enough to exercise config, logging, and shutdown.
    tracing::warn!("no transport configured; running against the bundled in-memory fakes");
    let resolver = Arc::new(StaticResolver::new(
        config
            .symbols
            .iter()
            .map(|s| (s.as_str(), s.as_str(), Decimal::new(1, 2)))
            .collect(),
    ));
    let transport = Box::new(ScriptedTransport::new(vec![]));

    let cancel = CancellationToken::new();
    let sinks: Vec<SinkDispatcher> = vec![SinkDispatcher::spawn(
        Arc::new(ConsoleSink) as Arc<dyn Sink>,
        config.sink_queue_capacity,
        cancel.clone(),
    )];

    let mut supervisor = Supervisor::new(config, resolver, transport, sinks, cancel.clone());

    let shutdown = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received ctrl-c, shutting down");
            cancel.cancel();
        })
    };

    let result = supervisor.run().await;
    shutdown.abort();
    result
}
