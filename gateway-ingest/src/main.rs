use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use telemetry_ingestor::Ingestor;
use telemetry_ingestor::config::ValidationError;

mod config;
mod lambda;
mod observability;

use config::{Config, ConfigError};
use observability::{ObservabilityError, ObservabilityGuard};

#[derive(Parser)]
#[command(name = "gateway-ingest", about = "Ingests gateway sensor-tag telemetry")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short, env = "INGESTOR_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve SQS-triggered invocations through the Lambda runtime (default)
    Lambda,
    /// Ingest a saved SQS event file once and print the summary
    Replay {
        #[arg(long)]
        event: PathBuf,
    },
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid ingestor configuration: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Observability(#[from] ObservabilityError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid event: {0}")]
    Event(#[from] serde_json::Error),
    #[error("lambda runtime error: {0}")]
    Runtime(String),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut guard = None;

    let exit_code = match run(cli, &mut guard) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "gateway-ingest exited with an error");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    };

    // Sentry flushes on drop, after the error above has been captured
    drop(guard);
    exit_code
}

/// Runs the selected command. Observability is installed into `guard` so it
/// outlives the returned error.
fn run(cli: Cli, guard: &mut Option<ObservabilityGuard>) -> Result<(), CliError> {
    let config = Config::from_file(&cli.config)?;
    let command = cli.command.unwrap_or(CliCommand::Lambda);

    if let CliCommand::CheckConfig = command {
        println!("Configuration OK: {}", cli.config.display());
        return Ok(());
    }

    *guard = Some(observability::init(&config.logging, config.metrics.as_ref())?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        // One store client per process, shared by every invocation
        let ingestor = Ingestor::from_config(&config.ingestor).await?;

        match command {
            CliCommand::Lambda => lambda::serve(ingestor).await,
            CliCommand::Replay { event } => lambda::replay(&ingestor, &event).await.map(|_| ()),
            CliCommand::CheckConfig => Ok(()),
        }
    })
}
