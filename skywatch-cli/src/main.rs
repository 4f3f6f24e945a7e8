//! skywatch-cli: run a rule configuration against a live TCP feed or a
//! recorded replay file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use skywatch::{source, Engine};

#[derive(Parser)]
#[command(
    name = "skywatch",
    version,
    about = "Evaluate ADS-B rules against a JSON report stream"
)]
struct Cli {
    /// Path to the YAML rule configuration
    config: PathBuf,

    /// Connect to a TCP JSON feed, host:port
    #[arg(long, value_name = "HOST:PORT", conflicts_with = "replay")]
    connect: Option<String>,

    /// Replay a recorded JSON-lines file
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// POST webhook actions of this kind to a URL, e.g. "slack=https://..."
    #[arg(long, value_name = "KIND=URL")]
    webhook: Vec<String>,

    /// Verbose logging (DEBUG level)
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> skywatch::Result<()> {
    let mut engine = Engine::from_yaml_file(&cli.config)?;

    for spec in &cli.webhook {
        let (kind, url) = spec.split_once('=').ok_or_else(|| {
            skywatch::EngineError::Config(format!("--webhook expects KIND=URL, got '{spec}'"))
        })?;
        engine.register_http_transport(kind, url)?;
    }

    match (&cli.connect, &cli.replay) {
        (Some(addr), None) => engine.run(source::connect_tcp(addr)?)?,
        (None, Some(path)) => engine.run(source::open_replay(path)?)?,
        _ => {
            return Err(skywatch::EngineError::Config(
                "choose one input: --connect HOST:PORT or --replay FILE".into(),
            ))
        }
    }

    println!("{}", engine.stats().final_report());
    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .init();
}
