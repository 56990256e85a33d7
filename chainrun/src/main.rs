use std::{path::PathBuf, time::Duration};

use clap::Parser;
use color_eyre::Result;
use shellchain::{Channel, Shell, ShellConfig};
use tracing_subscriber::prelude::*;

#[macro_use]
extern crate tracing;

mod runner;

/// Run a pipeline expression and print its output.
///
/// `a | b` pipes stdout, `a 2| b` pipes stderr, `a |& b` pipes both,
/// `a ; b` runs `b` after `a`, `b <<< "text"` feeds text into `b`.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Pipeline expression, e.g. `cat Cargo.toml | grep name`
    pub expr: String,

    /// Print lines as they arrive, prefixed with `out:`/`err:`
    #[arg(long)]
    pub stream: bool,

    /// Output to print once the pipeline has finished
    #[arg(long, default_value_t = Channel::Combined)]
    pub channel: Channel,

    /// Terminate the pipeline after this many seconds
    #[arg(long, value_name = "SECS", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// TOML file with shell settings
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Execute programs directly instead of through the shell
    #[arg(long)]
    pub direct: bool,
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    let secs: f64 = value.parse().map_err(|err| format!("{err}"))?;

    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("expected a positive number of seconds, got {value}"));
    }

    Duration::try_from_secs_f64(secs).map_err(|err| format!("{err}"))
}

fn load_config(args: &Args) -> Result<ShellConfig> {
    let config = match &args.config {
        Some(path) => ShellConfig::from_toml_file(path)?,
        None => ShellConfig::default(),
    };

    let mut config = config.with_overrides(|var| std::env::var(var).ok())?;

    if args.direct {
        config.direct = true;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_error::ErrorLayer::default())
        .init();

    color_eyre::install()?;

    let args = Args::parse();
    let config = load_config(&args)?;

    trace!(?config, "loaded shell config");

    let cmd = Shell::new(config).parse(&args.expr)?;

    trace!(?cmd, "parsed pipeline");

    let code = runner::run(cmd, &args).await?;

    drop(guard);
    std::process::exit(code);
}
