//! dropcast command-line entry point.

mod app;
mod args;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries only the resulting URL.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = args::Cli::parse();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting dropcast");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(cli))
}
