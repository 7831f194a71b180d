//! `photobooth` - command-line front end for the photobooth client.

use anyhow::Context;
use clap::Parser;

mod cli;

use cli::Cli;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Create tokio runtime for async operations
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let result = runtime.block_on(cli::run(cli));
    log::debug!("Shutting down");
    result
}
