use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ytfetch::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting ytfetch v{}", env!("CARGO_PKG_VERSION"));

    cli.run().await?;

    Ok(())
}
