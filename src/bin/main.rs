use anyhow::Result;
use bleep_cli::Cli;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Reports own stdout; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let summary = bleep_cli::run(cli).await?;

    if !summary.pending.is_empty() {
        info!("{} blocks left unfinalized at end of log", summary.pending.len());
    }
    Ok(())
}
