//! rcm-billing - monthly research computing billing
//!
//! This is the main entry point for the billing run and the usage
//! collection commands.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rcm_billing::{execute, Cli};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "debug"
    } else {
        "info,rcm_billing=debug"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        prefix = %cli.prefix.display(),
        policy = ?cli.policy,
        debug = cli.debug,
        "Starting rcm-billing"
    );

    if let Err(e) = execute(cli).await {
        tracing::error!(error = %e, "Run failed");
        return Err(e.into());
    }

    Ok(())
}
