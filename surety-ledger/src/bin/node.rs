//! Surety ledger node binary

use anyhow::Context;
use surety_ledger::{Config, DeploymentConfig, Ledger};
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting surety ledger node");

    let config = match std::env::var("SURETY_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => Config::from_env().context("reading SURETY_* environment")?,
    };
    let owner = config.owner.clone();

    let mut ledger = Ledger::open(config).await.context("opening ledger")?;

    // Authorize the deployed application component when an artifact is given
    if let Ok(path) = std::env::var("SURETY_DEPLOYMENT") {
        let network = std::env::var("SURETY_NETWORK").unwrap_or_else(|_| "localhost".to_string());
        let deployment = DeploymentConfig::from_file(&path)
            .with_context(|| format!("loading deployment {}", path))?;
        let endpoint = deployment.endpoint(&network)?;
        ledger = ledger
            .adopt_deployment(&owner, endpoint)
            .await
            .context("authorizing deployed component")?;
        tracing::info!(network = %network, url = %endpoint.url, "Using deployment");
    }

    let mut events = ledger.subscribe();
    let logger = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => tracing::info!(
                    sequence = event.sequence,
                    event = event.kind.name(),
                    "Ledger event"
                ),
                Err(e) => tracing::warn!(error = %e, "Event subscriber lagged"),
            }
        }
    });

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down surety ledger node");
    ledger.shutdown().await?;
    logger.abort();
    Ok(())
}
