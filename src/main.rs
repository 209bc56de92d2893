use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod cors;
mod error;
mod events;
mod handlers;
mod listing;
mod middleware;
mod models;
mod routes;
mod server;
mod store;
mod validation;
mod website;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::AppConfig::from_env_and_args()?;
    tracing::info!("starting object-store with config: {:?}", config);

    let handle = server::run(config).await?;
    tracing::info!(
        "object store serving {} from http://{}:{}",
        handle.directory,
        handle.hostname,
        handle.port
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, closing");
    handle.close().await?;

    Ok(())
}
