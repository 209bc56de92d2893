//! Server lifecycle: binding, the shared application state handed to every
//! handler, and clean shutdown (optionally wiping the data directory).

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::config::AppConfig;
use crate::events::EventBus;
use crate::models::cors::CorsConfiguration;
use crate::models::website::WebsiteConfiguration;
use crate::store::FsStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: FsStore,
    /// Server-wide CORS rules from `--cors`, used when a bucket has none of
    /// its own configured.
    pub default_cors: Option<Arc<CorsConfiguration>>,
    /// Server-wide static-website fallback built from `--index-document` /
    /// `--error-document`, used when a bucket has no website configuration.
    pub default_website: Option<Arc<WebsiteConfiguration>>,
}

/// A bound, running server. Dropping this without calling [`close`] leaves
/// the listener task running; call `close` for a clean shutdown.
pub struct ServerHandle {
    pub hostname: String,
    pub port: u16,
    pub directory: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: tokio::task::JoinHandle<()>,
    state: AppState,
}

impl ServerHandle {
    /// Stop accepting new connections, drain in-flight requests, then apply
    /// the configured cleanup policy.
    pub async fn close(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.join.await?;

        if self.state.config.remove_buckets_on_close {
            remove_all_buckets(&self.state.store).await?;
        }
        Ok(())
    }
}

async fn remove_all_buckets(store: &FsStore) -> Result<()> {
    for bucket in store.list_buckets().await? {
        // Best-effort: a bucket holding objects is still removed on close,
        // unlike an explicit DeleteBucket request.
        let _ = tokio::fs::remove_dir_all(store.bucket_root(&bucket.name)).await;
    }
    Ok(())
}

/// Bind the configured address and start serving. Returns immediately once
/// bound; the actual request loop runs on a spawned task.
pub async fn run(config: AppConfig) -> Result<ServerHandle> {
    tokio::fs::create_dir_all(&config.directory).await?;

    let default_cors = match &config.cors {
        Some(path) => {
            let body = tokio::fs::read_to_string(path).await?;
            let parsed: CorsConfiguration = quick_xml::de::from_str(&body)
                .map_err(|err| anyhow::anyhow!("parsing --cors document at {path}: {err}"))?;
            Some(Arc::new(parsed))
        }
        None => None,
    };
    let default_website = config
        .index_document
        .clone()
        .map(|index| Arc::new(WebsiteConfiguration::new(index, config.error_document.clone())));

    let state = AppState {
        config: Arc::new(config.clone()),
        store: FsStore::new(config.directory.clone(), EventBus::new()),
        default_cors,
        default_website,
    };

    let app: Router = crate::routes::routes(state.clone());

    let addr = config.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == std::io::ErrorKind::PermissionDenied
                && matches!(config.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", config.port);
            tracing::warn!(
                "permission denied binding to {} ({}), falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    let local_addr = listener.local_addr()?;
    tracing::info!("object store listening on http://{}", local_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(err) = result {
            tracing::error!("server loop exited with error: {err}");
        }
    });

    Ok(ServerHandle {
        hostname: local_addr.ip().to_string(),
        port: local_addr.port(),
        directory: state.config.directory.clone(),
        shutdown_tx: Some(shutdown_tx),
        join,
        state,
    })
}
