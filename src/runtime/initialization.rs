//! # Initialization
//!
//! Operator startup: rustls setup, tracing, metrics, health server startup
//! and construction of the shared Kubernetes and HTTP clients.

use crate::config::ControllerConfig;
use crate::constants::{DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS};
use crate::http::{HttpFetcher, ReqwestFetcher};
use crate::observability;
use crate::server::{start_server, ServerState};
use crate::store::{KubeObjectStore, ObjectStore};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Everything the controller and the webhook need at runtime
pub struct InitializationResult {
    pub client: Client,
    pub store: Arc<dyn ObjectStore>,
    pub fetcher: Arc<dyn HttpFetcher>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub config: ControllerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Install the crypto provider and the tracing subscriber.
///
/// Must run before anything opens a TLS connection.
pub fn init_process() -> Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "app_gateway_operator=info".into()),
        )
        .init();

    Ok(())
}

/// Initialize the operator runtime
///
/// This function handles:
/// - Metrics registration
/// - HTTP server startup for metrics and health checks
/// - Kubernetes client creation
/// - Outbound HTTP client creation
pub async fn initialize(config: ControllerConfig) -> Result<InitializationResult> {
    info!("Starting Application Gateway operator");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::new());
    let server_state_clone = Arc::clone(&server_state);
    let metrics_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(metrics_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let store: Arc<dyn ObjectStore> = Arc::new(KubeObjectStore::new(client.clone()));
    let fetcher: Arc<dyn HttpFetcher> = Arc::new(
        ReqwestFetcher::new(config.http_timeout()).context("Failed to build HTTP client")?,
    );

    Ok(InitializationResult {
        client,
        store,
        fetcher,
        server_state,
        config,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
