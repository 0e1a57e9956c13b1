//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use crate::cluster::KubeCluster;
use crate::config::ControllerConfig;
use crate::constants::EVENT_REPORTER;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::crd::GrowthbookInstance;
use crate::observability;
use crate::observability::KubeEventPublisher;
use crate::storage::MongoDatabaseProvider;
use anyhow::{anyhow, Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SERVER_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const SERVER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// API for `GrowthbookInstance` resources in all namespaces
    pub instances: Api<GrowthbookInstance>,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub config: Arc<ControllerConfig>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field(
                "server_ready",
                &self.server_state.is_ready.load(Ordering::Relaxed),
            )
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler setup
pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before anything opens a TLS connection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow!("Failed to install rustls crypto provider"));
    }

    let config = Arc::new(ControllerConfig::from_env());
    init_tracing(&config)?;

    info!(
        "Starting GrowthBook controller v{} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        max_concurrent_reconciliations = config.max_concurrent_reconciliations,
        watch_secrets = config.watch_secrets,
        metrics_port = config.metrics_port,
        "controller.config.loaded"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let instances: Api<GrowthbookInstance> = Api::all(client.clone());

    check_crd_queryable(&instances).await;

    let reconciler = Arc::new(
        Reconciler::new(
            KubeCluster::new(client.clone()),
            Arc::new(MongoDatabaseProvider),
            Arc::clone(&config),
        )
        .with_events(Arc::new(KubeEventPublisher::new(
            client.clone(),
            EVENT_REPORTER,
        ))),
    );

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        instances,
        reconciler,
        server_state,
        config,
    })
}

/// Install the global subscriber. `RUST_LOG` wins over `LOG_LEVEL`;
/// `LOG_FORMAT=text` switches from JSON to plain lines.
#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only when a global subscriber is already installed"
)]
pub fn init_tracing(config: &ControllerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_lowercase()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = if config.log_format.eq_ignore_ascii_case("text") {
        builder.try_init()
    } else {
        builder.json().try_init()
    };
    installed.map_err(|e| anyhow!("Failed to initialize tracing: {e}"))
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > SERVER_STARTUP_TIMEOUT {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                SERVER_STARTUP_TIMEOUT.as_secs()
            ));
        }

        tokio::time::sleep(SERVER_POLL_INTERVAL).await;
    }
}

/// Log whether the Instance CRD is installed. The watch retries either way.
async fn check_crd_queryable(instances: &Api<GrowthbookInstance>) {
    match instances.list(&ListParams::default()).await {
        Ok(list) => {
            info!(
                "CRD is queryable, found {} existing GrowthbookInstance resources",
                list.items.len()
            );
        }
        Err(e) => {
            error!("CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            warn!(error = %e, "CRD queryability check failed");
        }
    }
}
