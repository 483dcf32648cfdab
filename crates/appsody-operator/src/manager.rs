//! # Operator Manager
//!
//! Runs the application controller next to the health probe and metrics
//! servers and stops everything on SIGINT or SIGTERM.

use crate::controller::run_controller;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::OperatorConfig;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use kube::Client;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Main operator manager
pub struct OperatorManager {
    config: OperatorConfig,
    client: Client,
    metrics: Metrics,
    ready: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl OperatorManager {
    /// Create a manager using the in-cluster or kubeconfig client
    pub async fn new(config: OperatorConfig) -> Result<Self> {
        let client = Client::try_default().await?;
        Self::with_client(config, client)
    }

    pub fn with_client(config: OperatorConfig, client: Client) -> Result<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            config,
            client,
            metrics: Metrics::new()?,
            ready: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        })
    }

    /// Start the operator and block until shutdown
    pub async fn run(self) -> Result<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            namespace = self.config.watch_namespace.as_deref().unwrap_or("all"),
            "Starting Appsody application operator"
        );

        let health_listener = TcpListener::bind(self.config.health_addr).await?;
        let metrics_listener = TcpListener::bind(self.config.metrics_addr).await?;
        let health_handle = serve("health", health_listener, health_router(self.ready.clone()));
        let metrics_handle = serve("metrics", metrics_listener, metrics_router(self.metrics.clone()));

        let client = self.client.clone();
        let config = self.config.clone();
        let metrics = self.metrics.clone();
        let shutdown_tx = self.shutdown_tx.clone();
        let controller_handle = tokio::spawn(async move {
            if let Err(e) = run_controller(client, config, metrics).await {
                error!(error = %e, "Controller failed");
            }
            let _ = shutdown_tx.send(());
        });
        self.ready.store(true, Ordering::SeqCst);

        self.wait_for_shutdown().await;
        info!("Shutdown signal received, stopping operator");
        self.ready.store(false, Ordering::SeqCst);

        controller_handle.abort();
        health_handle.abort();
        metrics_handle.abort();

        info!("Appsody operator stopped");
        Ok(())
    }

    async fn wait_for_shutdown(&self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Cannot install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = signal::ctrl_c() => info!("Received SIGINT"),
            _ = terminate => info!("Received SIGTERM"),
            _ = shutdown_rx.recv() => info!("Controller exited"),
        }
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Ask a running manager to stop
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn serve(name: &'static str, listener: TcpListener, router: Router) -> tokio::task::JoinHandle<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(address = %addr, "Starting {} server", name);
    }
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "{} server failed", name);
        }
    })
}

/// `/healthz` always answers, `/readyz` once the controller is running
pub fn health_router(ready: Arc<AtomicBool>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness))
        .with_state(ready)
}

async fn readiness(State(ready): State<Arc<AtomicBool>>) -> (StatusCode, &'static str) {
    if ready.load(Ordering::SeqCst) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

pub fn metrics_router(metrics: Metrics) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<Metrics>) -> (StatusCode, String) {
    match metrics.render() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Operator builder for fluent configuration
pub struct OperatorBuilder {
    config: OperatorConfig,
}

impl OperatorBuilder {
    pub fn new() -> Self {
        Self {
            config: OperatorConfig::default(),
        }
    }

    pub fn watch_namespace(mut self, namespace: Option<String>) -> Self {
        self.config.watch_namespace = namespace.filter(|ns| !ns.is_empty());
        self
    }

    pub fn operator_namespace(mut self, namespace: Option<String>) -> Self {
        self.config.operator_namespace = namespace.filter(|ns| !ns.is_empty());
        self
    }

    pub fn resync_interval(mut self, interval: Duration) -> Self {
        self.config.resync_interval = interval;
        self
    }

    pub fn health_addr(mut self, addr: SocketAddr) -> Self {
        self.config.health_addr = addr;
        self
    }

    pub fn metrics_addr(mut self, addr: SocketAddr) -> Self {
        self.config.metrics_addr = addr;
        self
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub async fn build(self) -> Result<OperatorManager> {
        OperatorManager::new(self.config).await
    }
}

impl Default for OperatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
