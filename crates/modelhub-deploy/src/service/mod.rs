//! Service lifecycle management.
//!
//! Provides the main service runner with signal handling and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api;
use crate::auth::Authenticator;
use crate::config::HubConfig;
use crate::deployment::DeploymentManager;
use crate::error::{HubError, HubResult};
use crate::health::HealthMonitor;
use crate::provisioner::create_provisioner;
use crate::store::{DeploymentStore, MemoryStore, ModelCatalog, PostgresStore};

/// The deployment service.
///
/// Manages the lifecycle of the deployment subsystem, including:
/// - Database connections
/// - Deployment manager and its provisioning tasks
/// - Health monitor
/// - HTTP API server
/// - Signal handling and graceful shutdown
pub struct HubService {
    config: HubConfig,
    cancel: CancellationToken,
}

impl HubService {
    /// Create a new service with the given configuration.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Run the service.
    ///
    /// This will:
    /// 1. Connect to the database (or use in-memory store as fallback)
    /// 2. Create the deployment manager
    /// 3. Start the health monitor
    /// 4. Start the HTTP API server
    /// 5. Wait for shutdown signal, then drain provisioning tasks
    pub async fn run(&self) -> HubResult<()> {
        let (store, catalog) = self.create_store().await;

        let provisioner = create_provisioner(&self.config.provisioning);
        info!(provisioner = provisioner.name(), "provisioner configured");

        let manager = Arc::new(DeploymentManager::new(
            Arc::clone(&store),
            catalog,
            provisioner,
            self.config.logs,
        ));
        info!("deployment manager initialised");

        let monitor = if self.config.health.enabled {
            let monitor = HealthMonitor::new(Arc::clone(&manager), self.config.health.interval());
            Some(tokio::spawn(monitor.run(self.cancel.child_token())))
        } else {
            None
        };

        let state = api::AppState {
            manager: Arc::clone(&manager),
            store,
            auth: Authenticator::new(&self.config.auth),
        };
        let app = api::router(
            state,
            Duration::from_secs(self.config.server.request_timeout_secs),
        );

        let listener = tokio::net::TcpListener::bind(self.config.server.listen_addr)
            .await
            .map_err(|e| HubError::Config(format!("failed to bind TCP: {e}")))?;
        info!(addr = %self.config.server.listen_addr, "deployment service listening");

        let cancel = self.cancel.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel.clone()))
            .await
            .map_err(|e| HubError::Internal(format!("server error: {e}")));

        cancel.cancel();
        if let Some(monitor) = monitor {
            if let Err(e) = monitor.await {
                error!(error = %e, "health monitor task failed");
            }
        }
        manager.shutdown().await;

        served?;
        info!("deployment service shutdown complete");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn create_store(&self) -> (Arc<dyn DeploymentStore>, Arc<dyn ModelCatalog>) {
        match PostgresStore::new(&self.config.database).await {
            Ok(store) => {
                info!("connected to PostgreSQL");
                let store = Arc::new(store);
                (store.clone(), store)
            }
            Err(e) => {
                error!(
                    error = %e,
                    "failed to connect to PostgreSQL, using in-memory store"
                );
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {
            info!("shutdown requested");
        }
    }
}
