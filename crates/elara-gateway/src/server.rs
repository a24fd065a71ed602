use std::sync::Arc;

use elara_common::Result;
use elara_config::AppConfig;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::router::build_router;
use crate::state::AppState;

/// Binds the configured address and serves the gateway until Ctrl-C.
pub struct GatewayServer {
    config: AppConfig,
}

impl GatewayServer {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.gateway.host, self.config.gateway.port);
        let state = Arc::new(AppState::new(self.config));
        let app = build_router(state);

        let listener = TcpListener::bind(&addr).await?;
        info!("Elara gateway listening on http://{}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!("failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
