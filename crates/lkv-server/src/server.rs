use std::sync::Arc;

use tokio::net::TcpListener;

use lkv_gateway::LedgerClient;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// REST server over a [`LedgerClient`].
pub struct LkvServer {
    config: ServerConfig,
    client: Arc<LedgerClient>,
}

impl LkvServer {
    pub fn new(config: ServerConfig, client: Arc<LedgerClient>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(AppState::new(Arc::clone(&self.client)), self.config.permissive_cors)
    }

    /// Serve until Ctrl-C, then stop the client's session pool.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "ledger KV server listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        self.client.shutdown();
        tracing::info!("ledger KV server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lkv_gateway::testutil::TestEnv;

    #[tokio::test]
    async fn server_construction() {
        let env = TestEnv::new();
        let server = LkvServer::new(ServerConfig::default(), Arc::new(env.client()));
        assert_eq!(server.config().bind_addr.port(), 3000);
        let _router = server.router();
    }
}
