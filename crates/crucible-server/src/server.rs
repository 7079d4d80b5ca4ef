use std::sync::Arc;

use tokio::net::TcpListener;

use crucible_service::Service;

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::router::build_router;

/// The Crucible HTTP server.
pub struct CrucibleServer {
    config: ServerConfig,
    service: Arc<Service>,
}

impl CrucibleServer {
    pub fn new(service: Arc<Service>, config: ServerConfig) -> Self {
        Self { config, service }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(Arc::clone(&self.service), self.config.clone())
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!("crucible server listening on {}", self.config.bind_addr);
        axum::serve(listener, app).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_service::ServiceConfig;

    fn server() -> CrucibleServer {
        let service = Arc::new(Service::new(ServiceConfig::default()).unwrap());
        CrucibleServer::new(service, ServerConfig::default())
    }

    #[test]
    fn server_construction() {
        assert_eq!(
            server().config().bind_addr,
            "127.0.0.1:7447".parse().unwrap()
        );
    }

    #[test]
    fn router_builds() {
        let _router = server().router();
    }
}
