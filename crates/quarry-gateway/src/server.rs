use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use quarry_core::ChatOrchestrator;
use quarry_llm::{AnyEmbedder, AnyProvider};
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::router::build_router;

pub type SharedOrchestrator = Arc<ChatOrchestrator<AnyProvider, AnyEmbedder>>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub orchestrator: SharedOrchestrator,
    pub started_at: Instant,
}

pub struct GatewayServer {
    addr: SocketAddr,
    max_body_size: usize,
    orchestrator: SharedOrchestrator,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    #[must_use]
    pub fn new(
        bind: &str,
        port: u16,
        orchestrator: SharedOrchestrator,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        if bind == "0.0.0.0" {
            tracing::warn!("binding to 0.0.0.0; the API has no authentication");
        }

        Self {
            addr,
            max_body_size: 1_048_576,
            orchestrator,
            shutdown_rx,
        }
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Start the HTTP server and run until the shutdown signal flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or encounters a fatal I/O error.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let state = AppState {
            orchestrator: self.orchestrator,
            started_at: Instant::now(),
        };

        let router = build_router(state, self.max_body_size);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Bind(self.addr.to_string(), e))?;
        tracing::info!("listening on {}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow_and_update() {
                    if shutdown_rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                tracing::info!("server shutting down");
            })
            .await
            .map_err(|e| GatewayError::Server(format!("{e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use quarry_core::orchestrator::ChatSettings;
    use quarry_index::{RetrievalService, RetrievalSettings};
    use quarry_llm::mock::{MockEmbedder, MockProvider};

    use super::*;

    fn orchestrator() -> SharedOrchestrator {
        let retrieval = RetrievalService::new(
            AnyEmbedder::Mock(MockEmbedder::new(8)),
            RetrievalSettings::default(),
        )
        .unwrap();
        Arc::new(ChatOrchestrator::new(
            AnyProvider::Mock(MockProvider::default()),
            Arc::new(retrieval),
            ChatSettings::default(),
        ))
    }

    #[test]
    fn server_builder_chain() {
        let (_stx, srx) = watch::channel(false);
        let server = GatewayServer::new("127.0.0.1", 8000, orchestrator(), srx).with_max_body_size(512);
        assert_eq!(server.max_body_size, 512);
        assert_eq!(server.addr.port(), 8000);
    }

    #[test]
    fn server_invalid_bind_fallback() {
        let (_stx, srx) = watch::channel(false);
        let server = GatewayServer::new("not_an_ip", 9999, orchestrator(), srx);
        assert_eq!(server.addr, SocketAddr::from(([127, 0, 0, 1], 9999)));
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown_signal() {
        let (stx, srx) = watch::channel(false);
        let server = GatewayServer::new("127.0.0.1", 0, orchestrator(), srx);
        let handle = tokio::spawn(server.serve());
        stx.send(true).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
