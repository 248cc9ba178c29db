pub mod client;
pub mod config;
pub mod error;
pub mod registry;
pub mod router;
pub mod websocket;

use std::sync::Arc;
use actix_web::{web, HttpResponse};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use registry::SessionRegistry;
pub use router::{MessageRouter, RouteOutcome};
pub use websocket::RelayServer;

/// Liveness check, a static acknowledgement.
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("Chat relay server is running")
}

/// Routes served by the relay. Expects `web::Data<AppState>` to be registered.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(health_check))
        .route("/ws", web::get().to(websocket::websocket_route));
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub relay: RelayServer,
}

impl AppState {
    pub fn new(config: Settings) -> Self {
        let relay = RelayServer::new(config.registry.default_name.clone());
        Self {
            config: Arc::new(config),
            relay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_state_creation() {
        let config = Settings::new_for_test().expect("Failed to load test config");
        let state = AppState::new(config);

        assert_eq!(state.relay.pool().connection_count().await, 0);
        assert!(state.relay.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_app_state_clone() {
        let config = Settings::new_for_test().expect("Failed to load test config");
        let state = AppState::new(config);

        let cloned = state.clone();

        // Verify Arc references are shared
        assert!(Arc::ptr_eq(&state.config, &cloned.config));
        assert!(Arc::ptr_eq(&state.relay.pool(), &cloned.relay.pool()));
        assert!(Arc::ptr_eq(&state.relay.registry(), &cloned.relay.registry()));
    }
}
