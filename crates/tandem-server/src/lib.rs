//! # tandem-server
//!
//! Assembles the Tandem services into one HTTP application:
//! - `/signal`: browser signaling WebSocket
//! - `/bridge`: translation collaborator WebSocket
//! - `/health`: liveness and coordinator statistics
//! - everything else: static browser assets, when configured

pub mod collaborator;
pub mod health;

use axum::Router;
use tandem_common::config::AppConfig;
use tandem_signaling::SignalingServer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Build the complete router with all routes and middleware.
pub fn build_app(signaling: &SignalingServer, config: &AppConfig) -> Router {
    let mut app = Router::new()
        .merge(signaling.router())
        .merge(tandem_bridge::build_router(
            signaling.handle().clone(),
            &config.bridge,
        ))
        .merge(health::router(signaling.clone()));

    if let Some(dir) = &config.server.static_dir {
        tracing::info!(dir = %dir, "Serving static assets");
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
    )
}

/// URL the collaborator uses to reach the bridge on this host.
pub fn bridge_url(port: u16) -> String {
    format!("ws://127.0.0.1:{port}/bridge")
}
