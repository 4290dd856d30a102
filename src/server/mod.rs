//! HTTP surface: five JSON endpoints over `CityService`.

mod handlers;
mod state;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

use crate::service::CityService;

pub fn build_router(service: CityService) -> Router {
    let state = Arc::new(AppState { service });

    Router::new()
        .route("/get", get(handlers::list_cities))
        .route("/get/{id}", get(handlers::get_city))
        .route("/create", post(handlers::create_city))
        .route("/delete/{id}", delete(handlers::delete_city))
        .route("/near", post(handlers::near_cities))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until Ctrl+C.
pub async fn start(addr: &str, service: CityService) -> std::io::Result<()> {
    let app = build_router(service);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("City registry listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutting down"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
