pub mod auth;
pub mod error;
pub mod routes;
pub mod state;
pub mod telegram;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, Components};

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Programmatic API: shared secret required.
    let api = Router::new()
        .route("/api/content", post(routes::content::execute))
        .route("/api/status", get(routes::content::status))
        .route("/api/commits", get(routes::commits::list))
        .route("/api/commits/{sha}/revert", post(routes::commits::revert))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::require_api_secret,
        ));

    Router::new()
        .merge(api)
        .route("/api/health", get(routes::content::health))
        // Chat boundary: authenticated by its own secret header and the
        // sender allow-list.
        .route("/api/bot/webhook", post(routes::bot::webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the HTTP server on `0.0.0.0:<port>`.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener).await
}

/// Start the server on a pre-bound listener.
///
/// Returns after a Ctrl-C so the caller can drain the mirror worker.
pub async fn serve_on(app_state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("sitebot listening on http://localhost:{actual_port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
