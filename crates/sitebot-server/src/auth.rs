use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::state::AppState;

/// Axum middleware that gates the programmatic API behind the shared secret.
///
/// The secret is accepted from either header:
/// 1. `x-api-secret: <secret>`
/// 2. `Authorization: Bearer <secret>`
///
/// With no secret configured every request is rejected.
pub async fn require_api_secret(
    State(app): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = app.config.server.api_secret.as_deref() else {
        tracing::warn!(path = %req.uri().path(), "api secret not configured, rejecting");
        return AppError::unauthorized().into_response();
    };

    match presented_secret(req.headers()) {
        Some(secret) if secret == expected => next.run(req).await,
        _ => AppError::unauthorized().into_response(),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    if let Some(secret) = headers.get("x-api-secret").and_then(|v| v.to_str().ok()) {
        return Some(secret);
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Components;
    use axum::http::StatusCode;
    use axum::{body::Body, http::Request, middleware, routing::get, Router};
    use sitebot_core::config::Config;
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    fn test_app(secret: Option<&str>) -> Router {
        let mut config = Config::default();
        config.server.api_secret = secret.map(str::to_string);
        let (state, _) = AppState::new(config, Components::default());
        Router::new()
            .route("/api/status", get(ok_handler))
            .layer(middleware::from_fn_with_state(state, require_api_secret))
    }

    async fn status_with(app: Router, header: Option<(&str, &str)>) -> StatusCode {
        let mut builder = Request::builder().uri("/api/status");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn matching_header_passes() {
        let app = test_app(Some("s3cret"));
        assert_eq!(
            status_with(app, Some(("x-api-secret", "s3cret"))).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn bearer_token_passes() {
        let app = test_app(Some("s3cret"));
        assert_eq!(
            status_with(app, Some(("authorization", "Bearer s3cret"))).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn wrong_or_missing_secret_is_401() {
        assert_eq!(
            status_with(test_app(Some("s3cret")), Some(("x-api-secret", "nope"))).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_with(test_app(Some("s3cret")), None).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn unconfigured_secret_rejects_everything() {
        assert_eq!(
            status_with(test_app(None), Some(("x-api-secret", ""))).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn presented_secret_prefers_dedicated_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer b".parse().unwrap());
        assert_eq!(presented_secret(&headers), Some("b"));
        headers.insert("x-api-secret", "a".parse().unwrap());
        assert_eq!(presented_secret(&headers), Some("a"));
    }
}
