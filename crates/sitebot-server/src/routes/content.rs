use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::{json, Value};
use sitebot_core::action::Action;
use sitebot_core::dispatch::ActionResult;

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/content: apply one action and return the result envelope.
///
/// Unlike the chat boundary this reports the real status: 400 for an
/// unrecognised action or an unreadable body, 503 without a store, 500 when
/// the action is malformed or the store rejects the change. Every failure
/// carries the `{success: false, error}` envelope.
pub async fn execute(
    State(app): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ActionResult>, AppError> {
    let Json(body) = body?;
    let dispatcher = app.dispatcher()?;
    let action = Action::from_value(body)?;
    let result = dispatcher.run(&action).await?;
    Ok(Json(ActionResult::ok(result)))
}

/// GET /api/status: per-collection row counts.
pub async fn status(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let status = app.dispatcher()?.status().await?;
    Ok(Json(status))
}

/// GET /api/health: liveness plus which integrations are wired.
pub async fn health(State(app): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "store": app.dispatcher.is_some(),
        "repository": app.repo.is_some(),
        "bot": app.messenger.is_some(),
    }))
}
