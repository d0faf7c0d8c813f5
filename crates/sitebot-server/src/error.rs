use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sitebot_core::SiteError;

// ---------------------------------------------------------------------------
// AppError: error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
///
/// Renders the failure half of the action envelope,
/// `{"success": false, "error": "..."}`, with a status derived from the
/// underlying [`SiteError`] when there is one.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn unauthorized() -> Self {
        Self(SiteError::Unauthorized.into())
    }

    pub fn status(&self) -> StatusCode {
        if let Some(rejection) = self.0.downcast_ref::<JsonRejection>() {
            return rejection.status();
        }
        let Some(e) = self.0.downcast_ref::<SiteError>() else {
            return StatusCode::INTERNAL_SERVER_ERROR;
        };
        match e {
            SiteError::Unauthorized => StatusCode::UNAUTHORIZED,
            SiteError::UnknownAction(_) => StatusCode::BAD_REQUEST,
            SiteError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            SiteError::NoParentCommit(_) | SiteError::NoChangedFiles(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            // A known tag with missing or mistyped fields fails like the
            // store write it would have become.
            SiteError::InvalidAction { .. }
            | SiteError::ExpectedSingleRow { .. }
            | SiteError::Store { .. }
            | SiteError::Remote { .. }
            | SiteError::PartialRevert { .. }
            | SiteError::InterpreterParse(_)
            | SiteError::Transcription(_)
            | SiteError::Network(_)
            | SiteError::NotConfigured(_)
            | SiteError::Io(_)
            | SiteError::Yaml(_)
            | SiteError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "success": false, "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
