//! Error types for the HTTP layer.
//!
//! [`ApiError`] unifies engine failures and request-shape failures into a
//! single enum that converts into an Axum response. Engine failures are
//! mapped through [`ErrorKind`] so no handler inspects engine internals.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rowantree_core::{EngineError, ErrorKind};

/// Errors that can occur while serving a request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The engine rejected or failed the operation.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A user id could not be parsed from the request path.
    #[error("invalid user id: {0}")]
    InvalidUuid(String),

    /// A request body failed validation.
    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl ApiError {
    /// The failure kind reported to the client.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Engine(error) => error.kind(),
            Self::InvalidUuid(_) | Self::Validation(_) => ErrorKind::InvalidRequest,
        }
    }
}

/// HTTP status for a failure kind.
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::UserNotFound | ErrorKind::UnknownRecipe => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientResources
        | ErrorKind::InsufficientPopulation
        | ErrorKind::UserAlreadyExists
        | ErrorKind::RecipeUnavailable => StatusCode::CONFLICT,
        ErrorKind::InvalidTier | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::PersistenceFailure => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);

        if status.is_server_error() {
            tracing::warn!(%kind, error = %self, "Request failed");
        } else {
            tracing::debug!(%kind, error = %self, "Request rejected");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "kind": kind,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
