use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

use crucible_compile::CompileError;
use crucible_service::ServiceError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// `/run` input over the configured cap.
    #[error("input exceeds {max} bytes")]
    InputTooLarge { max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Status mapping for the error taxonomy: client-invalid requests and
/// compiler/execution failures are 4xx with the captured message; missing
/// refs and aliases are 404; anything touching storage is 500.
fn status_for(error: &ServerError) -> StatusCode {
    match error {
        ServerError::Service(service) => match service {
            ServiceError::UnknownRef(_) | ServiceError::AliasNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ServiceError::AliasTargetMissing(_) | ServiceError::InvalidHash(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Compile(compile) => match compile {
                CompileError::State(_) | CompileError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::BAD_REQUEST,
            },
            ServiceError::Exec(_) => StatusCode::BAD_REQUEST,
            ServiceError::State(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        ServerError::InputTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ServerError::Io(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::error!(%status, "request failed: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
