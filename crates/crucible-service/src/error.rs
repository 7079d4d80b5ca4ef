use crucible_compile::CompileError;
use crucible_exec::ExecError;
use crucible_state::StateError;

/// Errors from service operations.
///
/// Variants are grouped by disposition: the first four are client errors
/// the server maps to 4xx, `Compile` and `Exec` carry their own taxonomy,
/// and `State`/`Internal` are fatal to the request.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The ref matched neither an alias nor a stored blob.
    #[error("unknown ref: {0}")]
    UnknownRef(String),

    /// No alias with this name.
    #[error("alias not found: {0}")]
    AliasNotFound(String),

    /// `set_alias` named a blob that does not exist.
    #[error("alias target does not exist: {0}")]
    AliasTargetMissing(String),

    /// The client sent a string that is not a blob hash.
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("state error: {0}")]
    State(StateError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StateError> for ServiceError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::AliasTargetMissing { hash } => Self::AliasTargetMissing(hash),
            other => Self::State(other),
        }
    }
}

/// Result alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
