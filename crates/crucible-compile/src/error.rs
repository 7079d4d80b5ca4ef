use crucible_state::StateError;

/// Errors from the compilation pipeline.
///
/// The first three variants are client errors raised before any work
/// begins; `Toolchain` covers every way the external compiler can fail
/// (non-zero exit, timeout, overlong output, missing artifact) and carries
/// the user-visible message already recorded on the compile event.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("unknown language: {0}")]
    UnknownLanguage(String),

    #[error("source is empty")]
    EmptySource,

    #[error("source is not valid UTF-8 text")]
    NotText,

    #[error("{message}")]
    Toolchain { message: String },

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for pipeline operations.
pub type CompileResult<T> = Result<T, CompileError>;
