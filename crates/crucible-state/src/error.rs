/// Errors from state store operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// `set_alias` named a blob that is not in the store.
    #[error("alias target does not exist: {hash}")]
    AliasTargetMissing { hash: String },

    /// A stored row could not be decoded (corrupt hash, timestamp, or kind).
    #[error("corrupt row: {0}")]
    CorruptRow(String),

    /// Error from the SQLite backend.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for state operations.
pub type StateResult<T> = Result<T, StateError>;
