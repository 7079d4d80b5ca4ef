/// Errors from type-level parsing and conversion.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    /// The input is not valid hexadecimal.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// The hex string has the wrong length for a SHA-256 digest.
    #[error("invalid hash length: expected {expected} hex chars, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// The string does not name a known event kind.
    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),

    /// The string is not a timestamp in the canonical millisecond format.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
