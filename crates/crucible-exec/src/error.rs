/// Errors from wasm execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The bytes are not a loadable wasm module.
    #[error("invalid wasm module: {0}")]
    BadModule(String),

    /// Instantiation failed (unresolved imports, start trap).
    #[error("instantiation failed: {0}")]
    Instantiation(String),

    #[error("Module does not export 'memory'")]
    MissingMemory,

    #[error("Module does not export 'run'")]
    MissingRun,

    /// An export exists but has the wrong type for the contract.
    #[error("export '{name}' has the wrong type: {message}")]
    WrongExportType { name: &'static str, message: String },

    /// Linear memory could not be grown to the contract minimum.
    #[error("failed to grow memory to {required} pages: {message}")]
    MemoryGrow { required: u64, message: String },

    /// An out-of-bounds read or write against linear memory.
    #[error("memory access out of bounds: {0}")]
    MemoryAccess(String),

    /// The guest trapped; the message comes from the runtime.
    #[error("{0}")]
    Trap(String),

    /// `run` returned a length beyond the protocol maximum.
    #[error("output length {len} exceeds maximum {max}")]
    OutputTooLarge { len: u64, max: u64 },
}

/// Result alias for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
