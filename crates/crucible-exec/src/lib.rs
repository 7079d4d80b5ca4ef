//! Sandboxed wasm execution for Crucible.
//!
//! Modules run against a fixed linear-memory protocol: the input bytes are
//! copied to offset [`INPUT_PTR`], `run(input_ptr, input_len, output_ptr)`
//! is invoked, and its `i32` return (read as unsigned) gives the number of
//! output bytes at [`OUTPUT_PTR`], capped at [`MAX_OUTPUT`].
//!
//! Every invocation uses a freshly instantiated module in its own store,
//! with nothing linked: the contract has zero import requirements, so the
//! guest gets no ambient authority of any kind. Compiled modules are cached
//! by content hash; cache entries are immutable.

pub mod error;
pub mod executor;

pub use error::{ExecError, ExecResult};
pub use executor::{Executor, INPUT_PTR, MAX_OUTPUT, OUTPUT_PTR, WASM_PAGE_SIZE};
