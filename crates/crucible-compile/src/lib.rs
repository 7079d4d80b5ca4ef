//! The Crucible compilation pipeline.
//!
//! For a (language, source) pair: allocate a scratch directory, write the
//! source, invoke the language's toolchain as a subprocess, read back the
//! wasm artifact, validate it against the execution contract, store both
//! source and artifact in the blob store, and record exactly one compile
//! event regardless of outcome.
//!
//! Languages are rows in a [`LanguageRegistry`], not code: each names an
//! input file, an output file, the executable, and an argv template.
//! Adding a language is a configuration change.

pub mod error;
pub mod language;
pub mod pipeline;

pub use error::{CompileError, CompileResult};
pub use language::{Language, LanguageRegistry};
pub use pipeline::{CompileOutcome, Compiler, CompilerConfig};
