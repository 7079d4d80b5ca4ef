//! Wasm ABI contract validation.
//!
//! Crucible executes modules through a fixed export surface: a linear
//! memory exported as `memory` and a function exported as `run` with type
//! `(i32, i32, i32) -> (i32)`, plus an optional no-argument `_initialize`
//! the harness calls before `run`. This crate decides whether a raw wasm
//! binary conforms, using a hand-rolled parser over the module's section
//! structure. It never executes or fully validates the module; that is the
//! runtime's job.
//!
//! Validation is total: any decode failure becomes an error entry in the
//! returned [`ValidationReport`] rather than a panic or an `Err`.

mod parser;
mod validate;

pub use validate::{validate, ExportInfo, ValidationInfo, ValidationReport};
