//! Foundation types for Crucible.
//!
//! This crate provides the identity, record, and timestamp types used
//! throughout the Crucible system. Every other Crucible crate depends on
//! `crucible-types`.
//!
//! # Key Types
//!
//! - [`BlobHash`] — Content-addressed identifier (SHA-256, lowercase hex)
//! - [`BlobRecord`] / [`AliasRecord`] — Durable store rows
//! - [`EventKind`] / [`EventRecord`] / [`NewEvent`] — The append-only event log shape
//! - [`ResolvedRef`] — Result of alias-first ref resolution

pub mod error;
pub mod hash;
pub mod record;
pub mod timestamp;

pub use error::TypeError;
pub use hash::BlobHash;
pub use record::{AliasRecord, BlobRecord, EventKind, EventRecord, NewEvent, ResolvedRef};
