//! Durable state for Crucible.
//!
//! This crate implements the three cooperating pieces of the service's
//! state machine behind storage traits:
//!
//! - **Blob store** — content-addressed byte storage keyed by lowercase hex
//!   SHA-256 of contents. Insertion is idempotent; blobs are never deleted.
//! - **Alias registry** — mutable mapping from name to blob hash. Setting an
//!   alias requires the target blob to exist.
//! - **Event log** — append-only sequence of typed records with strictly
//!   monotonic ids reflecting commit order.
//!
//! # Storage Backends
//!
//! All backends implement [`BlobStore`], [`AliasRegistry`], and
//! [`EventLog`] (and, through the blanket impl, [`StateStore`]):
//!
//! - [`MemoryState`] — `HashMap`-based store for tests and embedding
//! - [`SqliteState`] — the durable SQLite backend
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once written; re-inserting equal content keeps
//!    the existing row and its `created_at`.
//! 2. An alias never points at a missing blob at any observable moment.
//! 3. Every write is atomic with respect to its own pre-check.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use error::{StateError, StateResult};
pub use memory::MemoryState;
pub use sqlite::SqliteState;
pub use traits::{
    clamp_limit, AliasRegistry, BlobStore, EventLog, StateStore, DEFAULT_EVENT_LIMIT,
    MAX_EVENT_LIMIT,
};
