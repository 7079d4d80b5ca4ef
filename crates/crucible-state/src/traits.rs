use crucible_types::{AliasRecord, BlobHash, BlobRecord, EventKind, EventRecord, NewEvent,
    ResolvedRef};

use crate::error::StateResult;

/// Default number of events returned by [`EventLog::recent`].
pub const DEFAULT_EVENT_LIMIT: usize = 50;

/// Hard ceiling on the number of events a single query may return.
pub const MAX_EVENT_LIMIT: usize = 500;

/// Apply the default and the ceiling to a requested event limit.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_EVENT_LIMIT).min(MAX_EVENT_LIMIT)
}

/// Content-addressed blob storage.
///
/// All implementations must satisfy these invariants:
/// - `put` is idempotent: re-inserting equal content keeps the existing row
///   and its `created_at`.
/// - A stored blob's hash equals the lowercase hex SHA-256 of its data and
///   its size equals the data length.
/// - Blobs are never modified or deleted.
pub trait BlobStore: Send + Sync {
    /// Insert `data` if absent and return its hash either way.
    fn put(&self, data: &[u8]) -> StateResult<BlobHash>;

    /// Read a blob's bytes. Returns `Ok(None)` if absent.
    fn get(&self, hash: &BlobHash) -> StateResult<Option<Vec<u8>>>;

    /// Read a blob's metadata without its bytes. Returns `Ok(None)` if absent.
    fn meta(&self, hash: &BlobHash) -> StateResult<Option<BlobRecord>>;

    /// Whether a blob with this hash exists.
    fn has(&self, hash: &BlobHash) -> StateResult<bool>;

    /// Number of stored blobs.
    fn blob_count(&self) -> StateResult<u64>;

    /// Total bytes across all stored blobs.
    fn total_bytes(&self) -> StateResult<u64>;
}

/// Mutable name-to-hash mapping.
///
/// Every alias points at an existing blob at every observable moment;
/// `set_alias` fails with [`StateError::AliasTargetMissing`] otherwise.
///
/// [`StateError::AliasTargetMissing`]: crate::error::StateError::AliasTargetMissing
pub trait AliasRegistry: Send + Sync {
    /// Create or repoint an alias. First write sets `created_at ==
    /// updated_at`; later writes preserve `created_at` and refresh
    /// `updated_at`. Returns the written record.
    fn set_alias(&self, name: &str, hash: &BlobHash) -> StateResult<AliasRecord>;

    /// Read an alias. Returns `Ok(None)` if absent.
    fn alias(&self, name: &str) -> StateResult<Option<AliasRecord>>;

    /// Delete an alias. Returns `true` if a record was removed.
    fn delete_alias(&self, name: &str) -> StateResult<bool>;

    /// All aliases, ordered by name ascending.
    fn list_aliases(&self) -> StateResult<Vec<AliasRecord>>;

    /// Number of aliases.
    fn alias_count(&self) -> StateResult<u64>;
}

/// Append-only event log.
pub trait EventLog: Send + Sync {
    /// Commit one event. Ids are strictly monotonic in commit order.
    fn record(&self, event: NewEvent) -> StateResult<EventRecord>;

    /// The last `limit` events in descending id order. `None` means the
    /// default limit; any request is clamped to [`MAX_EVENT_LIMIT`].
    fn recent(&self, limit: Option<usize>) -> StateResult<Vec<EventRecord>>;

    /// Total number of events.
    fn event_count(&self) -> StateResult<u64>;

    /// Number of events of one kind.
    fn event_count_by_kind(&self, kind: EventKind) -> StateResult<u64>;
}

/// The combined durable state machine.
///
/// `resolve_ref` implements the protocol-level ref union: a ref string is
/// first matched against alias names, then against blob hashes. The
/// alias-first precedence is deliberate and load-bearing: a name identical
/// to a stored hash resolves as the alias.
pub trait StateStore: BlobStore + AliasRegistry + EventLog {
    fn resolve_ref(&self, reference: &str) -> StateResult<Option<ResolvedRef>> {
        if let Some(alias) = self.alias(reference)? {
            return Ok(Some(ResolvedRef {
                hash: alias.hash,
                alias: Some(alias.name),
            }));
        }
        if let Ok(hash) = BlobHash::from_hex(reference) {
            if self.has(&hash)? {
                return Ok(Some(ResolvedRef { hash, alias: None }));
            }
        }
        Ok(None)
    }
}

impl<T: BlobStore + AliasRegistry + EventLog> StateStore for T {}
