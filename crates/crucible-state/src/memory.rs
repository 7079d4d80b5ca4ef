use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use crucible_types::{
    timestamp, AliasRecord, BlobHash, BlobRecord, EventKind, EventRecord, NewEvent,
};

use crate::error::StateResult;
use crate::traits::{clamp_limit, AliasRegistry, BlobStore, EventLog};
use crate::StateError;

struct StoredBlob {
    data: Vec<u8>,
    created_at: DateTime<Utc>,
}

/// In-memory, HashMap-based state store.
///
/// Intended for tests and embedding. All data is held in memory behind
/// `RwLock`s and lost on drop. Event ids start at 1 and grow by one per
/// committed event, matching the SQLite backend's autoincrement column.
pub struct MemoryState {
    blobs: RwLock<HashMap<BlobHash, StoredBlob>>,
    aliases: RwLock<HashMap<String, AliasRecord>>,
    events: RwLock<Vec<EventRecord>>,
}

impl MemoryState {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
            events: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryState")
            .field("blobs", &self.blobs.read().expect("lock poisoned").len())
            .field("aliases", &self.aliases.read().expect("lock poisoned").len())
            .field("events", &self.events.read().expect("lock poisoned").len())
            .finish()
    }
}

impl BlobStore for MemoryState {
    fn put(&self, data: &[u8]) -> StateResult<BlobHash> {
        let hash = BlobHash::of(data);
        let mut blobs = self.blobs.write().expect("lock poisoned");
        // Idempotent: equal content keeps the existing row and created_at.
        blobs.entry(hash).or_insert_with(|| StoredBlob {
            data: data.to_vec(),
            created_at: timestamp::now(),
        });
        Ok(hash)
    }

    fn get(&self, hash: &BlobHash) -> StateResult<Option<Vec<u8>>> {
        let blobs = self.blobs.read().expect("lock poisoned");
        Ok(blobs.get(hash).map(|b| b.data.clone()))
    }

    fn meta(&self, hash: &BlobHash) -> StateResult<Option<BlobRecord>> {
        let blobs = self.blobs.read().expect("lock poisoned");
        Ok(blobs.get(hash).map(|b| BlobRecord {
            hash: *hash,
            size: b.data.len() as u64,
            created_at: b.created_at,
        }))
    }

    fn has(&self, hash: &BlobHash) -> StateResult<bool> {
        let blobs = self.blobs.read().expect("lock poisoned");
        Ok(blobs.contains_key(hash))
    }

    fn blob_count(&self) -> StateResult<u64> {
        Ok(self.blobs.read().expect("lock poisoned").len() as u64)
    }

    fn total_bytes(&self) -> StateResult<u64> {
        let blobs = self.blobs.read().expect("lock poisoned");
        Ok(blobs.values().map(|b| b.data.len() as u64).sum())
    }
}

impl AliasRegistry for MemoryState {
    fn set_alias(&self, name: &str, hash: &BlobHash) -> StateResult<AliasRecord> {
        // The existence check and the write are under the alias lock, and
        // blobs are never removed, so the target cannot vanish in between.
        if !self.has(hash)? {
            return Err(StateError::AliasTargetMissing {
                hash: hash.to_hex(),
            });
        }
        let now = timestamp::now();
        let mut aliases = self.aliases.write().expect("lock poisoned");
        let record = match aliases.get(name) {
            Some(existing) => AliasRecord {
                name: name.to_string(),
                hash: *hash,
                created_at: existing.created_at,
                updated_at: now,
            },
            None => AliasRecord {
                name: name.to_string(),
                hash: *hash,
                created_at: now,
                updated_at: now,
            },
        };
        aliases.insert(name.to_string(), record.clone());
        Ok(record)
    }

    fn alias(&self, name: &str) -> StateResult<Option<AliasRecord>> {
        let aliases = self.aliases.read().expect("lock poisoned");
        Ok(aliases.get(name).cloned())
    }

    fn delete_alias(&self, name: &str) -> StateResult<bool> {
        let mut aliases = self.aliases.write().expect("lock poisoned");
        Ok(aliases.remove(name).is_some())
    }

    fn list_aliases(&self) -> StateResult<Vec<AliasRecord>> {
        let aliases = self.aliases.read().expect("lock poisoned");
        let mut list: Vec<AliasRecord> = aliases.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    fn alias_count(&self) -> StateResult<u64> {
        Ok(self.aliases.read().expect("lock poisoned").len() as u64)
    }
}

impl EventLog for MemoryState {
    fn record(&self, event: NewEvent) -> StateResult<EventRecord> {
        let mut events = self.events.write().expect("lock poisoned");
        let record = EventRecord {
            id: events.len() as i64 + 1,
            timestamp: timestamp::now(),
            kind: event.kind_or_default(),
            language: event.language,
            input_hash: event.input_hash,
            output_hash: event.output_hash,
            module_hash: event.module_hash,
            alias: event.alias,
            output_size: event.output_size,
            duration_ms: event.duration_ms,
            success: event.success,
            error: event.error,
        };
        events.push(record.clone());
        Ok(record)
    }

    fn recent(&self, limit: Option<usize>) -> StateResult<Vec<EventRecord>> {
        let limit = clamp_limit(limit);
        let events = self.events.read().expect("lock poisoned");
        Ok(events.iter().rev().take(limit).cloned().collect())
    }

    fn event_count(&self) -> StateResult<u64> {
        Ok(self.events.read().expect("lock poisoned").len() as u64)
    }

    fn event_count_by_kind(&self, kind: EventKind) -> StateResult<u64> {
        let events = self.events.read().expect("lock poisoned");
        Ok(events.iter().filter(|e| e.kind == kind).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StateStore;

    // -----------------------------------------------------------------------
    // Blob store
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_get_roundtrip() {
        let state = MemoryState::new();
        let hash = state.put(b"hello world").unwrap();
        assert_eq!(state.get(&hash).unwrap().unwrap(), b"hello world");
    }

    #[test]
    fn put_empty_blob() {
        let state = MemoryState::new();
        let hash = state.put(b"").unwrap();
        assert_eq!(
            hash.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(state.get(&hash).unwrap().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn put_is_idempotent() {
        let state = MemoryState::new();
        let h1 = state.put(b"same").unwrap();
        let created = state.meta(&h1).unwrap().unwrap().created_at;
        let h2 = state.put(b"same").unwrap();
        assert_eq!(h1, h2);
        assert_eq!(state.blob_count().unwrap(), 1);
        // Re-put preserves the original created_at.
        assert_eq!(state.meta(&h1).unwrap().unwrap().created_at, created);
    }

    #[test]
    fn meta_reports_size() {
        let state = MemoryState::new();
        let hash = state.put(b"12345").unwrap();
        let meta = state.meta(&hash).unwrap().unwrap();
        assert_eq!(meta.size, 5);
        assert_eq!(meta.hash, hash);
    }

    #[test]
    fn missing_blob_is_none() {
        let state = MemoryState::new();
        let hash = BlobHash::of(b"never stored");
        assert!(state.get(&hash).unwrap().is_none());
        assert!(state.meta(&hash).unwrap().is_none());
        assert!(!state.has(&hash).unwrap());
    }

    #[test]
    fn total_bytes_sums_blob_sizes() {
        let state = MemoryState::new();
        state.put(b"12345").unwrap();
        state.put(b"123456789").unwrap();
        assert_eq!(state.total_bytes().unwrap(), 14);
    }

    // -----------------------------------------------------------------------
    // Alias registry
    // -----------------------------------------------------------------------

    #[test]
    fn set_alias_requires_existing_blob() {
        let state = MemoryState::new();
        let missing = BlobHash::of(b"nope");
        let err = state.set_alias("foo", &missing).unwrap_err();
        assert!(matches!(err, StateError::AliasTargetMissing { .. }));
        assert!(state.alias("foo").unwrap().is_none());
    }

    #[test]
    fn alias_lifecycle_timestamps() {
        let state = MemoryState::new();
        let h1 = state.put(b"one").unwrap();
        let h2 = state.put(b"two").unwrap();

        let first = state.set_alias("foo", &h1).unwrap();
        assert_eq!(first.created_at, first.updated_at);

        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = state.set_alias("foo", &h2).unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > second.created_at);
        assert_eq!(second.hash, h2);
    }

    #[test]
    fn delete_alias_reports_presence() {
        let state = MemoryState::new();
        let hash = state.put(b"blob").unwrap();
        state.set_alias("gone", &hash).unwrap();
        assert!(state.delete_alias("gone").unwrap());
        assert!(!state.delete_alias("gone").unwrap());
        assert!(state.alias("gone").unwrap().is_none());
    }

    #[test]
    fn list_aliases_sorted_by_name() {
        let state = MemoryState::new();
        let hash = state.put(b"blob").unwrap();
        state.set_alias("zeta", &hash).unwrap();
        state.set_alias("alpha", &hash).unwrap();
        state.set_alias("mid", &hash).unwrap();
        let names: Vec<String> = state
            .list_aliases()
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    // -----------------------------------------------------------------------
    // Event log
    // -----------------------------------------------------------------------

    #[test]
    fn event_ids_are_monotonic() {
        let state = MemoryState::new();
        let hash = state.put(b"m").unwrap();
        let e1 = state.record(NewEvent::resolve("a", hash)).unwrap();
        let e2 = state.record(NewEvent::alias_set("a", hash)).unwrap();
        assert!(e1.id < e2.id);
    }

    #[test]
    fn recent_is_descending_and_clamped() {
        let state = MemoryState::new();
        let hash = state.put(b"m").unwrap();
        for _ in 0..600 {
            state.record(NewEvent::resolve("a", hash)).unwrap();
        }
        let all = state.recent(Some(10_000)).unwrap();
        assert_eq!(all.len(), 500);
        assert!(all[0].id > all[1].id);
        assert_eq!(all[0].id, 600);

        let default = state.recent(None).unwrap();
        assert_eq!(default.len(), 50);
    }

    #[test]
    fn event_count_by_kind() {
        let state = MemoryState::new();
        let hash = state.put(b"m").unwrap();
        state.record(NewEvent::resolve("a", hash)).unwrap();
        state.record(NewEvent::resolve("a", hash)).unwrap();
        state.record(NewEvent::alias_set("a", hash)).unwrap();
        assert_eq!(state.event_count().unwrap(), 3);
        assert_eq!(state.event_count_by_kind(EventKind::Resolve).unwrap(), 2);
        assert_eq!(state.event_count_by_kind(EventKind::Alias).unwrap(), 1);
        assert_eq!(state.event_count_by_kind(EventKind::Compile).unwrap(), 0);
    }

    // -----------------------------------------------------------------------
    // Ref resolution
    // -----------------------------------------------------------------------

    #[test]
    fn resolve_ref_by_hash() {
        let state = MemoryState::new();
        let hash = state.put(b"module bytes").unwrap();
        let resolved = state.resolve_ref(&hash.to_hex()).unwrap().unwrap();
        assert_eq!(resolved.hash, hash);
        assert!(resolved.alias.is_none());
    }

    #[test]
    fn resolve_ref_by_alias() {
        let state = MemoryState::new();
        let hash = state.put(b"module bytes").unwrap();
        state.set_alias("echo", &hash).unwrap();
        let resolved = state.resolve_ref("echo").unwrap().unwrap();
        assert_eq!(resolved.hash, hash);
        assert_eq!(resolved.alias.as_deref(), Some("echo"));
    }

    #[test]
    fn resolve_ref_prefers_alias_over_hash() {
        let state = MemoryState::new();
        let a = state.put(b"blob a").unwrap();
        let b = state.put(b"blob b").unwrap();
        // Alias named exactly like blob a's hash, pointing at blob b.
        state.set_alias(&a.to_hex(), &b).unwrap();
        let resolved = state.resolve_ref(&a.to_hex()).unwrap().unwrap();
        assert_eq!(resolved.hash, b);
        assert_eq!(resolved.alias.as_deref(), Some(a.to_hex().as_str()));
    }

    #[test]
    fn resolve_ref_unknown_is_none() {
        let state = MemoryState::new();
        assert!(state.resolve_ref("missing").unwrap().is_none());
        let hash = BlobHash::of(b"never stored");
        assert!(state.resolve_ref(&hash.to_hex()).unwrap().is_none());
    }
}
