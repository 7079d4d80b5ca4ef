use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::BlobHash;
use crate::timestamp;

/// Metadata row for a stored blob. The bytes themselves are fetched
/// separately so metadata queries never clone megabytes of module data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    pub hash: BlobHash,
    pub size: u64,
    #[serde(with = "timestamp::serde_millis")]
    pub created_at: DateTime<Utc>,
}

/// A mutable human-readable name pointing at an immutable blob.
///
/// `created_at` is fixed at first write; `updated_at` is refreshed every
/// time the alias is repointed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    pub name: String,
    pub hash: BlobHash,
    #[serde(with = "timestamp::serde_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp::serde_millis")]
    pub updated_at: DateTime<Utc>,
}

/// Classification of event log records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Compile,
    Execute,
    Resolve,
    Alias,
}

impl EventKind {
    /// The textual form stored in the `events.type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::Execute => "execute",
            Self::Resolve => "resolve",
            Self::Alias => "alias",
        }
    }

    /// All kinds, in a stable order (used by stats).
    pub fn all() -> [EventKind; 4] {
        [Self::Compile, Self::Execute, Self::Resolve, Self::Alias]
    }
}

impl std::str::FromStr for EventKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compile" => Ok(Self::Compile),
            "execute" => Ok(Self::Execute),
            "resolve" => Ok(Self::Resolve),
            "alias" => Ok(Self::Alias),
            other => Err(TypeError::UnknownEventKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed event log row.
///
/// The shape is deliberately flat and open: every kind uses a subset of the
/// optional columns, and new kinds add rows, not columns. Execute events
/// carry `module_hash`; alias events reuse `output_hash` for the hash the
/// alias now points to (kept for log-format compatibility).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    #[serde(with = "timestamp::serde_millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_hash: Option<BlobHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<BlobHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_hash: Option<BlobHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An event about to be committed. The log assigns `id` and `timestamp`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct NewEvent {
    pub kind: Option<EventKind>,
    pub language: Option<String>,
    pub input_hash: Option<BlobHash>,
    pub output_hash: Option<BlobHash>,
    pub module_hash: Option<BlobHash>,
    pub alias: Option<String>,
    pub output_size: Option<u64>,
    pub duration_ms: Option<u64>,
    pub success: bool,
    pub error: Option<String>,
}

impl NewEvent {
    fn base(kind: EventKind, success: bool) -> Self {
        Self {
            kind: Some(kind),
            success,
            ..Self::default()
        }
    }

    /// The kind this event will be stored under; absent kinds default to
    /// `compile`, matching the column default in the schema.
    pub fn kind_or_default(&self) -> EventKind {
        self.kind.unwrap_or(EventKind::Compile)
    }

    pub fn compile_success(
        language: &str,
        input_hash: BlobHash,
        output_hash: BlobHash,
        output_size: u64,
        duration_ms: u64,
    ) -> Self {
        Self {
            language: Some(language.to_string()),
            input_hash: Some(input_hash),
            output_hash: Some(output_hash),
            output_size: Some(output_size),
            duration_ms: Some(duration_ms),
            ..Self::base(EventKind::Compile, true)
        }
    }

    pub fn compile_failure(
        language: &str,
        input_hash: BlobHash,
        duration_ms: u64,
        error: String,
    ) -> Self {
        Self {
            language: Some(language.to_string()),
            input_hash: Some(input_hash),
            duration_ms: Some(duration_ms),
            error: Some(error),
            ..Self::base(EventKind::Compile, false)
        }
    }

    pub fn execute_success(
        module_hash: BlobHash,
        input_hash: BlobHash,
        output_hash: BlobHash,
        output_size: u64,
        duration_ms: u64,
    ) -> Self {
        Self {
            module_hash: Some(module_hash),
            input_hash: Some(input_hash),
            output_hash: Some(output_hash),
            output_size: Some(output_size),
            duration_ms: Some(duration_ms),
            ..Self::base(EventKind::Execute, true)
        }
    }

    pub fn execute_failure(
        module_hash: BlobHash,
        input_hash: BlobHash,
        duration_ms: u64,
        error: String,
    ) -> Self {
        Self {
            module_hash: Some(module_hash),
            input_hash: Some(input_hash),
            duration_ms: Some(duration_ms),
            error: Some(error),
            ..Self::base(EventKind::Execute, false)
        }
    }

    /// An alias dereference. `output_hash` is the hash the alias resolved to.
    pub fn resolve(alias: &str, hash: BlobHash) -> Self {
        Self {
            alias: Some(alias.to_string()),
            output_hash: Some(hash),
            ..Self::base(EventKind::Resolve, true)
        }
    }

    /// An alias created or repointed. `output_hash` is the new target.
    pub fn alias_set(name: &str, hash: BlobHash) -> Self {
        Self {
            alias: Some(name.to_string()),
            output_hash: Some(hash),
            ..Self::base(EventKind::Alias, true)
        }
    }

    /// An alias removed.
    pub fn alias_removed(name: &str) -> Self {
        Self {
            alias: Some(name.to_string()),
            ..Self::base(EventKind::Alias, true)
        }
    }
}

/// Result of resolving a ref string: the hash it denotes, plus the alias
/// name when the ref went through the registry rather than being a literal
/// hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRef {
    pub hash: BlobHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_roundtrip() {
        for kind in EventKind::all() {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn event_kind_rejects_unknown() {
        assert!(matches!(
            "deploy".parse::<EventKind>(),
            Err(TypeError::UnknownEventKind(_))
        ));
    }

    #[test]
    fn compile_success_shape() {
        let input = BlobHash::of(b"src");
        let output = BlobHash::of(b"wasm");
        let e = NewEvent::compile_success("tinygo", input, output, 4, 120);
        assert_eq!(e.kind, Some(EventKind::Compile));
        assert!(e.success);
        assert_eq!(e.language.as_deref(), Some("tinygo"));
        assert_eq!(e.output_size, Some(4));
        assert!(e.error.is_none());
    }

    #[test]
    fn compile_failure_has_no_output() {
        let input = BlobHash::of(b"src");
        let e = NewEvent::compile_failure("zig", input, 55, "boom".into());
        assert!(!e.success);
        assert!(e.output_hash.is_none());
        assert_eq!(e.error.as_deref(), Some("boom"));
    }

    #[test]
    fn resolve_reuses_output_hash_for_target() {
        let h = BlobHash::of(b"module");
        let e = NewEvent::resolve("echo", h);
        assert_eq!(e.kind, Some(EventKind::Resolve));
        assert_eq!(e.output_hash, Some(h));
        assert_eq!(e.alias.as_deref(), Some("echo"));
        assert!(e.success);
    }

    #[test]
    fn event_record_serializes_kind_as_type() {
        let record = EventRecord {
            id: 7,
            timestamp: crate::timestamp::parse_millis("2024-03-15T12:34:56.789").unwrap(),
            kind: EventKind::Execute,
            language: None,
            input_hash: None,
            output_hash: None,
            module_hash: Some(BlobHash::of(b"m")),
            alias: None,
            output_size: Some(0),
            duration_ms: Some(3),
            success: true,
            error: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "execute");
        assert_eq!(json["timestamp"], "2024-03-15T12:34:56.789");
        assert!(json.get("language").is_none());
    }
}
