use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crucible_types::{
    timestamp, AliasRecord, BlobHash, BlobRecord, EventKind, EventRecord, NewEvent,
};

use crate::error::{StateError, StateResult};
use crate::traits::{clamp_limit, AliasRegistry, BlobStore, EventLog};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS blobs (
    hash TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    size INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT,
    type TEXT NOT NULL DEFAULT 'compile',
    language TEXT,
    input_hash TEXT REFERENCES blobs(hash),
    output_hash TEXT REFERENCES blobs(hash),
    module_hash TEXT REFERENCES blobs(hash),
    alias TEXT,
    output_size INTEGER,
    duration_ms INTEGER,
    success INTEGER NOT NULL,
    error TEXT
);

CREATE TABLE IF NOT EXISTS aliases (
    name TEXT PRIMARY KEY,
    hash TEXT NOT NULL REFERENCES blobs(hash),
    created_at TEXT,
    updated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_events_type ON events(type);
CREATE INDEX IF NOT EXISTS idx_events_language ON events(language);
CREATE INDEX IF NOT EXISTS idx_events_input_hash ON events(input_hash);
CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
CREATE INDEX IF NOT EXISTS idx_aliases_hash ON aliases(hash);
";

/// SQLite-backed state store.
///
/// One connection behind a mutex. Every exposed operation is a single
/// statement or transaction, so each is atomic with respect to its own
/// pre-check, and the mutex serializes writers.
pub struct SqliteState {
    conn: Mutex<Connection>,
}

impl SqliteState {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> StateResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open a private in-memory database (used by tests).
    pub fn open_in_memory() -> StateResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StateResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl std::fmt::Debug for SqliteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteState").finish_non_exhaustive()
    }
}

fn corrupt<E: std::fmt::Display>(e: E) -> StateError {
    StateError::CorruptRow(e.to_string())
}

fn parse_hash(s: &str) -> StateResult<BlobHash> {
    BlobHash::from_hex(s).map_err(corrupt)
}

fn parse_hash_opt(s: Option<String>) -> StateResult<Option<BlobHash>> {
    s.map(|s| parse_hash(&s)).transpose()
}

fn parse_ts(s: &str) -> StateResult<chrono::DateTime<chrono::Utc>> {
    timestamp::parse_millis(s).map_err(corrupt)
}

// Raw event row as it comes out of SQLite, before hashes and timestamps are
// decoded into their typed forms.
type RawEvent = (
    i64,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<u64>,
    Option<u64>,
    bool,
    Option<String>,
);

fn decode_event(raw: RawEvent) -> StateResult<EventRecord> {
    let (id, ts, kind, language, input, output, module, alias, output_size, duration_ms, success, error) =
        raw;
    Ok(EventRecord {
        id,
        timestamp: parse_ts(&ts.ok_or_else(|| corrupt("event without timestamp"))?)?,
        kind: kind.parse::<EventKind>().map_err(corrupt)?,
        language,
        input_hash: parse_hash_opt(input)?,
        output_hash: parse_hash_opt(output)?,
        module_hash: parse_hash_opt(module)?,
        alias,
        output_size,
        duration_ms,
        success,
        error,
    })
}

impl BlobStore for SqliteState {
    fn put(&self, data: &[u8]) -> StateResult<BlobHash> {
        let hash = BlobHash::of(data);
        let now = timestamp::format_millis(&timestamp::now());
        let conn = self.conn.lock().expect("lock poisoned");
        // INSERT OR IGNORE keeps the existing row (and its created_at) when
        // the same content is stored twice.
        conn.execute(
            "INSERT OR IGNORE INTO blobs (hash, data, size, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![hash.to_hex(), data, data.len() as u64, now],
        )?;
        Ok(hash)
    }

    fn get(&self, hash: &BlobHash) -> StateResult<Option<Vec<u8>>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let data = conn
            .query_row(
                "SELECT data FROM blobs WHERE hash = ?1",
                params![hash.to_hex()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(data)
    }

    fn meta(&self, hash: &BlobHash) -> StateResult<Option<BlobRecord>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let row = conn
            .query_row(
                "SELECT size, created_at FROM blobs WHERE hash = ?1",
                params![hash.to_hex()],
                |row| Ok((row.get::<_, u64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        row.map(|(size, created_at)| {
            Ok(BlobRecord {
                hash: *hash,
                size,
                created_at: parse_ts(&created_at)?,
            })
        })
        .transpose()
    }

    fn has(&self, hash: &BlobHash) -> StateResult<bool> {
        let conn = self.conn.lock().expect("lock poisoned");
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM blobs WHERE hash = ?1)",
            params![hash.to_hex()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn blob_count(&self) -> StateResult<u64> {
        let conn = self.conn.lock().expect("lock poisoned");
        Ok(conn.query_row("SELECT COUNT(*) FROM blobs", [], |row| row.get(0))?)
    }

    fn total_bytes(&self) -> StateResult<u64> {
        let conn = self.conn.lock().expect("lock poisoned");
        Ok(conn.query_row(
            "SELECT COALESCE(SUM(size), 0) FROM blobs",
            [],
            |row| row.get(0),
        )?)
    }
}

impl AliasRegistry for SqliteState {
    fn set_alias(&self, name: &str, hash: &BlobHash) -> StateResult<AliasRecord> {
        let mut conn = self.conn.lock().expect("lock poisoned");
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM blobs WHERE hash = ?1)",
            params![hash.to_hex()],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StateError::AliasTargetMissing {
                hash: hash.to_hex(),
            });
        }

        let existing: Option<String> = tx
            .query_row(
                "SELECT created_at FROM aliases WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        let now = timestamp::now();
        let now_text = timestamp::format_millis(&now);
        let created_at = match existing {
            Some(created_text) => {
                tx.execute(
                    "UPDATE aliases SET hash = ?2, updated_at = ?3 WHERE name = ?1",
                    params![name, hash.to_hex(), now_text],
                )?;
                parse_ts(&created_text)?
            }
            None => {
                tx.execute(
                    "INSERT INTO aliases (name, hash, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?3)",
                    params![name, hash.to_hex(), now_text],
                )?;
                now
            }
        };
        tx.commit()?;

        Ok(AliasRecord {
            name: name.to_string(),
            hash: *hash,
            created_at,
            updated_at: now,
        })
    }

    fn alias(&self, name: &str) -> StateResult<Option<AliasRecord>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let row = conn
            .query_row(
                "SELECT hash, created_at, updated_at FROM aliases WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(hash, created_at, updated_at)| {
            Ok(AliasRecord {
                name: name.to_string(),
                hash: parse_hash(&hash)?,
                created_at: parse_ts(&created_at)?,
                updated_at: parse_ts(&updated_at)?,
            })
        })
        .transpose()
    }

    fn delete_alias(&self, name: &str) -> StateResult<bool> {
        let conn = self.conn.lock().expect("lock poisoned");
        let removed = conn.execute("DELETE FROM aliases WHERE name = ?1", params![name])?;
        Ok(removed > 0)
    }

    fn list_aliases(&self) -> StateResult<Vec<AliasRecord>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT name, hash, created_at, updated_at FROM aliases ORDER BY name ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(name, hash, created_at, updated_at)| {
                Ok(AliasRecord {
                    name,
                    hash: parse_hash(&hash)?,
                    created_at: parse_ts(&created_at)?,
                    updated_at: parse_ts(&updated_at)?,
                })
            })
            .collect()
    }

    fn alias_count(&self) -> StateResult<u64> {
        let conn = self.conn.lock().expect("lock poisoned");
        Ok(conn.query_row("SELECT COUNT(*) FROM aliases", [], |row| row.get(0))?)
    }
}

impl EventLog for SqliteState {
    fn record(&self, event: NewEvent) -> StateResult<EventRecord> {
        let now = timestamp::now();
        let now_text = timestamp::format_millis(&now);
        let kind = event.kind_or_default();
        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute(
            "INSERT INTO events (timestamp, type, language, input_hash, output_hash, \
             module_hash, alias, output_size, duration_ms, success, error) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                now_text,
                kind.as_str(),
                event.language,
                event.input_hash.map(|h| h.to_hex()),
                event.output_hash.map(|h| h.to_hex()),
                event.module_hash.map(|h| h.to_hex()),
                event.alias,
                event.output_size,
                event.duration_ms,
                event.success,
                event.error,
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(EventRecord {
            id,
            timestamp: now,
            kind,
            language: event.language,
            input_hash: event.input_hash,
            output_hash: event.output_hash,
            module_hash: event.module_hash,
            alias: event.alias,
            output_size: event.output_size,
            duration_ms: event.duration_ms,
            success: event.success,
            error: event.error,
        })
    }

    fn recent(&self, limit: Option<usize>) -> StateResult<Vec<EventRecord>> {
        let limit = clamp_limit(limit);
        let conn = self.conn.lock().expect("lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, type, language, input_hash, output_hash, module_hash, \
             alias, output_size, duration_ms, success, error \
             FROM events ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                    row.get(10)?,
                    row.get(11)?,
                ))
            })?
            .collect::<Result<Vec<RawEvent>, _>>()?;
        rows.into_iter().map(decode_event).collect()
    }

    fn event_count(&self) -> StateResult<u64> {
        let conn = self.conn.lock().expect("lock poisoned");
        Ok(conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?)
    }

    fn event_count_by_kind(&self, kind: EventKind) -> StateResult<u64> {
        let conn = self.conn.lock().expect("lock poisoned");
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM events WHERE type = ?1",
            params![kind.as_str()],
            |row| row.get(0),
        )?)
    }
}
