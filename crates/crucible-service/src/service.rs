use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crucible_compile::{CompileOutcome, Compiler, Language};
use crucible_contract::ValidationReport;
use crucible_exec::Executor;
use crucible_state::{AliasRegistry, BlobStore, EventLog, MemoryState, SqliteState, StateStore};
use crucible_types::{AliasRecord, BlobHash, EventRecord, NewEvent, ResolvedRef};

use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};

/// Result of executing a stored module against an input.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub module_hash: BlobHash,
    pub input_hash: BlobHash,
    pub output_hash: BlobHash,
    pub output: Vec<u8>,
    pub duration_ms: u64,
}

/// A blob fetched by ref, with the alias name when the ref was one.
#[derive(Clone, Debug)]
pub struct FetchedBlob {
    pub data: Vec<u8>,
    pub hash: BlobHash,
    pub alias: Option<String>,
}

/// Store-level counters for the stats surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceStats {
    pub blobs: u64,
    pub blob_bytes: u64,
    pub aliases: u64,
    pub events: u64,
    pub events_by_kind: BTreeMap<String, u64>,
}

/// The assembled service: durable state, compile pipeline, validator, and
/// execution harness behind one API.
pub struct Service {
    state: Arc<dyn StateStore>,
    compiler: Compiler,
    executor: Arc<Executor>,
}

impl Service {
    /// Build a service from configuration, opening the SQLite store when a
    /// database path is set and an in-memory store otherwise.
    pub fn new(config: ServiceConfig) -> ServiceResult<Self> {
        let state: Arc<dyn StateStore> = match &config.db_path {
            Some(path) => Arc::new(SqliteState::open(path)?),
            None => Arc::new(MemoryState::new()),
        };
        Ok(Self::with_state(state, config))
    }

    /// Build a service over an existing state store.
    pub fn with_state(state: Arc<dyn StateStore>, config: ServiceConfig) -> Self {
        let compiler = Compiler::new(config.registry(), config.compiler_config());
        Self {
            state,
            compiler,
            executor: Arc::new(Executor::new()),
        }
    }

    /// The underlying state store.
    pub fn state(&self) -> &Arc<dyn StateStore> {
        &self.state
    }

    // ---- Compile and validate ----

    /// Compile `source` with the named language's toolchain. The pipeline
    /// stores the source and artifact blobs and records the compile event.
    pub async fn compile(&self, language: &str, source: &[u8]) -> ServiceResult<CompileOutcome> {
        Ok(self
            .compiler
            .compile(self.state.as_ref(), language, source)
            .await?)
    }

    /// Check module bytes against the execution contract. A pure query; no
    /// event is recorded and nothing is stored.
    pub fn validate(&self, bytes: &[u8]) -> ValidationReport {
        crucible_contract::validate(bytes)
    }

    // ---- Run ----

    /// Execute the module a ref denotes against `input`.
    ///
    /// The input is stored as a blob and the output is stored as a blob;
    /// one execute event is recorded either way, preceded by a resolve
    /// event when the ref was an alias.
    pub async fn run(&self, module_ref: &str, input: &[u8]) -> ServiceResult<RunOutcome> {
        let resolved = self.resolve(module_ref)?;
        let module_hash = resolved.hash;
        let module_bytes = self
            .state
            .get(&module_hash)?
            .ok_or_else(|| ServiceError::UnknownRef(module_ref.to_string()))?;
        let input_hash = self.state.put(input)?;

        let started = Instant::now();
        let executor = Arc::clone(&self.executor);
        let input_owned = input.to_vec();
        let result = tokio::task::spawn_blocking(move || {
            executor.execute_cached(&module_hash, &module_bytes, &input_owned)
        })
        .await
        .map_err(|e| ServiceError::Internal(format!("execution task failed: {e}")))?;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                let output_hash = self.state.put(&output)?;
                self.state.record(NewEvent::execute_success(
                    module_hash,
                    input_hash,
                    output_hash,
                    output.len() as u64,
                    duration_ms,
                ))?;
                info!(
                    module = %module_hash.short_hex(),
                    output = %output_hash.short_hex(),
                    size = output.len(),
                    duration_ms,
                    "run succeeded"
                );
                Ok(RunOutcome {
                    module_hash,
                    input_hash,
                    output_hash,
                    output,
                    duration_ms,
                })
            }
            Err(exec) => {
                let event = NewEvent::execute_failure(
                    module_hash,
                    input_hash,
                    duration_ms,
                    exec.to_string(),
                );
                if let Err(e) = self.state.record(event) {
                    warn!("failed to record execute failure event: {e}");
                }
                Err(ServiceError::Exec(exec))
            }
        }
    }

    // ---- Refs and blobs ----

    /// Resolve a ref, committing a resolve event when it went through an
    /// alias. Alias resolution wins over literal hashes.
    pub fn resolve(&self, reference: &str) -> ServiceResult<ResolvedRef> {
        let resolved = self
            .state
            .resolve_ref(reference)?
            .ok_or_else(|| ServiceError::UnknownRef(reference.to_string()))?;
        if let Some(name) = &resolved.alias {
            self.state.record(NewEvent::resolve(name, resolved.hash))?;
        }
        Ok(resolved)
    }

    /// Fetch a blob by ref.
    pub fn fetch_blob(&self, reference: &str) -> ServiceResult<FetchedBlob> {
        let resolved = self.resolve(reference)?;
        let data = self
            .state
            .get(&resolved.hash)?
            .ok_or_else(|| ServiceError::UnknownRef(reference.to_string()))?;
        Ok(FetchedBlob {
            data,
            hash: resolved.hash,
            alias: resolved.alias,
        })
    }

    // ---- Aliases ----

    /// Create or repoint an alias. The target must already be stored.
    pub fn set_alias(&self, name: &str, hash_hex: &str) -> ServiceResult<AliasRecord> {
        let hash = BlobHash::from_hex(hash_hex)
            .map_err(|e| ServiceError::InvalidHash(format!("{hash_hex}: {e}")))?;
        let record = self.state.set_alias(name, &hash)?;
        self.state.record(NewEvent::alias_set(name, hash))?;
        Ok(record)
    }

    pub fn alias(&self, name: &str) -> ServiceResult<Option<AliasRecord>> {
        Ok(self.state.alias(name)?)
    }

    /// Delete an alias. Returns whether a record was removed; only actual
    /// removals record an alias event.
    pub fn delete_alias(&self, name: &str) -> ServiceResult<bool> {
        let removed = self.state.delete_alias(name)?;
        if removed {
            self.state.record(NewEvent::alias_removed(name))?;
        }
        Ok(removed)
    }

    pub fn list_aliases(&self) -> ServiceResult<Vec<AliasRecord>> {
        Ok(self.state.list_aliases()?)
    }

    // ---- Introspection ----

    pub fn events(&self, limit: Option<usize>) -> ServiceResult<Vec<EventRecord>> {
        Ok(self.state.recent(limit)?)
    }

    pub fn stats(&self) -> ServiceResult<ServiceStats> {
        let mut events_by_kind = BTreeMap::new();
        for kind in crucible_types::EventKind::all() {
            events_by_kind.insert(
                kind.as_str().to_string(),
                self.state.event_count_by_kind(kind)?,
            );
        }
        Ok(ServiceStats {
            blobs: self.state.blob_count()?,
            blob_bytes: self.state.total_bytes()?,
            aliases: self.state.alias_count()?,
            events: self.state.event_count()?,
            events_by_kind,
        })
    }

    /// The language table, in name order.
    pub fn languages(&self) -> Vec<Language> {
        self.compiler.registry().list().into_iter().cloned().collect()
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("languages", &self.compiler.registry().len())
            .finish_non_exhaustive()
    }
}
