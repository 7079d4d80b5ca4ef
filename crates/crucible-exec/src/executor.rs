use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;
use wasmtime::{Engine, Linker, Memory, Module, Store};

use crucible_types::BlobHash;

use crate::error::{ExecError, ExecResult};

/// Offset where the input bytes are written.
pub const INPUT_PTR: usize = 0;
/// Offset where the guest writes its output.
pub const OUTPUT_PTR: usize = 65536;
/// Upper bound on the output length `run` may return.
pub const MAX_OUTPUT: usize = 65536;
/// Size of one wasm linear-memory page.
pub const WASM_PAGE_SIZE: usize = 65536;

/// Pages the protocol needs: enough to cover the whole output window.
const REQUIRED_PAGES: u64 =
    ((OUTPUT_PTR + MAX_OUTPUT + WASM_PAGE_SIZE - 1) / WASM_PAGE_SIZE) as u64;

/// The wasm execution harness.
///
/// Owns one engine and a compilation cache keyed by module content hash.
/// Instances never outlive a call: each execution builds a fresh store and
/// instance, so no state carries over between invocations.
pub struct Executor {
    engine: Engine,
    cache: RwLock<HashMap<BlobHash, Module>>,
}

impl Executor {
    pub fn new() -> Self {
        Self {
            engine: Engine::default(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Number of cached compiled modules.
    pub fn cached_modules(&self) -> usize {
        self.cache.read().expect("lock poisoned").len()
    }

    /// Execute `bytes` without touching the cache.
    pub fn execute(&self, bytes: &[u8], input: &[u8]) -> ExecResult<Vec<u8>> {
        let module =
            Module::new(&self.engine, bytes).map_err(|e| ExecError::BadModule(e.to_string()))?;
        self.invoke(&module, input)
    }

    /// Execute a stored module, compiling and caching it under `hash` on
    /// first use. Cache entries are immutable because the hash is the
    /// content.
    pub fn execute_cached(
        &self,
        hash: &BlobHash,
        bytes: &[u8],
        input: &[u8],
    ) -> ExecResult<Vec<u8>> {
        let cached = {
            let cache = self.cache.read().expect("lock poisoned");
            cache.get(hash).cloned()
        };
        let module = match cached {
            Some(module) => module,
            None => {
                let module = Module::new(&self.engine, bytes)
                    .map_err(|e| ExecError::BadModule(e.to_string()))?;
                debug!(module = %hash.short_hex(), "compiled and cached module");
                self.cache
                    .write()
                    .expect("lock poisoned")
                    .entry(*hash)
                    .or_insert_with(|| module.clone());
                module
            }
        };
        self.invoke(&module, input)
    }

    fn invoke(&self, module: &Module, input: &[u8]) -> ExecResult<Vec<u8>> {
        let mut store: Store<()> = Store::new(&self.engine, ());
        // Nothing is linked: the contract has zero import requirements.
        let linker: Linker<()> = Linker::new(&self.engine);
        let instance = linker
            .instantiate(&mut store, module)
            .map_err(|e| ExecError::Instantiation(e.to_string()))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or(ExecError::MissingMemory)?;
        grow_to_protocol_minimum(&mut store, &memory)?;

        memory
            .write(&mut store, INPUT_PTR, input)
            .map_err(|e| ExecError::MemoryAccess(e.to_string()))?;

        if let Some(init) = instance.get_func(&mut store, "_initialize") {
            let init = init
                .typed::<(), ()>(&store)
                .map_err(|e| ExecError::WrongExportType {
                    name: "_initialize",
                    message: e.to_string(),
                })?;
            init.call(&mut store, ())
                .map_err(|e| ExecError::Trap(e.to_string()))?;
        }

        let run = instance
            .get_func(&mut store, "run")
            .ok_or(ExecError::MissingRun)?
            .typed::<(i32, i32, i32), i32>(&store)
            .map_err(|e| ExecError::WrongExportType {
                name: "run",
                message: e.to_string(),
            })?;

        let returned = run
            .call(
                &mut store,
                (INPUT_PTR as i32, input.len() as i32, OUTPUT_PTR as i32),
            )
            .map_err(|e| ExecError::Trap(e.to_string()))?;

        // The i32 return is the output length, read as unsigned.
        let len = returned as u32 as usize;
        if len > MAX_OUTPUT {
            return Err(ExecError::OutputTooLarge {
                len: len as u64,
                max: MAX_OUTPUT as u64,
            });
        }

        let mut output = vec![0u8; len];
        memory
            .read(&store, OUTPUT_PTR, &mut output)
            .map_err(|e| ExecError::MemoryAccess(e.to_string()))?;
        Ok(output)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("cached_modules", &self.cached_modules())
            .finish()
    }
}

/// Grow memory, at most once, so the output window fits. Modules already
/// at or above the minimum are left alone.
fn grow_to_protocol_minimum(store: &mut Store<()>, memory: &Memory) -> ExecResult<()> {
    let current = memory.size(&mut *store);
    if current < REQUIRED_PAGES {
        memory
            .grow(&mut *store, REQUIRED_PAGES - current)
            .map_err(|e| ExecError::MemoryGrow {
                required: REQUIRED_PAGES,
                message: e.to_string(),
            })?;
    }
    Ok(())
}
