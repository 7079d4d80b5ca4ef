use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crucible_contract::ValidationReport;
use crucible_state::{BlobStore, EventLog, StateStore};
use crucible_types::{BlobHash, NewEvent};

use crate::error::{CompileError, CompileResult};
use crate::language::{Language, LanguageRegistry};

/// How much of a failure message is kept on the event row.
const MAX_EVENT_ERROR_LEN: usize = 4096;

/// Pipeline tunables. The defaults match the service contract: a 30 second
/// wall-clock timeout and 4 MiB of captured output per stream.
#[derive(Clone, Debug)]
pub struct CompilerConfig {
    /// Where scratch directories are created. `None` uses the system temp
    /// root.
    pub scratch_root: Option<PathBuf>,
    /// Wall-clock limit on one toolchain invocation.
    pub timeout: Duration,
    /// Per-stream cap on captured stdout/stderr.
    pub max_capture: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            scratch_root: None,
            timeout: Duration::from_secs(30),
            max_capture: 4 * 1024 * 1024,
        }
    }
}

/// A successful compile: the module bytes plus everything the caller
/// surfaces as response metadata.
#[derive(Clone, Debug)]
pub struct CompileOutcome {
    pub bytes: Vec<u8>,
    pub input_hash: BlobHash,
    pub output_hash: BlobHash,
    pub validation: ValidationReport,
    pub duration_ms: u64,
}

/// The compilation pipeline.
pub struct Compiler {
    registry: LanguageRegistry,
    config: CompilerConfig,
}

enum Capture {
    Completed {
        status: std::process::ExitStatus,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    Oversized,
}

impl Compiler {
    pub fn new(registry: LanguageRegistry, config: CompilerConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Compile `source` with the named language's toolchain.
    ///
    /// The source is stored as a blob before any work. One compile event is
    /// recorded per call, on both the success and the failure path. The
    /// scratch directory is removed on every exit path; a non-conformant
    /// module is still returned, with its non-conformance in `validation`.
    pub async fn compile(
        &self,
        store: &dyn StateStore,
        language: &str,
        source: &[u8],
    ) -> CompileResult<CompileOutcome> {
        let lang = self
            .registry
            .get(language)
            .ok_or_else(|| CompileError::UnknownLanguage(language.to_string()))?
            .clone();
        if source.is_empty() {
            return Err(CompileError::EmptySource);
        }
        std::str::from_utf8(source).map_err(|_| CompileError::NotText)?;

        let input_hash = store.put(source)?;
        debug!(
            language = %lang.name,
            input = %input_hash.short_hex(),
            bytes = source.len(),
            "compile started"
        );

        let started = Instant::now();
        let scratch = self.make_scratch()?;
        tokio::fs::write(scratch.path().join(&lang.input_file), source).await?;

        let invocation = self.invoke(&lang, &scratch).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (status, stdout, stderr) = match invocation {
            Ok(Capture::Completed {
                status,
                stdout,
                stderr,
            }) => (status, stdout, stderr),
            Ok(Capture::Oversized) => {
                let message = format!(
                    "compiler output exceeded {} bytes",
                    self.config.max_capture
                );
                return Err(self.fail(store, &lang, input_hash, duration_ms, message));
            }
            Err(CompileError::Toolchain { message }) => {
                return Err(self.fail(store, &lang, input_hash, duration_ms, message));
            }
            Err(other) => return Err(other),
        };

        if !status.success() {
            let stderr_text = String::from_utf8_lossy(&stderr).trim().to_string();
            let stdout_text = String::from_utf8_lossy(&stdout).trim().to_string();
            let message = if !stderr_text.is_empty() {
                stderr_text
            } else if !stdout_text.is_empty() {
                stdout_text
            } else {
                format!("compiler exited with {status}")
            };
            return Err(self.fail(store, &lang, input_hash, duration_ms, message));
        }

        let artifact = scratch.path().join(&lang.output_file);
        let bytes = match tokio::fs::read(&artifact).await {
            Ok(bytes) => bytes,
            Err(_) => {
                let message = format!(
                    "compiler reported success but produced no {}",
                    lang.output_file
                );
                return Err(self.fail(store, &lang, input_hash, duration_ms, message));
            }
        };

        let output_hash = store.put(&bytes)?;
        let validation = crucible_contract::validate(&bytes);
        store.record(NewEvent::compile_success(
            &lang.name,
            input_hash,
            output_hash,
            bytes.len() as u64,
            duration_ms,
        ))?;
        info!(
            language = %lang.name,
            output = %output_hash.short_hex(),
            size = bytes.len(),
            valid = validation.valid,
            duration_ms,
            "compile succeeded"
        );

        Ok(CompileOutcome {
            bytes,
            input_hash,
            output_hash,
            validation,
            duration_ms,
        })
    }

    /// Scratch directories get unguessable names so concurrent compiles
    /// cannot collide, and are removed when the handle drops, on every
    /// exit path. Cleanup errors are swallowed by the drop.
    fn make_scratch(&self) -> CompileResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("crucible-");
        let dir = match &self.config.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    async fn invoke(&self, lang: &Language, scratch: &TempDir) -> CompileResult<Capture> {
        let mut cmd = Command::new(&lang.program);
        cmd.args(lang.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if lang.needs_cwd {
            cmd.current_dir(scratch.path());
        }

        let mut child = cmd.spawn().map_err(|e| CompileError::Toolchain {
            message: format!("failed to start {}: {e}", lang.program),
        })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let cap = self.config.max_capture;

        let work = async {
            // Both streams are drained concurrently so a chatty compiler
            // cannot deadlock on a full pipe.
            let (out, err) = tokio::join!(read_capped(stdout, cap), read_capped(stderr, cap));
            let (stdout, stdout_over) = out?;
            let (stderr, stderr_over) = err?;
            if stdout_over || stderr_over {
                return Ok(Capture::Oversized);
            }
            let status = child.wait().await?;
            Ok::<Capture, std::io::Error>(Capture::Completed {
                status,
                stdout,
                stderr,
            })
        };

        match tokio::time::timeout(self.config.timeout, work).await {
            Ok(Ok(Capture::Oversized)) => {
                let _ = child.kill().await;
                Ok(Capture::Oversized)
            }
            Ok(Ok(capture)) => Ok(capture),
            Ok(Err(e)) => Err(CompileError::Io(e)),
            Err(_elapsed) => {
                let _ = child.kill().await;
                Err(CompileError::Toolchain {
                    message: format!(
                        "compiler timed out after {}s",
                        self.config.timeout.as_secs()
                    ),
                })
            }
        }
    }

    /// Record the failure event and build the error handed to the caller.
    /// The event write is attempted even though the operation failed; if
    /// the write itself fails, the compile error still wins.
    fn fail(
        &self,
        store: &dyn StateStore,
        lang: &Language,
        input_hash: BlobHash,
        duration_ms: u64,
        message: String,
    ) -> CompileError {
        warn!(language = %lang.name, duration_ms, "compile failed");
        let event =
            NewEvent::compile_failure(&lang.name, input_hash, duration_ms, clip(&message));
        if let Err(e) = store.record(event) {
            warn!("failed to record compile failure event: {e}");
        }
        CompileError::Toolchain { message }
    }
}

/// Capture a stream up to `cap` bytes. The stream is drained to EOF even
/// past the cap so the subprocess never blocks on a full pipe; bytes past
/// the cap are discarded and reported as truncation.
async fn read_capped<R>(reader: Option<R>, cap: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok((buf, truncated));
        }
        let keep = n.min(cap.saturating_sub(buf.len()));
        buf.extend_from_slice(&chunk[..keep]);
        if keep < n {
            truncated = true;
        }
    }
}

/// The first portion of a failure message, kept within the event row limit
/// without splitting a UTF-8 character.
fn clip(message: &str) -> String {
    if message.len() <= MAX_EVENT_ERROR_LEN {
        return message.to_string();
    }
    let mut end = MAX_EVENT_ERROR_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_state::MemoryState;
    use crucible_types::EventKind;

    fn shell_language(name: &str, program: &str, args: &[&str]) -> Language {
        Language {
            name: name.into(),
            input_file: "input.txt".into(),
            output_file: "output.bin".into(),
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            needs_cwd: true,
        }
    }

    fn compiler_with(rows: Vec<Language>) -> Compiler {
        Compiler::new(LanguageRegistry::from_rows(rows), CompilerConfig::default())
    }

    // -----------------------------------------------------------------------
    // Rejections before any work
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn unknown_language_rejected_before_any_work() {
        let store = MemoryState::new();
        let compiler = Compiler::new(LanguageRegistry::builtin(), CompilerConfig::default());
        let err = compiler.compile(&store, "cobol", b"src").await.unwrap_err();
        assert!(matches!(err, CompileError::UnknownLanguage(_)));
        assert_eq!(store.blob_count().unwrap(), 0);
        assert_eq!(store.event_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_source_rejected() {
        let store = MemoryState::new();
        let compiler = Compiler::new(LanguageRegistry::builtin(), CompilerConfig::default());
        let err = compiler
            .compile(&store, "assemblyscript", b"")
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::EmptySource));
        assert_eq!(store.blob_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn binary_source_rejected() {
        let store = MemoryState::new();
        let compiler = Compiler::new(LanguageRegistry::builtin(), CompilerConfig::default());
        let err = compiler
            .compile(&store, "zig", &[0xFF, 0xFE, 0x00])
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::NotText));
        assert_eq!(store.blob_count().unwrap(), 0);
    }

    // -----------------------------------------------------------------------
    // Happy path (with a stand-in toolchain)
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn pipeline_runs_toolchain_and_stores_artifact() {
        let store = MemoryState::new();
        let compiler = compiler_with(vec![shell_language(
            "copy",
            "cp",
            &["{input}", "{output}"],
        )]);

        let source = b"pretend this is source text";
        let outcome = compiler.compile(&store, "copy", source).await.unwrap();

        assert_eq!(outcome.bytes, source);
        assert_eq!(outcome.input_hash, BlobHash::of(source));
        assert_eq!(outcome.output_hash, BlobHash::of(source));
        // Not a wasm module, so validation reports that without failing
        // the compile.
        assert!(!outcome.validation.valid);

        assert_eq!(store.get(&outcome.output_hash).unwrap().unwrap(), source);
        let events = store.recent(None).unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.kind, EventKind::Compile);
        assert!(event.success);
        assert_eq!(event.language.as_deref(), Some("copy"));
        assert_eq!(event.input_hash, Some(outcome.input_hash));
        assert_eq!(event.output_hash, Some(outcome.output_hash));
        assert_eq!(event.output_size, Some(source.len() as u64));
        assert!(event.duration_ms.is_some());
    }

    // -----------------------------------------------------------------------
    // Failure taxonomy
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn nonzero_exit_surfaces_stderr_and_records_event() {
        let store = MemoryState::new();
        let compiler = compiler_with(vec![shell_language(
            "sh",
            "sh",
            &["-c", "echo 'syntax error near line 3' >&2; exit 1"],
        )]);

        let err = compiler.compile(&store, "sh", b"src").await.unwrap_err();
        match err {
            CompileError::Toolchain { message } => {
                assert!(message.contains("syntax error near line 3"))
            }
            other => panic!("expected Toolchain, got {other:?}"),
        }

        let events = store.recent(None).unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert!(!event.success);
        assert_eq!(event.input_hash, Some(BlobHash::of(b"src")));
        assert!(event.output_hash.is_none());
        assert!(event.error.as_deref().unwrap().contains("syntax error"));
    }

    #[tokio::test]
    async fn silent_nonzero_exit_falls_back_to_status() {
        let store = MemoryState::new();
        let compiler = compiler_with(vec![shell_language("false", "false", &[])]);
        let err = compiler.compile(&store, "false", b"src").await.unwrap_err();
        match err {
            CompileError::Toolchain { message } => {
                assert!(message.contains("compiler exited with"))
            }
            other => panic!("expected Toolchain, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_output_file_is_a_compiler_failure() {
        let store = MemoryState::new();
        let compiler = compiler_with(vec![shell_language("noop", "true", &[])]);
        let err = compiler.compile(&store, "noop", b"src").await.unwrap_err();
        match err {
            CompileError::Toolchain { message } => {
                assert!(message.contains("produced no output.bin"))
            }
            other => panic!("expected Toolchain, got {other:?}"),
        }
        assert!(!store.recent(None).unwrap()[0].success);
    }

    #[tokio::test]
    async fn missing_toolchain_binary_is_a_compiler_failure() {
        let store = MemoryState::new();
        let compiler = compiler_with(vec![shell_language(
            "ghost",
            "crucible-test-missing-toolchain",
            &[],
        )]);
        let err = compiler.compile(&store, "ghost", b"src").await.unwrap_err();
        match err {
            CompileError::Toolchain { message } => {
                assert!(message.contains("failed to start"))
            }
            other => panic!("expected Toolchain, got {other:?}"),
        }
        assert_eq!(store.event_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn timeout_kills_the_subprocess() {
        let store = MemoryState::new();
        let compiler = Compiler::new(
            LanguageRegistry::from_rows(vec![shell_language("slow", "sleep", &["5"])]),
            CompilerConfig {
                timeout: Duration::from_millis(200),
                ..CompilerConfig::default()
            },
        );
        let started = Instant::now();
        let err = compiler.compile(&store, "slow", b"src").await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(4));
        match err {
            CompileError::Toolchain { message } => assert!(message.contains("timed out")),
            other => panic!("expected Toolchain, got {other:?}"),
        }
        let event = &store.recent(None).unwrap()[0];
        assert!(!event.success);
        assert!(event.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn oversized_output_is_a_compiler_failure() {
        let store = MemoryState::new();
        let compiler = Compiler::new(
            LanguageRegistry::from_rows(vec![shell_language(
                "noisy",
                "sh",
                &["-c", "head -c 100000 /dev/zero"],
            )]),
            CompilerConfig {
                max_capture: 1024,
                ..CompilerConfig::default()
            },
        );
        let err = compiler.compile(&store, "noisy", b"src").await.unwrap_err();
        match err {
            CompileError::Toolchain { message } => {
                assert!(message.contains("exceeded 1024 bytes"))
            }
            other => panic!("expected Toolchain, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    #[test]
    fn clip_respects_char_boundaries() {
        let message = "é".repeat(MAX_EVENT_ERROR_LEN);
        let clipped = clip(&message);
        assert!(clipped.len() <= MAX_EVENT_ERROR_LEN);
        assert!(clipped.chars().all(|c| c == 'é'));
    }
}
