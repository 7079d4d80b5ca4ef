use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crucible_compile::{CompilerConfig, Language, LanguageRegistry};

/// Service construction parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// SQLite database path. `None` keeps all state in memory.
    pub db_path: Option<PathBuf>,
    /// Root for compile scratch directories. `None` uses the system temp
    /// root.
    pub scratch_root: Option<PathBuf>,
    /// Wall-clock limit on one toolchain invocation, in seconds.
    pub compile_timeout_secs: u64,
    /// Per-stream cap on captured compiler output, in bytes.
    pub max_capture_bytes: usize,
    /// Language table override. `None` uses the built-in table.
    pub languages: Option<Vec<Language>>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            scratch_root: None,
            compile_timeout_secs: 30,
            max_capture_bytes: 4 * 1024 * 1024,
            languages: None,
        }
    }
}

impl ServiceConfig {
    pub(crate) fn registry(&self) -> LanguageRegistry {
        match &self.languages {
            Some(rows) => LanguageRegistry::from_rows(rows.clone()),
            None => LanguageRegistry::builtin(),
        }
    }

    pub(crate) fn compiler_config(&self) -> CompilerConfig {
        CompilerConfig {
            scratch_root: self.scratch_root.clone(),
            timeout: Duration::from_secs(self.compile_timeout_secs),
            max_capture: self.max_capture_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_contract() {
        let config = ServiceConfig::default();
        assert_eq!(config.compile_timeout_secs, 30);
        assert_eq!(config.max_capture_bytes, 4 * 1024 * 1024);
        assert!(config.db_path.is_none());
        assert_eq!(config.registry().len(), 3);
    }

    #[test]
    fn language_override_replaces_builtin() {
        let config = ServiceConfig {
            languages: Some(vec![]),
            ..ServiceConfig::default()
        };
        assert!(config.registry().is_empty());
    }
}
