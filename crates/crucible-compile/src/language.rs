use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One supported language: the filenames the toolchain expects under the
/// scratch directory, the executable, and the argv template.
///
/// Templates substitute `{input}` and `{output}` with the configured
/// filenames. When `needs_cwd` is set the subprocess runs with the scratch
/// directory as its working directory and the filenames stay relative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub name: String,
    pub input_file: String,
    pub output_file: String,
    pub program: String,
    pub args: Vec<String>,
    pub needs_cwd: bool,
}

impl Language {
    /// The argv to pass, with template placeholders substituted.
    pub fn argv(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &self.input_file)
                    .replace("{output}", &self.output_file)
            })
            .collect()
    }
}

/// The table of supported languages, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct LanguageRegistry {
    languages: BTreeMap<String, Language>,
}

impl LanguageRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in table: AssemblyScript, TinyGo, and Zig.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Language {
            name: "assemblyscript".into(),
            input_file: "input.ts".into(),
            output_file: "output.wasm".into(),
            program: "asc".into(),
            args: vec![
                "{input}".into(),
                "-o".into(),
                "{output}".into(),
                "-O2".into(),
                "--runtime".into(),
                "minimal".into(),
            ],
            needs_cwd: true,
        });
        registry.register(Language {
            name: "tinygo".into(),
            input_file: "main.go".into(),
            output_file: "output.wasm".into(),
            program: "tinygo".into(),
            args: vec![
                "build".into(),
                "-o".into(),
                "{output}".into(),
                "-target=wasm-unknown".into(),
                "{input}".into(),
            ],
            needs_cwd: true,
        });
        // zig build-exe names the artifact after the input stem, hence the
        // input.wasm output file.
        registry.register(Language {
            name: "zig".into(),
            input_file: "input.zig".into(),
            output_file: "input.wasm".into(),
            program: "zig".into(),
            args: vec![
                "build-exe".into(),
                "{input}".into(),
                "-target".into(),
                "wasm32-freestanding".into(),
                "-fno-entry".into(),
                "--export=run".into(),
                "-O".into(),
                "ReleaseSmall".into(),
            ],
            needs_cwd: true,
        });
        registry
    }

    /// Build a registry from explicit rows.
    pub fn from_rows(rows: Vec<Language>) -> Self {
        let mut registry = Self::empty();
        for row in rows {
            registry.register(row);
        }
        registry
    }

    /// Insert or replace a language row.
    pub fn register(&mut self, language: Language) {
        self.languages.insert(language.name.clone(), language);
    }

    /// Look up a language by name.
    pub fn get(&self, name: &str) -> Option<&Language> {
        self.languages.get(name)
    }

    /// All rows, ordered by name.
    pub fn list(&self) -> Vec<&Language> {
        self.languages.values().collect()
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }
}
