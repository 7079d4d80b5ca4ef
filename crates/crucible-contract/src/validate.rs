use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::parser::{self, ParsedModule, KIND_FUNCTION, KIND_GLOBAL, KIND_MEMORY, KIND_TABLE};

/// The parameter list `run` must have.
const EXPECTED_PARAMS: [u8; 3] = [0x7F, 0x7F, 0x7F];
/// The result list `run` must have.
const EXPECTED_RESULTS: [u8; 1] = [0x7F];
/// Exports that are part of the contract and never warned about.
const CONTRACT_EXPORTS: [&str; 3] = ["memory", "run", "_initialize"];

/// One entry in the report's export table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportInfo {
    pub kind: String,
    pub index: u32,
}

/// Structural facts gathered while checking.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationInfo {
    pub exports: BTreeMap<String, ExportInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_signature: Option<String>,
}

/// Outcome of validating a module against the contract.
///
/// `valid` is true exactly when `errors` is empty; warnings never fail a
/// module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub info: ValidationInfo,
}

impl ValidationReport {
    fn finish(errors: Vec<String>, warnings: Vec<String>, info: ValidationInfo) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
            info,
        }
    }
}

fn kind_name(kind: u8) -> String {
    match kind {
        KIND_FUNCTION => "function".to_string(),
        KIND_TABLE => "table".to_string(),
        KIND_MEMORY => "memory".to_string(),
        KIND_GLOBAL => "global".to_string(),
        other => format!("0x{other:02x}"),
    }
}

fn value_type_name(vt: u8) -> String {
    match vt {
        0x7F => "i32".to_string(),
        0x7E => "i64".to_string(),
        0x7D => "f32".to_string(),
        0x7C => "f64".to_string(),
        other => format!("0x{other:02x}"),
    }
}

fn format_value_types(types: &[u8]) -> String {
    let names: Vec<String> = types.iter().copied().map(value_type_name).collect();
    format!("({})", names.join(", "))
}

fn format_signature(params: &[u8], results: &[u8]) -> String {
    format!(
        "{} -> {}",
        format_value_types(params),
        format_value_types(results)
    )
}

/// Validate raw module bytes against the execution contract.
///
/// The module must export a memory named `memory` and a function named
/// `run` of type `(i32, i32, i32) -> (i32)`. Exports other than those and
/// the optional `_initialize` produce warnings. Decode failures produce a
/// single `Invalid wasm binary:` error.
pub fn validate(bytes: &[u8]) -> ValidationReport {
    let module = match parser::parse(bytes) {
        Ok(module) => module,
        Err(e) => {
            return ValidationReport::finish(
                vec![format!("Invalid wasm binary: {e}")],
                Vec::new(),
                ValidationInfo::default(),
            )
        }
    };
    check(&module)
}

fn check(module: &ParsedModule) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut info = ValidationInfo::default();

    for export in &module.exports {
        info.exports.insert(
            export.name.clone(),
            ExportInfo {
                kind: kind_name(export.kind),
                index: export.index,
            },
        );
    }

    let memory = module
        .exports
        .iter()
        .find(|e| e.name == "memory" && e.kind == KIND_MEMORY);
    if memory.is_none() {
        errors.push("Missing export: memory (kind: memory)".to_string());
    }

    let run = module
        .exports
        .iter()
        .find(|e| e.name == "run" && e.kind == KIND_FUNCTION);
    match run {
        None => errors.push("Missing export: run (kind: function)".to_string()),
        Some(run) => {
            // Exported function indices count imports first; only locally
            // defined functions appear in the Function section.
            let local = run
                .index
                .checked_sub(module.func_imports)
                .map(|i| i as usize);
            match local.and_then(|i| module.functions.get(i)) {
                None => errors.push(format!(
                    "Cannot resolve signature for run: function index {} out of range",
                    run.index
                )),
                Some(&type_index) => match module.types.get(type_index as usize) {
                    None => errors.push(format!(
                        "Cannot resolve signature for run: type index {type_index} out of range"
                    )),
                    Some(ty) => {
                        let signature = format_signature(&ty.params, &ty.results);
                        if ty.params != EXPECTED_PARAMS || ty.results != EXPECTED_RESULTS {
                            errors.push(format!(
                                "Wrong signature for run: got {signature}, \
                                 expected (i32, i32, i32) -> (i32)"
                            ));
                        }
                        info.run_signature = Some(signature);
                    }
                },
            }
        }
    }

    for export in &module.exports {
        if !CONTRACT_EXPORTS.contains(&export.name.as_str()) {
            warnings.push(format!("Extra export: {}", export.name));
        }
    }

    ValidationReport::finish(errors, warnings, info)
}
