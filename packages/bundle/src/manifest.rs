//! # Manifest Dependency Merging
//!
//! After running a bundle the sandbox reports which modules it actually
//! loaded. Those are folded back into the manifest: the `dependencies`
//! section is rebuilt from the report and every other field is kept as-is,
//! in its original position.

use nextbin_common::ModuleRef;
use serde_json::{Map, Value};
use thiserror::Error;

pub const DEPENDENCIES_KEY: &str = "dependencies";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Manifest must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}

/// Replace the dependency section of `manifest` with `modules`.
///
/// Names are unique in the result; for a repeated name the last reported
/// version wins.
pub fn merge_dependencies(manifest: &Value, modules: &[ModuleRef]) -> Result<Value, ManifestError> {
    let Value::Object(fields) = manifest else {
        return Err(ManifestError::NotAnObject {
            found: type_name(manifest),
        });
    };

    let mut dependencies = Map::new();
    for module in modules {
        dependencies.insert(module.name.clone(), Value::String(module.version.clone()));
    }

    let mut merged = fields.clone();
    merged.insert(DEPENDENCIES_KEY.to_string(), Value::Object(dependencies));
    Ok(Value::Object(merged))
}

/// Text form of [`merge_dependencies`], pretty-printed with two-space indent
pub fn merge(manifest_json: &str, modules: &[ModuleRef]) -> Result<String, ManifestError> {
    let manifest: Value = serde_json::from_str(manifest_json)?;
    let merged = merge_dependencies(&manifest, modules)?;
    Ok(serde_json::to_string_pretty(&merged)?)
}

/// Version declared for `name` in the manifest's dependency section
pub fn declared_version<'a>(manifest: &'a Value, name: &str) -> Option<&'a str> {
    manifest.get(DEPENDENCIES_KEY)?.get(name)?.as_str()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
