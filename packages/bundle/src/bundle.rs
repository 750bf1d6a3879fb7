//! # Bundle - Ready-to-Execute Payload
//!
//! A `Bundle` is a snapshot of the editable state taken at the moment a build
//! is requested: the transpiled code the sandbox will run, the raw source it
//! can use for diagnostics, the markup page and the parsed manifest.
//!
//! ## Immutability
//!
//! Bundles are never modified after assembly. Every build assembles a new
//! one; the previous bundle is simply dropped once nothing refers to it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nextbin_bundle::assemble;
//!
//! match assemble(editor.state()) {
//!     Ok(bundle) => sandbox.execute(build, Arc::new(bundle), events.clone()),
//!     Err(e) => editor.surface_error(e.to_error_info()),
//! }
//! ```

use nextbin_common::ErrorInfo;
use nextbin_editor::EditableState;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("Manifest is not valid JSON: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl AssemblyError {
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo::manifest(self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    executable_code: String,
    raw_code: String,
    markup: String,
    manifest: Value,
}

impl Bundle {
    /// Code the sandbox executes (the transpiled source)
    pub fn executable_code(&self) -> &str {
        &self.executable_code
    }

    /// Source as typed, before transpilation
    pub fn raw_code(&self) -> &str {
        &self.raw_code
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn manifest(&self) -> &Value {
        &self.manifest
    }

    /// Version the manifest declares for `name`, if any
    pub fn declared_version(&self, name: &str) -> Option<&str> {
        crate::manifest::declared_version(&self.manifest, name)
    }
}

/// Build a bundle from the current editable state.
///
/// Fails only when the manifest text is not valid JSON; in that case no
/// bundle exists and the build must not start.
pub fn assemble(state: &EditableState) -> Result<Bundle, AssemblyError> {
    let manifest: Value = serde_json::from_str(state.manifest_json())?;

    tracing::debug!(
        code_len = state.transpiled_code().len(),
        markup_len = state.markup().len(),
        "assembled bundle"
    );

    Ok(Bundle {
        executable_code: state.transpiled_code().to_string(),
        raw_code: state.code().to_string(),
        markup: state.markup().to_string(),
        manifest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nextbin_common::{ErrorKind, Instant};
    use nextbin_editor::{Editor, MemorySessionStore};
    use nextbin_transpiler::{transpile, OxcTranspiler, Transpiler};
    use std::sync::Arc;

    fn editor(transpiler: Arc<dyn Transpiler>) -> Editor {
        Editor::new(transpiler, Arc::new(MemorySessionStore::new()))
    }

    #[test]
    fn test_executable_code_is_transpiled_code() {
        let transpiler: Arc<dyn Transpiler> = Arc::new(OxcTranspiler::new());
        let mut editor = editor(transpiler.clone());

        for code in ["const a = 1", "const el = <p>hi</p>;", "const = ;", ""] {
            editor.apply_code_edit(code.to_string(), Instant::now());
            let bundle = assemble(editor.state()).unwrap();

            let expected = transpile(transpiler.as_ref(), code).unwrap().code;
            assert_eq!(bundle.executable_code(), expected);
            assert_eq!(bundle.raw_code(), code);
        }
    }

    #[test]
    fn test_bundle_carries_markup_and_manifest() {
        let mut editor = editor(Arc::new(OxcTranspiler::new()));
        editor.apply_markup_edit("<div id=\"root\"></div>".into());
        editor.apply_manifest_edit(r#"{"name":"demo","dependencies":{"react":"18.2.0"}}"#.into());

        let bundle = assemble(editor.state()).unwrap();

        assert_eq!(bundle.markup(), "<div id=\"root\"></div>");
        assert_eq!(bundle.manifest()["name"], "demo");
        assert_eq!(bundle.declared_version("react"), Some("18.2.0"));
        assert_eq!(bundle.declared_version("vue"), None);
    }

    #[test]
    fn test_malformed_manifest_fails() {
        let mut editor = editor(Arc::new(OxcTranspiler::new()));
        editor.apply_manifest_edit("{".into());

        let err = assemble(editor.state()).unwrap_err();
        let info = err.to_error_info();
        assert_eq!(info.kind, ErrorKind::Manifest);
        assert!(info.message.starts_with("Manifest is not valid JSON"));
    }

    #[test]
    fn test_serializes_camel_case() {
        let editor = editor(Arc::new(OxcTranspiler::new()));
        let bundle = assemble(editor.state()).unwrap();

        let json = serde_json::to_value(&bundle).unwrap();
        assert!(json.get("executableCode").is_some());
        assert!(json.get("rawCode").is_some());
        assert!(json.get("markup").is_some());
        assert!(json.get("manifest").is_some());
    }
}
