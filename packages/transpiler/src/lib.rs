//! # Nextbin Transpiler
//!
//! Adapter around the source transpiler. The engine itself is opaque: it
//! turns editor source into runnable source or fails. This crate normalizes
//! both outcomes so callers always get a string back.
//!
//! ```text
//! source ──transform──▶ Ok(code)                 → { code, error: None }
//!        └────────────▶ Err(Syntax { message })  → { "/* message */", error }
//!        └────────────▶ Err(Internal(..))        → propagated unchanged
//! ```

mod oxc_engine;

pub use oxc_engine::OxcTranspiler;

use nextbin_common::ErrorInfo;
use thiserror::Error;

const FALLBACK_MESSAGE: &str = "Error while transpilation";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranspileError {
    /// Raised by the engine about the input; recoverable
    #[error("{message}")]
    Syntax { message: String },

    /// Engine crashed or misbehaved; not the user's fault
    #[error("Transpiler failed unexpectedly: {0}")]
    Internal(String),
}

impl TranspileError {
    pub fn syntax(message: impl Into<String>) -> Self {
        TranspileError::Syntax {
            message: message.into(),
        }
    }

    /// Whether the failure originated from the transpiler's own diagnostics
    pub fn is_transpiler_error(&self) -> bool {
        matches!(self, TranspileError::Syntax { .. })
    }
}

/// Source-to-source transformation engine
pub trait Transpiler: Send + Sync {
    fn transform(&self, source: &str) -> Result<String, TranspileError>;
}

/// Returns input unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTranspiler;

impl Transpiler for PassthroughTranspiler {
    fn transform(&self, source: &str) -> Result<String, TranspileError> {
        Ok(source.to_string())
    }
}

/// Uniform transpilation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranspileOutput {
    /// Transpiled source, or a comment block describing the failure
    pub code: String,
    pub error: Option<ErrorInfo>,
}

/// Transpile `source`, turning transpiler diagnostics into a comment block.
///
/// Empty source short-circuits without calling the engine. Only
/// [`TranspileError::Syntax`] is converted; anything else is returned as-is.
pub fn transpile(
    transpiler: &dyn Transpiler,
    source: &str,
) -> Result<TranspileOutput, TranspileError> {
    if source.is_empty() {
        return Ok(TranspileOutput {
            code: String::new(),
            error: None,
        });
    }

    match transpiler.transform(source) {
        Ok(code) => Ok(TranspileOutput { code, error: None }),
        Err(TranspileError::Syntax { message }) => {
            tracing::debug!(%message, "transpilation failed");
            Ok(TranspileOutput {
                code: error_comment(&message),
                error: Some(ErrorInfo::transpile(message)),
            })
        }
        Err(err) => Err(err),
    }
}

/// Comment block that stands in for code that failed to transpile
pub fn error_comment(message: &str) -> String {
    let message = if message.trim().is_empty() {
        FALLBACK_MESSAGE
    } else {
        message
    };
    // A literal terminator would end the block early
    let body = message.replace("*/", "* /");
    format!("/*\n{}\n*/", body)
}
