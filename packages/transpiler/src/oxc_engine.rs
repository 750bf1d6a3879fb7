//! oxc-backed engine: parses ES module + JSX source, lowers JSX to classic
//! `React.createElement` calls and re-emits the result with the oxc code
//! generator.

use crate::{TranspileError, Transpiler};
use oxc::allocator::Allocator;
use oxc::codegen::Codegen;
use oxc::diagnostics::OxcDiagnostic;
use oxc::parser::Parser;
use oxc::semantic::SemanticBuilder;
use oxc::span::SourceType;
use oxc::transformer::{JsxOptions, JsxRuntime, TransformOptions, Transformer};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

/// Virtual file name handed to the transformer
const SOURCE_PATH: &str = "sketch.jsx";

#[derive(Debug, Clone, Copy)]
pub struct OxcTranspiler {
    jsx: bool,
}

impl OxcTranspiler {
    pub fn new() -> Self {
        Self { jsx: true }
    }

    /// Reject JSX syntax
    pub fn without_jsx(mut self) -> Self {
        self.jsx = false;
        self
    }

    fn options() -> TransformOptions {
        TransformOptions {
            jsx: JsxOptions {
                runtime: JsxRuntime::Classic,
                ..JsxOptions::default()
            },
            ..TransformOptions::default()
        }
    }

    fn run(&self, source: &str) -> Result<String, TranspileError> {
        let allocator = Allocator::default();
        let source_type = SourceType::mjs().with_jsx(self.jsx);
        let ret = Parser::new(&allocator, source, source_type).parse();

        if !ret.errors.is_empty() {
            return Err(syntax_error(&ret.errors));
        }
        if ret.panicked {
            return Err(TranspileError::syntax("Unrecoverable syntax error"));
        }
        let mut program = ret.program;

        let semantic = SemanticBuilder::new().build(&program);
        if !semantic.errors.is_empty() {
            return Err(syntax_error(&semantic.errors));
        }
        let scoping = semantic.semantic.into_scoping();

        let transformed = Transformer::new(&allocator, Path::new(SOURCE_PATH), &Self::options())
            .build_with_scoping(scoping, &mut program);
        if !transformed.errors.is_empty() {
            return Err(syntax_error(&transformed.errors));
        }

        Ok(Codegen::new().build(&program).code)
    }
}

fn syntax_error(errors: &[OxcDiagnostic]) -> TranspileError {
    let message = errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    TranspileError::Syntax { message }
}

impl Default for OxcTranspiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Transpiler for OxcTranspiler {
    fn transform(&self, source: &str) -> Result<String, TranspileError> {
        catch_unwind(AssertUnwindSafe(|| self.run(source))).unwrap_or_else(|panic| {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(%reason, "oxc panicked while transpiling");
            Err(TranspileError::Internal(reason))
        })
    }
}
