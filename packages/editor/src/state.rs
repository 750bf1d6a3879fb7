//! # Editable State
//!
//! The single mutable record behind the three editors. Only [`crate::Editor`]
//! writes it; everyone else gets a shared reference.
//!
//! `transpiled_code` is derived from `code` and is only ever written
//! together with it.

use nextbin_common::ErrorInfo;
use serde::Serialize;

/// Values used when there is no session and no remote snippet
pub mod defaults {
    pub const CODE: &str = r#"import React from 'react';
import ReactDOM from 'react-dom';

const App = () => <h1>Hello, world!</h1>;

ReactDOM.render(<App />, document.getElementById('root'));
"#;

    pub const MARKUP: &str = r#"<!doctype html>
<html>
<head>
    <meta charset="utf-8">
    <title>nextbin</title>
</head>
<body>
    <div id="root"></div>
</body>
</html>
"#;

    pub const MANIFEST: &str = r#"{
  "name": "nextbin-sketch",
  "version": "1.0.0",
  "dependencies": {}
}
"#;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditableState {
    pub(crate) code: String,
    pub(crate) markup: String,
    pub(crate) manifest_json: String,
    pub(crate) transpiled_code: String,
    pub(crate) last_error: Option<ErrorInfo>,
}

impl EditableState {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn manifest_json(&self) -> &str {
        &self.manifest_json
    }

    /// Derived from `code`; a comment block when transpilation failed
    pub fn transpiled_code(&self) -> &str {
        &self.transpiled_code
    }

    /// Error currently visible to the user
    pub fn last_error(&self) -> Option<&ErrorInfo> {
        self.last_error.as_ref()
    }
}
