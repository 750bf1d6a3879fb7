//! # Nextbin Editor
//!
//! Owns the editable state of a sketch: source code, markup and the
//! dependency manifest, plus the transpiled code derived from the source.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ transpiler: source → runnable source        │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: EditableState + edits               │
//! │  - Apply code/markup/manifest edits         │
//! │  - Debounce transpilation errors            │
//! │  - Persist every edit to the session store  │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ bundle: EditableState → Bundle              │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nextbin_editor::{Editor, MemorySessionStore};
//! use nextbin_transpiler::OxcTranspiler;
//!
//! let mut editor = Editor::new(Arc::new(OxcTranspiler::new()), Arc::new(MemorySessionStore::new()));
//! editor.restore_session();
//! editor.apply_code_edit("const a = <b/>;".to_string(), Instant::now());
//! ```

mod editor;
mod errors;
mod session;
mod state;

pub use editor::{Editor, ERROR_DISPLAY_DELAY};
pub use errors::StoreError;
pub use session::{
    FileSessionStore, MemorySessionStore, SessionField, SessionSnapshot, SessionStore,
};
pub use state::{defaults, EditableState};
