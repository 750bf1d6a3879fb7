//! # Editor State Manager
//!
//! Applies edits to the [`EditableState`], re-transpiles on every code edit
//! and persists every edit to the session store.
//!
//! ```text
//! edit ─▶ persist ─▶ transpile ─▶ clear visible error
//!                        │
//!                        └─ failed? ─▶ arm error delay ──(quiet for 1s)──▶ show error
//! ```
//!
//! The transpiled code is updated synchronously; only the error display is
//! debounced, so a half-typed expression does not flash an error.

use crate::session::{SessionField, SessionStore};
use crate::state::{defaults, EditableState};
use nextbin_common::{Delay, ErrorInfo, Instant};
use nextbin_transpiler::{transpile, TranspileOutput, Transpiler};
use std::sync::Arc;
use std::time::Duration;

pub const ERROR_DISPLAY_DELAY: Duration = Duration::from_millis(1000);

pub struct Editor {
    state: EditableState,
    transpiler: Arc<dyn Transpiler>,
    store: Arc<dyn SessionStore>,
    /// Cleared while editing a remotely loaded snippet
    persist: bool,
    error_delay: Delay<ErrorInfo>,
    error_display_delay: Duration,
}

impl Editor {
    /// Create an editor holding the default state
    pub fn new(transpiler: Arc<dyn Transpiler>, store: Arc<dyn SessionStore>) -> Self {
        let mut editor = Self {
            state: EditableState {
                code: String::new(),
                markup: String::new(),
                manifest_json: String::new(),
                transpiled_code: String::new(),
                last_error: None,
            },
            transpiler,
            store,
            persist: true,
            error_delay: Delay::new(),
            error_display_delay: ERROR_DISPLAY_DELAY,
        };
        editor.initialize();
        editor
    }

    pub fn with_error_delay(mut self, delay: Duration) -> Self {
        self.error_display_delay = delay;
        self
    }

    /// Reset to the hard-coded defaults, transpiling the default code
    pub fn initialize(&mut self) {
        self.hydrate(
            defaults::CODE.to_string(),
            defaults::MARKUP.to_string(),
            defaults::MANIFEST.to_string(),
        );
    }

    pub fn state(&self) -> &EditableState {
        &self.state
    }

    pub fn apply_code_edit(&mut self, code: String, now: Instant) {
        self.persist_field(SessionField::Code, &code);
        self.error_delay.cancel();

        let output = self.transpile(&code);
        if let Some(error) = output.error {
            self.error_delay.arm(now, self.error_display_delay, error);
        }

        self.state.code = code;
        self.state.transpiled_code = output.code;
        self.state.last_error = None;
    }

    pub fn apply_markup_edit(&mut self, markup: String) {
        self.persist_field(SessionField::Markup, &markup);
        self.state.markup = markup;
        self.state.last_error = None;
    }

    pub fn apply_manifest_edit(&mut self, manifest_json: String) {
        self.persist_field(SessionField::Manifest, &manifest_json);
        self.state.manifest_json = manifest_json;
        self.state.last_error = None;
    }

    /// Replace all editable fields at once (remote snippet or restored
    /// session). A transpilation error is shown immediately.
    pub fn hydrate(&mut self, code: String, markup: String, manifest_json: String) {
        self.error_delay.cancel();
        let output = self.transpile(&code);

        self.state = EditableState {
            code,
            markup,
            manifest_json,
            transpiled_code: output.code,
            last_error: output.error,
        };
    }

    /// Hydrate from the session store. Fields the session lacks keep their
    /// current value. Returns the stored autorun flag.
    pub fn restore_session(&mut self) -> bool {
        let snapshot = match self.store.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::debug!("no previous session");
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load session, using defaults");
                return false;
            }
        };

        let code = snapshot.code.unwrap_or_else(|| self.state.code.clone());
        let markup = snapshot.markup.unwrap_or_else(|| self.state.markup.clone());
        let manifest_json = snapshot
            .manifest_json
            .unwrap_or_else(|| self.state.manifest_json.clone());
        self.hydrate(code, markup, manifest_json);

        tracing::info!("restored previous session");
        snapshot.autorun.unwrap_or(false)
    }

    /// Stop writing edits to the session store
    pub fn detach_session(&mut self) {
        self.persist = false;
    }

    pub fn persists_session(&self) -> bool {
        self.persist
    }

    /// Show `error` now, superseding any pending transpilation error
    pub fn surface_error(&mut self, error: ErrorInfo) {
        self.error_delay.cancel();
        self.state.last_error = Some(error);
    }

    /// Forget the stored session and go back to defaults
    pub fn reset(&mut self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "failed to clear session");
        }
        self.persist = true;
        self.initialize();
    }

    /// Persist an arbitrary session field (fire-and-forget)
    pub fn persist_field(&self, field: SessionField, value: &str) {
        if !self.persist {
            return;
        }
        if let Err(e) = self.store.save(field, value) {
            tracing::warn!(field = field.as_str(), error = %e, "failed to save session");
        }
    }

    pub fn has_pending_error(&self) -> bool {
        self.error_delay.is_armed()
    }

    /// Reveal the debounced error once its delay has passed.
    ///
    /// Returns true when the visible error changed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.error_delay.take_due(now) {
            Some(error) => {
                tracing::debug!(message = %error.message, "showing transpilation error");
                self.state.last_error = Some(error);
                true
            }
            None => false,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.error_delay.deadline()
    }

    fn transpile(&self, code: &str) -> TranspileOutput {
        match transpile(self.transpiler.as_ref(), code) {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(error = %e, "transpiler failed unexpectedly");
                TranspileOutput {
                    code: String::new(),
                    error: None,
                }
            }
        }
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("state", &self.state)
            .field("persist", &self.persist)
            .field("error_delay", &self.error_delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySessionStore, SessionSnapshot};
    use nextbin_common::ErrorKind;
    use nextbin_transpiler::TranspileError;

    /// Uppercases its input; rejects anything containing `!!`
    struct ShoutingTranspiler;

    impl Transpiler for ShoutingTranspiler {
        fn transform(&self, source: &str) -> Result<String, TranspileError> {
            if source.contains("!!") {
                Err(TranspileError::syntax(format!("bad input: {}", source)))
            } else if source.contains("crash") {
                Err(TranspileError::Internal("engine fell over".into()))
            } else {
                Ok(source.to_uppercase())
            }
        }
    }

    fn editor_with(store: Arc<MemorySessionStore>) -> Editor {
        Editor::new(Arc::new(ShoutingTranspiler), store)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_initialize_transpiles_defaults() {
        let editor = editor_with(Arc::new(MemorySessionStore::new()));
        let state = editor.state();

        assert_eq!(state.code(), defaults::CODE);
        assert_eq!(state.transpiled_code(), defaults::CODE.to_uppercase());
        assert_eq!(state.markup(), defaults::MARKUP);
        assert_eq!(state.manifest_json(), defaults::MANIFEST);
        assert!(state.last_error().is_none());
    }

    #[test]
    fn test_code_edit_transpiles_and_persists() {
        let store = Arc::new(MemorySessionStore::new());
        let mut editor = editor_with(store.clone());

        editor.apply_code_edit("let a = 1".into(), Instant::now());

        assert_eq!(editor.state().transpiled_code(), "LET A = 1");
        assert_eq!(store.load().unwrap().unwrap().code.as_deref(), Some("let a = 1"));
        assert!(!editor.has_pending_error());
    }

    #[test]
    fn test_error_shown_after_delay() {
        let mut editor = editor_with(Arc::new(MemorySessionStore::new()));
        let start = Instant::now();

        editor.apply_code_edit("oops!!".into(), start);

        // Code is never stale, only the error lags
        assert_eq!(editor.state().code(), "oops!!");
        assert_eq!(editor.state().transpiled_code(), "/*\nbad input: oops!!\n*/");
        assert!(editor.state().last_error().is_none());
        assert_eq!(editor.next_deadline(), Some(start + ERROR_DISPLAY_DELAY));

        assert!(!editor.poll(start + ms(999)));
        assert!(editor.state().last_error().is_none());

        assert!(editor.poll(start + ms(1000)));
        let error = editor.state().last_error().unwrap();
        assert_eq!(error.kind, ErrorKind::Transpile);
        assert_eq!(error.message, "bad input: oops!!");
    }

    #[test]
    fn test_valid_edit_cancels_pending_error() {
        let mut editor = editor_with(Arc::new(MemorySessionStore::new()));
        let start = Instant::now();

        editor.apply_code_edit("oops!!".into(), start);
        editor.apply_code_edit("fine".into(), start + ms(500));

        assert!(!editor.has_pending_error());
        assert!(!editor.poll(start + ms(5000)));
        assert!(editor.state().last_error().is_none());
        assert_eq!(editor.state().transpiled_code(), "FINE");
    }

    #[test]
    fn test_second_bad_edit_restarts_delay() {
        let mut editor = editor_with(Arc::new(MemorySessionStore::new()));
        let start = Instant::now();

        editor.apply_code_edit("a!!".into(), start);
        editor.apply_code_edit("b!!".into(), start + ms(800));

        assert!(!editor.poll(start + ms(1000)));
        assert!(editor.poll(start + ms(1800)));
        assert_eq!(editor.state().last_error().unwrap().message, "bad input: b!!");
    }

    #[test]
    fn test_edit_clears_visible_error() {
        let mut editor = editor_with(Arc::new(MemorySessionStore::new()));
        let start = Instant::now();

        editor.apply_code_edit("x!!".into(), start);
        editor.poll(start + ms(1000));
        assert!(editor.state().last_error().is_some());

        editor.apply_markup_edit("<p></p>".into());
        assert!(editor.state().last_error().is_none());

        editor.surface_error(ErrorInfo::manifest("bad json"));
        editor.apply_manifest_edit("{}".into());
        assert!(editor.state().last_error().is_none());
        assert_eq!(editor.state().manifest_json(), "{}");
    }

    #[test]
    fn test_surface_error_cancels_pending() {
        let mut editor = editor_with(Arc::new(MemorySessionStore::new()));
        let start = Instant::now();

        editor.apply_code_edit("x!!".into(), start);
        editor.surface_error(ErrorInfo::manifest("Unexpected end of JSON"));

        assert!(!editor.poll(start + ms(2000)));
        assert_eq!(editor.state().last_error().unwrap().kind, ErrorKind::Manifest);
    }

    #[test]
    fn test_hydrate_shows_error_immediately() {
        let mut editor = editor_with(Arc::new(MemorySessionStore::new()));

        editor.hydrate("broken!!".into(), "<b>".into(), "{}".into());

        assert_eq!(editor.state().markup(), "<b>");
        assert_eq!(editor.state().last_error().unwrap().kind, ErrorKind::Transpile);
        assert!(!editor.has_pending_error());
    }

    #[test]
    fn test_internal_failure_is_swallowed() {
        let mut editor = editor_with(Arc::new(MemorySessionStore::new()));

        editor.apply_code_edit("crash".into(), Instant::now());

        assert_eq!(editor.state().code(), "crash");
        assert_eq!(editor.state().transpiled_code(), "");
        assert!(!editor.has_pending_error());
    }

    #[test]
    fn test_restore_session_keeps_defaults_for_missing_fields() {
        let store = Arc::new(MemorySessionStore::with_snapshot(SessionSnapshot {
            code: Some("saved".into()),
            autorun: Some(true),
            ..SessionSnapshot::default()
        }));
        let mut editor = editor_with(store);

        assert!(editor.restore_session());
        assert_eq!(editor.state().code(), "saved");
        assert_eq!(editor.state().transpiled_code(), "SAVED");
        assert_eq!(editor.state().markup(), defaults::MARKUP);
    }

    #[test]
    fn test_restore_empty_session_is_defaults() {
        let mut editor = editor_with(Arc::new(MemorySessionStore::new()));
        let before = editor.state().clone();

        assert!(!editor.restore_session());
        assert_eq!(editor.state(), &before);
    }

    #[test]
    fn test_detached_editor_does_not_persist() {
        let store = Arc::new(MemorySessionStore::new());
        let mut editor = editor_with(store.clone());

        editor.detach_session();
        editor.apply_code_edit("remote edit".into(), Instant::now());

        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_reset() {
        let store = Arc::new(MemorySessionStore::new());
        let mut editor = editor_with(store.clone());
        editor.apply_code_edit("custom".into(), Instant::now());
        editor.detach_session();

        editor.reset();

        assert_eq!(store.load().unwrap(), None);
        assert_eq!(editor.state().code(), defaults::CODE);
        assert!(editor.persists_session());
    }
}
