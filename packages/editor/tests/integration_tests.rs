//! Integration tests for editor crate

use nextbin_common::{ErrorKind, Instant};
use nextbin_editor::{
    defaults, Editor, FileSessionStore, MemorySessionStore, SessionField, SessionStore,
};
use nextbin_transpiler::OxcTranspiler;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    {
        let store = Arc::new(FileSessionStore::new(&path));
        let mut editor = Editor::new(Arc::new(OxcTranspiler::new()), store);
        editor.apply_code_edit("const answer = 42;".to_string(), Instant::now());
        editor.apply_markup_edit("<main></main>".to_string());
    }

    let store = Arc::new(FileSessionStore::new(&path));
    let mut editor = Editor::new(Arc::new(OxcTranspiler::new()), store);
    editor.restore_session();

    assert_eq!(editor.state().code(), "const answer = 42;");
    assert!(editor.state().transpiled_code().contains("const answer = 42"));
    assert_eq!(editor.state().markup(), "<main></main>");
    assert_eq!(editor.state().manifest_json(), defaults::MANIFEST);
}

#[test]
fn test_save_then_load_round_trip() {
    let store = MemorySessionStore::new();
    store.save(SessionField::Code, "X").unwrap();
    store.save(SessionField::Markup, "Y").unwrap();

    let snapshot = store.load().unwrap().unwrap();
    assert_eq!(snapshot.code.as_deref(), Some("X"));
    assert_eq!(snapshot.markup.as_deref(), Some("Y"));
}

#[test]
fn test_oxc_syntax_error_is_debounced() {
    let mut editor = Editor::new(
        Arc::new(OxcTranspiler::new()),
        Arc::new(MemorySessionStore::new()),
    );
    let start = Instant::now();

    editor.apply_code_edit("const = ;".to_string(), start);
    assert!(editor.state().transpiled_code().starts_with("/*"));
    assert!(editor.state().last_error().is_none());

    editor.poll(start + Duration::from_millis(1000));
    assert_eq!(
        editor.state().last_error().map(|e| e.kind),
        Some(ErrorKind::Transpile)
    );
}
