//! Sans-IO workspace core.
//!
//! `WorkspaceState` ties the startup query, the editor and the lifecycle
//! coordinator together. It never performs I/O itself: every operation
//! returns the [`Effect`]s the caller must carry out, and results come back
//! through `on_fetched`, `on_sandbox_event` and `on_synced`.

use crate::config::Timings;
use crate::lifecycle::{BundlingStatus, Coordinator, SyncOutcome, SyncRequest};
use crate::remote::{RemoteError, SnippetRecord, SnippetRef, SyncResponse, Visibility};
use nextbin_bundle::{merge, merge_dependencies, Bundle, ManifestError};
use nextbin_common::{
    earliest, BuildId, Delay, ErrorInfo, Instant, ModuleRef, Query, SandboxEvent, SandboxReport,
};
use nextbin_editor::{EditableState, Editor, SessionField, SessionStore};
use nextbin_transpiler::Transpiler;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Hand a bundle to the sandbox; its reports must carry `build`
    Execute { build: BuildId, bundle: Arc<Bundle> },
    /// Load a snippet and report back through `on_fetched`
    Fetch(SnippetRef),
    /// Publish the state and report back through `on_synced`
    Sync(SyncRequest),
    /// Drop remote credentials
    Deauthorize,
}

/// Point-in-time view of the workspace
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSnapshot {
    pub state: EditableState,
    pub status: BundlingStatus,
    pub progress_visible: bool,
    /// A snippet fetch is in flight
    pub loading: bool,
    pub snippet_id: Option<String>,
    pub autorun: bool,
    pub last_failure: Option<ErrorInfo>,
    pub bundle: Option<Bundle>,
    pub builds: u64,
}

impl WorkspaceSnapshot {
    pub fn is_idle(&self) -> bool {
        self.status == BundlingStatus::Idle && !self.loading
    }
}

pub struct WorkspaceState {
    query: Query,
    editor: Editor,
    coordinator: Coordinator,
    timings: Timings,
    autorun: bool,
    autorun_delay: Delay<()>,
    loading: bool,
}

impl WorkspaceState {
    pub fn new(
        query: Query,
        transpiler: Arc<dyn Transpiler>,
        store: Arc<dyn SessionStore>,
        timings: Timings,
    ) -> Self {
        Self {
            query,
            editor: Editor::new(transpiler, store).with_error_delay(timings.error_display_delay()),
            coordinator: Coordinator::new(timings.progress_delay()),
            timings,
            autorun: false,
            autorun_delay: Delay::new(),
            loading: false,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn autorun(&self) -> bool {
        self.autorun
    }

    /// Decide where the initial state comes from.
    ///
    /// With a snippet id in the query the snippet is fetched and the local
    /// session is left untouched; otherwise the session is restored.
    pub fn start(&mut self) -> Vec<Effect> {
        let Some(id) = self.query.snippet_id() else {
            self.autorun = self.editor.restore_session();
            tracing::debug!(autorun = self.autorun, "started from local session");
            return Vec::new();
        };

        let snippet = SnippetRef {
            id: id.to_string(),
            revision: self.query.revision().map(String::from),
        };
        tracing::info!(id = %snippet.id, revision = ?snippet.revision, "loading snippet");

        self.editor.detach_session();
        self.coordinator.adopt_snippet(id);
        self.loading = true;
        vec![Effect::Fetch(snippet)]
    }

    /// Apply the snippet requested by `start`. A result that arrives after
    /// `reset` is dropped.
    pub fn on_fetched(&mut self, result: Result<SnippetRecord, RemoteError>) -> Vec<Effect> {
        if !self.loading {
            tracing::debug!("ignoring snippet fetched after reset");
            return Vec::new();
        }
        self.loading = false;
        match result {
            Ok(record) => {
                self.editor
                    .hydrate(record.code, record.markup, record.manifest_json);
                if self.query.auto_execute() {
                    return self.request_bundle();
                }
                Vec::new()
            }
            Err(e) => {
                // Saving must not target a snippet that could not be loaded
                tracing::warn!(error = %e, "failed to load snippet, keeping defaults");
                self.coordinator.forget_snippet();
                Vec::new()
            }
        }
    }

    pub fn edit_code(&mut self, code: String, now: Instant) {
        self.editor.apply_code_edit(code, now);
        if self.autorun {
            self.autorun_delay.arm(now, self.timings.autorun_delay(), ());
        }
    }

    pub fn edit_markup(&mut self, markup: String) {
        self.editor.apply_markup_edit(markup);
    }

    pub fn edit_manifest(&mut self, manifest_json: String) {
        self.editor.apply_manifest_edit(manifest_json);
    }

    pub fn request_bundle(&mut self) -> Vec<Effect> {
        self.autorun_delay.cancel();
        let bundle = self.coordinator.request_bundle(&mut self.editor);
        self.execute(bundle)
    }

    /// Build, then publish with `visibility` once the build ends
    pub fn save(&mut self, visibility: Visibility) -> Vec<Effect> {
        let bundle = self.coordinator.request_sync(visibility, &mut self.editor);
        self.execute(bundle)
    }

    pub fn on_sandbox_event(&mut self, report: SandboxReport, now: Instant) -> Vec<Effect> {
        let build = report.build;
        match report.event {
            SandboxEvent::Start => {
                self.coordinator.on_start(build, now);
                Vec::new()
            }
            SandboxEvent::Error(info) => {
                if self.coordinator.on_error(build, info.clone()) {
                    self.editor.surface_error(info);
                }
                Vec::new()
            }
            SandboxEvent::End => self
                .coordinator
                .on_end(build, self.editor.state())
                .map(Effect::Sync)
                .into_iter()
                .collect(),
            SandboxEvent::Dependencies(modules) => {
                if self.coordinator.is_latest(build) {
                    self.apply_dependencies(&modules);
                } else {
                    tracing::debug!(build, "dependencies from an abandoned build");
                }
                Vec::new()
            }
        }
    }

    pub fn on_synced(&mut self, result: Result<SyncResponse, RemoteError>) -> SyncOutcome {
        let outcome = self.coordinator.on_sync_complete(result);
        if let SyncOutcome::Failed(info) = &outcome {
            self.editor.surface_error(info.clone());
        }
        outcome
    }

    /// Flip autorun and remember the choice in the session. Returns the new
    /// value.
    pub fn toggle_autorun(&mut self) -> bool {
        self.autorun = !self.autorun;
        if !self.autorun {
            self.autorun_delay.cancel();
        }
        let value = if self.autorun { "true" } else { "false" };
        self.editor.persist_field(SessionField::Autorun, value);
        self.autorun
    }

    /// Forget the session and the active snippet, back to defaults
    pub fn reset(&mut self) -> Vec<Effect> {
        tracing::info!("resetting workspace");
        self.autorun = false;
        self.autorun_delay.cancel();
        self.loading = false;
        self.editor.reset();
        self.coordinator.reset();
        vec![Effect::Deauthorize]
    }

    /// Fire every delay that is due at `now`
    pub fn poll(&mut self, now: Instant) -> Vec<Effect> {
        self.editor.poll(now);
        self.coordinator.poll(now);
        if self.autorun_delay.take_due(now).is_some() {
            tracing::debug!("autorun");
            return self.request_bundle();
        }
        Vec::new()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.editor.next_deadline(),
            self.coordinator.next_deadline(),
            self.autorun_delay.deadline(),
        ])
    }

    pub fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            state: self.editor.state().clone(),
            status: self.coordinator.status(),
            progress_visible: self.loading || self.coordinator.progress_visible(),
            loading: self.loading,
            snippet_id: self.coordinator.snippet_id().map(String::from),
            autorun: self.autorun,
            last_failure: self.coordinator.last_failure().cloned(),
            bundle: self.coordinator.bundle().map(|b| b.as_ref().clone()),
            builds: self.coordinator.builds(),
        }
    }

    fn execute(&self, bundle: Option<Arc<Bundle>>) -> Vec<Effect> {
        bundle
            .map(|bundle| Effect::Execute {
                build: self.coordinator.builds(),
                bundle,
            })
            .into_iter()
            .collect()
    }

    fn apply_dependencies(&mut self, modules: &[ModuleRef]) {
        let merged = match self.merged_manifest(modules) {
            Ok(merged) => merged,
            Err(e) => {
                tracing::warn!(error = %e, "cannot record discovered dependencies");
                return;
            }
        };
        if merged != self.editor.state().manifest_json() {
            tracing::debug!(count = modules.len(), "recording discovered dependencies");
            self.editor.apply_manifest_edit(merged);
        }
    }

    fn merged_manifest(&self, modules: &[ModuleRef]) -> Result<String, ManifestError> {
        match merge(self.editor.state().manifest_json(), modules) {
            Ok(merged) => Ok(merged),
            Err(e) => {
                // The manifest was edited into an invalid state mid-build;
                // fall back to the one the sandbox actually ran with.
                let Some(bundle) = self.coordinator.bundle() else {
                    return Err(e);
                };
                let merged = merge_dependencies(bundle.manifest(), modules)?;
                Ok(serde_json::to_string_pretty(&merged)?)
            }
        }
    }
}

impl std::fmt::Debug for WorkspaceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceState")
            .field("query", &self.query)
            .field("editor", &self.editor)
            .field("coordinator", &self.coordinator)
            .field("autorun", &self.autorun)
            .field("loading", &self.loading)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::SyncTarget;
    use nextbin_common::ErrorKind;
    use nextbin_editor::{defaults, MemorySessionStore, SessionSnapshot};
    use nextbin_transpiler::PassthroughTranspiler;
    use std::time::Duration;

    fn workspace(search: &str, store: Arc<MemorySessionStore>) -> WorkspaceState {
        WorkspaceState::new(
            Query::parse(search),
            Arc::new(PassthroughTranspiler),
            store,
            Timings::default(),
        )
    }

    fn record(code: &str) -> SnippetRecord {
        SnippetRecord {
            id: Some("abc".into()),
            revision: Some("00000001".into()),
            code: code.into(),
            markup: "<main></main>".into(),
            manifest_json: r#"{"name":"shared"}"#.into(),
        }
    }

    /// Report for the first build
    fn report(event: SandboxEvent) -> SandboxReport {
        SandboxReport::new(1, event)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_start_without_snippet_restores_session() {
        let store = Arc::new(MemorySessionStore::with_snapshot(SessionSnapshot {
            code: Some("from session".into()),
            autorun: Some(true),
            ..SessionSnapshot::default()
        }));
        let mut ws = workspace("", store);

        assert!(ws.start().is_empty());
        assert_eq!(ws.editor().state().code(), "from session");
        assert!(ws.autorun());
        assert!(ws.snapshot().is_idle());
    }

    #[test]
    fn test_start_with_empty_session_is_defaults() {
        let mut ws = workspace("?exec=1", Arc::new(MemorySessionStore::new()));

        assert!(ws.start().is_empty());
        assert_eq!(ws.editor().state().code(), defaults::CODE);
        assert_eq!(ws.editor().state().markup(), defaults::MARKUP);
        assert_eq!(ws.editor().state().manifest_json(), defaults::MANIFEST);
    }

    #[test]
    fn test_start_with_snippet_fetches_and_detaches() {
        let store = Arc::new(MemorySessionStore::new());
        let mut ws = workspace("?gist=abc&sha=00000001", store.clone());

        let effects = ws.start();
        assert_eq!(effects, vec![Effect::Fetch(SnippetRef::at("abc", "00000001"))]);
        assert!(ws.snapshot().loading);
        assert!(ws.snapshot().progress_visible);

        assert!(ws.on_fetched(Ok(record("shared code"))).is_empty());
        assert_eq!(ws.editor().state().code(), "shared code");
        assert!(!ws.snapshot().loading);
        assert_eq!(ws.coordinator().snippet_id(), Some("abc"));

        // Remote edits stay out of the local session
        ws.edit_code("changed".into(), Instant::now());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_fetched_snippet_auto_executes() {
        let mut ws = workspace("?gist=abc&execute=true", Arc::new(MemorySessionStore::new()));
        ws.start();

        let effects = ws.on_fetched(Ok(record("run me")));
        let [Effect::Execute { bundle, .. }] = effects.as_slice() else {
            panic!("expected one execute effect, got {:?}", effects);
        };
        assert_eq!(bundle.raw_code(), "run me");
    }

    #[test]
    fn test_fetch_failure_keeps_defaults() {
        let mut ws = workspace("?gist=gone", Arc::new(MemorySessionStore::new()));
        ws.start();

        let effects = ws.on_fetched(Err(RemoteError::NotFound { id: "gone".into() }));

        assert!(effects.is_empty());
        assert_eq!(ws.editor().state().code(), defaults::CODE);
        assert!(ws.editor().state().last_error().is_none());
        assert_eq!(ws.coordinator().snippet_id(), None);
    }

    #[test]
    fn test_full_save_cycle() {
        let mut ws = workspace("", Arc::new(MemorySessionStore::new()));
        ws.start();
        let now = Instant::now();

        let effects = ws.save(Visibility::Public);
        assert!(matches!(effects.as_slice(), [Effect::Execute { build: 1, .. }]));

        ws.on_sandbox_event(report(SandboxEvent::Start), now);
        let effects = ws.on_sandbox_event(report(SandboxEvent::End), now + ms(10));
        let [Effect::Sync(request)] = effects.as_slice() else {
            panic!("expected one sync effect, got {:?}", effects);
        };
        assert_eq!(request.target, SyncTarget::Create);

        ws.on_synced(Ok(SyncResponse {
            id: "new".into(),
            revision: "00000001".into(),
            forked: false,
        }));
        assert_eq!(ws.snapshot().snippet_id.as_deref(), Some("new"));
        assert!(ws.snapshot().is_idle());
    }

    #[test]
    fn test_sandbox_error_is_surfaced() {
        let mut ws = workspace("", Arc::new(MemorySessionStore::new()));
        ws.request_bundle();

        ws.on_sandbox_event(report(SandboxEvent::Error(ErrorInfo::sandbox("boom"))), Instant::now());

        let snapshot = ws.snapshot();
        assert!(snapshot.is_idle());
        assert_eq!(snapshot.state.last_error().map(|e| e.kind), Some(ErrorKind::Sandbox));
        assert_eq!(snapshot.last_failure.map(|e| e.message), Some("boom".to_string()));
    }

    #[test]
    fn test_dependencies_merge_into_manifest() {
        let mut ws = workspace("", Arc::new(MemorySessionStore::new()));
        ws.edit_manifest(r#"{"name":"demo","dependencies":{"old":"1.0.0"}}"#.into());
        ws.request_bundle();

        ws.on_sandbox_event(
            report(SandboxEvent::Dependencies(vec![ModuleRef::new("left-pad", "1.0.0")])),
            Instant::now(),
        );

        let manifest: serde_json::Value =
            serde_json::from_str(ws.editor().state().manifest_json()).unwrap();
        assert_eq!(manifest["name"], "demo");
        assert_eq!(manifest["dependencies"], serde_json::json!({ "left-pad": "1.0.0" }));
    }

    #[test]
    fn test_dependencies_fall_back_to_executed_manifest() {
        let mut ws = workspace("", Arc::new(MemorySessionStore::new()));
        ws.edit_manifest(r#"{"name":"demo"}"#.into());
        ws.request_bundle();
        ws.edit_manifest(r#"{"name":"de"#.into());

        ws.on_sandbox_event(
            report(SandboxEvent::Dependencies(vec![ModuleRef::new("react", "18.2.0")])),
            Instant::now(),
        );

        let manifest: serde_json::Value =
            serde_json::from_str(ws.editor().state().manifest_json()).unwrap();
        assert_eq!(manifest["name"], "demo");
        assert_eq!(manifest["dependencies"]["react"], "18.2.0");
    }

    #[test]
    fn test_autorun_debounces_code_edits() {
        let store = Arc::new(MemorySessionStore::new());
        let mut ws = workspace("", store.clone());
        ws.start();
        let start = Instant::now();

        assert!(ws.toggle_autorun());
        assert_eq!(store.load().unwrap().unwrap().autorun, Some(true));

        ws.edit_code("a".into(), start);
        ws.edit_code("ab".into(), start + ms(500));
        assert!(ws.poll(start + ms(1000)).is_empty());
        assert_eq!(ws.next_deadline(), Some(start + ms(1500)));

        let effects = ws.poll(start + ms(1500));
        let [Effect::Execute { bundle, .. }] = effects.as_slice() else {
            panic!("expected autorun build, got {:?}", effects);
        };
        assert_eq!(bundle.raw_code(), "ab");
    }

    #[test]
    fn test_autorun_off_never_builds() {
        let mut ws = workspace("", Arc::new(MemorySessionStore::new()));
        let start = Instant::now();

        ws.edit_code("a".into(), start);
        assert_eq!(ws.next_deadline(), None);
        assert!(ws.poll(start + ms(5000)).is_empty());
    }

    #[test]
    fn test_reset() {
        let store = Arc::new(MemorySessionStore::new());
        let mut ws = workspace("?gist=abc", store.clone());
        ws.start();
        ws.on_fetched(Ok(record("shared")));
        ws.toggle_autorun();

        assert_eq!(ws.reset(), vec![Effect::Deauthorize]);

        let snapshot = ws.snapshot();
        assert_eq!(snapshot.state.code(), defaults::CODE);
        assert_eq!(snapshot.snippet_id, None);
        assert!(!snapshot.autorun);
        assert!(ws.editor().persists_session());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_fetch_after_reset_is_dropped() {
        let store = Arc::new(MemorySessionStore::new());
        let mut ws = workspace("?gist=abc&execute=1", store.clone());
        ws.start();
        ws.reset();

        assert!(ws.on_fetched(Ok(record("remote"))).is_empty());
        assert_eq!(ws.editor().state().code(), defaults::CODE);
        assert_eq!(ws.snapshot().builds, 0);
        assert_eq!(ws.snapshot().snippet_id, None);

        // Edits after the reset go to the fresh session
        ws.edit_code("typed".into(), Instant::now());
        assert_eq!(store.load().unwrap().and_then(|s| s.code), Some("typed".to_string()));
    }

    #[test]
    fn test_end_from_abandoned_build_does_not_finish_next_one() {
        let mut ws = workspace("", Arc::new(MemorySessionStore::new()));
        ws.start();
        let now = Instant::now();

        ws.request_bundle();
        ws.reset();
        let effects = ws.save(Visibility::Public);
        assert!(matches!(effects.as_slice(), [Effect::Execute { build: 2, .. }]));

        assert!(ws.on_sandbox_event(report(SandboxEvent::End), now).is_empty());
        ws.on_sandbox_event(
            report(SandboxEvent::Dependencies(vec![ModuleRef::new("left-pad", "1.0.0")])),
            now,
        );
        assert_eq!(ws.snapshot().status, BundlingStatus::PendingStart);
        assert_eq!(ws.editor().state().manifest_json(), defaults::MANIFEST);

        let effects = ws.on_sandbox_event(SandboxReport::new(2, SandboxEvent::End), now);
        assert!(matches!(effects.as_slice(), [Effect::Sync(_)]));
    }
}
