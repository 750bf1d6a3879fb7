//! # Bundle Lifecycle Coordinator
//!
//! Drives a build through its lifecycle and hands successful builds over to
//! remote synchronization.
//!
//! ```text
//!          request_bundle            on_start + 100ms
//!   Idle ─────────────────▶ PendingStart ─────────────▶ Building
//!    ▲                         │    │                      │
//!    │          on_error       │    │ on_end (intent)      │ on_end (intent)
//!    ├─────────────────────────┘    ▼                      ▼
//!    │                          Finishing ◀────────────────┘
//!    │   on_sync_complete           │
//!    └──────────────────────────────┘
//! ```
//!
//! `on_end` without a pending intent and `on_error` from any in-flight state
//! go straight back to `Idle`. A new build may only start from `Idle`; every
//! other request is ignored.
//!
//! Each build gets the next [`BuildId`]. Sandbox reports tagged with any other
//! id belong to a build that was abandoned and are dropped.

use crate::remote::{RemoteError, SnippetRecord, SyncIntent, SyncResponse, Visibility};
use nextbin_bundle::{assemble, Bundle};
use nextbin_common::{BuildId, Delay, ErrorInfo, Instant};
use nextbin_editor::{EditableState, Editor};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub const PROGRESS_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BundlingStatus {
    #[default]
    Idle,
    PendingStart,
    Building,
    Finishing,
}

/// Where a finished build should be published
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTarget {
    Create,
    Update { id: String },
}

/// Remote write the caller must perform once a build has ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub target: SyncTarget,
    pub record: SnippetRecord,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Saved {
        id: String,
        revision: String,
        /// The response assigned an id different from the active one
        new_id: bool,
    },
    Failed(ErrorInfo),
}

#[derive(Debug)]
pub struct Coordinator {
    status: BundlingStatus,
    bundle: Option<Arc<Bundle>>,
    progress: Delay<()>,
    progress_delay: Duration,
    sync_intent: SyncIntent,
    snippet_id: Option<String>,
    last_failure: Option<ErrorInfo>,
    builds: BuildId,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(PROGRESS_DELAY)
    }
}

impl Coordinator {
    pub fn new(progress_delay: Duration) -> Self {
        Self {
            status: BundlingStatus::Idle,
            bundle: None,
            progress: Delay::new(),
            progress_delay,
            sync_intent: SyncIntent::None,
            snippet_id: None,
            last_failure: None,
            builds: 0,
        }
    }

    pub fn status(&self) -> BundlingStatus {
        self.status
    }

    pub fn is_idle(&self) -> bool {
        self.status == BundlingStatus::Idle
    }

    /// Progress indicator is shown once a build outlives the progress delay
    pub fn progress_visible(&self) -> bool {
        matches!(
            self.status,
            BundlingStatus::Building | BundlingStatus::Finishing
        )
    }

    /// Most recently assembled bundle
    pub fn bundle(&self) -> Option<&Arc<Bundle>> {
        self.bundle.as_ref()
    }

    pub fn sync_intent(&self) -> SyncIntent {
        self.sync_intent
    }

    /// Id that the next save updates; `None` means the next save creates
    pub fn snippet_id(&self) -> Option<&str> {
        self.snippet_id.as_deref()
    }

    pub fn last_failure(&self) -> Option<&ErrorInfo> {
        self.last_failure.as_ref()
    }

    /// Number of bundles handed to the sandbox so far; also the id of the
    /// most recent build
    pub fn builds(&self) -> BuildId {
        self.builds
    }

    /// Reports for `build` still concern the most recent build
    pub fn is_latest(&self, build: BuildId) -> bool {
        build == self.builds
    }

    pub fn adopt_snippet(&mut self, id: impl Into<String>) {
        self.snippet_id = Some(id.into());
    }

    pub fn forget_snippet(&mut self) {
        self.snippet_id = None;
    }

    /// Assemble a bundle from the editor state and move to `PendingStart`.
    ///
    /// Returns the bundle to hand to the sandbox, or `None` when a build is
    /// already in flight or the manifest is invalid (the error is surfaced in
    /// the editor).
    pub fn request_bundle(&mut self, editor: &mut Editor) -> Option<Arc<Bundle>> {
        if !self.is_idle() {
            tracing::debug!(status = ?self.status, "build already in flight, ignoring request");
            return None;
        }

        let bundle = match assemble(editor.state()) {
            Ok(bundle) => Arc::new(bundle),
            Err(e) => {
                tracing::debug!(error = %e, "bundle assembly failed");
                editor.surface_error(e.to_error_info());
                return None;
            }
        };

        self.bundle = Some(bundle.clone());
        self.status = BundlingStatus::PendingStart;
        self.last_failure = None;
        self.builds += 1;
        tracing::debug!(build = self.builds, "bundle ready");
        Some(bundle)
    }

    /// Request a build that publishes the state once it ends.
    ///
    /// Dropped when a build or sync is already in flight.
    pub fn request_sync(&mut self, visibility: Visibility, editor: &mut Editor) -> Option<Arc<Bundle>> {
        if !self.is_idle() {
            tracing::info!(
                visibility = visibility.as_str(),
                status = ?self.status,
                "save ignored while a build is in flight"
            );
            return None;
        }

        self.sync_intent = visibility.into();
        let bundle = self.request_bundle(editor);
        if bundle.is_none() {
            self.sync_intent = SyncIntent::None;
        }
        bundle
    }

    /// Sandbox acknowledged the bundle
    pub fn on_start(&mut self, build: BuildId, now: Instant) {
        if !self.is_latest(build) {
            tracing::debug!(build, current = self.builds, "start from an abandoned build");
            return;
        }
        if self.status != BundlingStatus::PendingStart {
            tracing::debug!(status = ?self.status, "unexpected start event");
            return;
        }
        self.progress.arm(now, self.progress_delay, ());
    }

    /// Show progress once the delay armed by `on_start` has passed.
    ///
    /// Returns true when the status changed.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.progress.take_due(now).is_none() {
            return false;
        }
        if self.status != BundlingStatus::PendingStart {
            return false;
        }
        tracing::debug!("build still running, showing progress");
        self.status = BundlingStatus::Building;
        true
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.progress.deadline()
    }

    /// Build failed. Returns false when `build` is not the one in flight.
    pub fn on_error(&mut self, build: BuildId, error: ErrorInfo) -> bool {
        if !self.is_latest(build) || self.is_idle() {
            tracing::debug!(build, message = %error.message, "sandbox error outside a build");
            return false;
        }
        self.progress.cancel();

        tracing::warn!(message = %error.message, "build failed");
        self.status = BundlingStatus::Idle;
        self.sync_intent = SyncIntent::None;
        self.last_failure = Some(error);
        true
    }

    /// Build finished. Returns the remote write to perform when a save was
    /// requested; the intent is consumed here, before the write starts.
    pub fn on_end(&mut self, build: BuildId, state: &EditableState) -> Option<SyncRequest> {
        if !self.is_latest(build) {
            tracing::debug!(build, current = self.builds, "end from an abandoned build");
            return None;
        }
        self.progress.cancel();
        if !matches!(
            self.status,
            BundlingStatus::PendingStart | BundlingStatus::Building
        ) {
            tracing::debug!(status = ?self.status, "unexpected end event");
            return None;
        }

        let Some(visibility) = self.sync_intent.visibility() else {
            self.status = BundlingStatus::Idle;
            return None;
        };
        self.sync_intent = SyncIntent::None;
        self.status = BundlingStatus::Finishing;

        let target = match &self.snippet_id {
            Some(id) => SyncTarget::Update { id: id.clone() },
            None => SyncTarget::Create,
        };
        Some(SyncRequest {
            target,
            record: SnippetRecord::from_state(state),
            visibility,
        })
    }

    /// Remote write finished.
    ///
    /// A response carrying an id different from the active one is adopted
    /// even when it arrives after the lifecycle has moved on.
    pub fn on_sync_complete(&mut self, result: Result<SyncResponse, RemoteError>) -> SyncOutcome {
        let in_flight = self.status == BundlingStatus::Finishing;
        if in_flight {
            self.status = BundlingStatus::Idle;
        } else {
            tracing::debug!(status = ?self.status, "late sync result");
        }

        match result {
            Ok(response) => {
                let new_id = self.snippet_id.as_deref() != Some(response.id.as_str());
                if new_id {
                    tracing::info!(id = %response.id, forked = response.forked, "now editing snippet");
                    self.snippet_id = Some(response.id.clone());
                }
                SyncOutcome::Saved {
                    id: response.id,
                    revision: response.revision,
                    new_id,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to save snippet");
                let info = ErrorInfo::remote(e.to_string());
                self.last_failure = Some(info.clone());
                SyncOutcome::Failed(info)
            }
        }
    }

    /// Abandon any build in flight and forget the active snippet.
    ///
    /// `builds` keeps counting, so late reports from the abandoned build never
    /// match the next one.
    pub fn reset(&mut self) {
        self.progress.cancel();
        self.status = BundlingStatus::Idle;
        self.sync_intent = SyncIntent::None;
        self.snippet_id = None;
        self.last_failure = None;
        self.bundle = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nextbin_editor::MemorySessionStore;
    use nextbin_transpiler::PassthroughTranspiler;

    fn editor() -> Editor {
        Editor::new(
            Arc::new(PassthroughTranspiler),
            Arc::new(MemorySessionStore::new()),
        )
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn saved(id: &str) -> Result<SyncResponse, RemoteError> {
        Ok(SyncResponse {
            id: id.to_string(),
            revision: "00000001".to_string(),
            forked: false,
        })
    }

    #[test]
    fn test_single_flight() {
        let mut editor = editor();
        let mut coordinator = Coordinator::default();

        assert!(coordinator.request_bundle(&mut editor).is_some());
        assert!(coordinator.request_bundle(&mut editor).is_none());
        assert_eq!(coordinator.builds(), 1);
        assert_eq!(coordinator.status(), BundlingStatus::PendingStart);
    }

    #[test]
    fn test_malformed_manifest_stays_idle() {
        let mut editor = editor();
        editor.apply_manifest_edit("{".into());
        let mut coordinator = Coordinator::default();

        assert!(coordinator.request_bundle(&mut editor).is_none());
        assert!(coordinator.is_idle());
        assert_eq!(coordinator.builds(), 0);
        assert_eq!(
            editor.state().last_error().map(|e| e.kind),
            Some(nextbin_common::ErrorKind::Manifest)
        );
    }

    #[test]
    fn test_progress_after_delay() {
        let mut editor = editor();
        let mut coordinator = Coordinator::default();
        let start = Instant::now();

        coordinator.request_bundle(&mut editor);
        coordinator.on_start(1, start);

        assert!(!coordinator.poll(start + ms(99)));
        assert!(!coordinator.progress_visible());
        assert!(coordinator.poll(start + ms(100)));
        assert_eq!(coordinator.status(), BundlingStatus::Building);
        assert!(coordinator.progress_visible());

        assert_eq!(coordinator.on_end(1, editor.state()), None);
        assert!(coordinator.is_idle());
        assert!(!coordinator.progress_visible());
    }

    #[test]
    fn test_fast_build_never_shows_progress() {
        let mut editor = editor();
        let mut coordinator = Coordinator::default();
        let start = Instant::now();

        coordinator.request_bundle(&mut editor);
        coordinator.on_start(1, start);
        coordinator.on_end(1, editor.state());

        assert_eq!(coordinator.next_deadline(), None);
        assert!(!coordinator.poll(start + ms(500)));
        assert!(coordinator.is_idle());
    }

    #[test]
    fn test_error_returns_to_idle_and_drops_intent() {
        let mut editor = editor();
        let mut coordinator = Coordinator::default();
        let start = Instant::now();

        coordinator.request_sync(Visibility::Public, &mut editor);
        coordinator.on_start(1, start);
        assert!(coordinator.on_error(1, ErrorInfo::sandbox("ReferenceError: x is not defined")));

        assert!(coordinator.is_idle());
        assert_eq!(coordinator.sync_intent(), SyncIntent::None);
        assert_eq!(coordinator.next_deadline(), None);
        assert_eq!(
            coordinator.last_failure().map(|e| e.message.as_str()),
            Some("ReferenceError: x is not defined")
        );

        // A stray error after the build is ignored
        assert!(!coordinator.on_error(1, ErrorInfo::sandbox("late")));
    }

    #[test]
    fn test_end_with_intent_creates_then_updates() {
        let mut editor = editor();
        let mut coordinator = Coordinator::default();

        coordinator.request_sync(Visibility::Public, &mut editor);
        let request = coordinator.on_end(1, editor.state()).unwrap();
        assert_eq!(request.target, SyncTarget::Create);
        assert_eq!(request.visibility, Visibility::Public);
        assert_eq!(request.record.code, editor.state().code());
        assert_eq!(coordinator.status(), BundlingStatus::Finishing);
        assert_eq!(coordinator.sync_intent(), SyncIntent::None);

        // Finishing blocks new work
        assert!(coordinator.request_bundle(&mut editor).is_none());

        let outcome = coordinator.on_sync_complete(saved("abc"));
        assert!(matches!(outcome, SyncOutcome::Saved { new_id: true, .. }));
        assert!(coordinator.is_idle());
        assert_eq!(coordinator.snippet_id(), Some("abc"));

        coordinator.request_sync(Visibility::Secret, &mut editor);
        let request = coordinator.on_end(2, editor.state()).unwrap();
        assert_eq!(request.target, SyncTarget::Update { id: "abc".into() });
        assert_eq!(request.visibility, Visibility::Secret);

        let outcome = coordinator.on_sync_complete(saved("abc"));
        assert!(matches!(outcome, SyncOutcome::Saved { new_id: false, .. }));
    }

    #[test]
    fn test_sync_dropped_while_busy() {
        let mut editor = editor();
        let mut coordinator = Coordinator::default();

        coordinator.request_bundle(&mut editor);
        assert!(coordinator.request_sync(Visibility::Public, &mut editor).is_none());
        assert_eq!(coordinator.sync_intent(), SyncIntent::None);
        assert_eq!(coordinator.on_end(1, editor.state()), None);
    }

    #[test]
    fn test_sync_failure_is_reported() {
        let mut editor = editor();
        let mut coordinator = Coordinator::default();
        coordinator.adopt_snippet("abc");

        coordinator.request_sync(Visibility::Public, &mut editor);
        coordinator.on_end(1, editor.state());
        let outcome = coordinator.on_sync_complete(Err(RemoteError::Unavailable("offline".into())));

        let SyncOutcome::Failed(info) = outcome else {
            panic!("expected failure, got {:?}", outcome);
        };
        assert_eq!(info.kind, nextbin_common::ErrorKind::Remote);
        assert!(coordinator.is_idle());
        assert_eq!(coordinator.snippet_id(), Some("abc"));
    }

    #[test]
    fn test_late_sync_result_adopts_id() {
        let mut editor = editor();
        let mut coordinator = Coordinator::default();

        coordinator.request_sync(Visibility::Public, &mut editor);
        coordinator.on_end(1, editor.state());
        coordinator.reset();
        coordinator.request_bundle(&mut editor);

        let outcome = coordinator.on_sync_complete(saved("fork-1"));
        assert!(matches!(outcome, SyncOutcome::Saved { new_id: true, .. }));
        assert_eq!(coordinator.snippet_id(), Some("fork-1"));
        // The unrelated build is still running
        assert_eq!(coordinator.status(), BundlingStatus::PendingStart);
    }

    #[test]
    fn test_assembly_failure_clears_intent() {
        let mut editor = editor();
        editor.apply_manifest_edit("not json".into());
        let mut coordinator = Coordinator::default();

        assert!(coordinator.request_sync(Visibility::Public, &mut editor).is_none());
        assert_eq!(coordinator.sync_intent(), SyncIntent::None);
        assert!(coordinator.is_idle());
    }

    #[test]
    fn test_reports_from_abandoned_build_are_ignored() {
        let mut editor = editor();
        let mut coordinator = Coordinator::default();
        let start = Instant::now();

        coordinator.request_bundle(&mut editor);
        coordinator.reset();
        coordinator.request_sync(Visibility::Public, &mut editor);
        assert_eq!(coordinator.builds(), 2);

        coordinator.on_start(1, start);
        assert_eq!(coordinator.next_deadline(), None);
        assert!(!coordinator.on_error(1, ErrorInfo::sandbox("stale")));
        assert_eq!(coordinator.on_end(1, editor.state()), None);
        assert_eq!(coordinator.status(), BundlingStatus::PendingStart);
        assert_eq!(coordinator.sync_intent(), SyncIntent::Public);
        assert_eq!(coordinator.last_failure(), None);

        let request = coordinator.on_end(2, editor.state()).unwrap();
        assert_eq!(request.target, SyncTarget::Create);
    }
}
