//! # Snippet Stores
//!
//! Local implementations of [`RemoteSnippets`]: an in-memory host (with
//! optional simulated latency) and a directory-backed one that keeps one JSON
//! history file per snippet.
//!
//! Both follow the same ownership rules:
//! - `create` records the current user as owner (none when deauthorized)
//! - `update` by the owner appends a revision
//! - `update` by anyone else forks: a new snippet is created and `forked` is set

use crate::remote::{
    RemoteError, RemoteFuture, RemoteSnippets, SnippetRecord, SnippetRef, SyncResponse,
    Visibility,
};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRevision {
    revision: String,
    created_at: DateTime<Utc>,
    code: String,
    markup: String,
    manifest_json: String,
}

/// Full revision history of one snippet, oldest first
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnippetHistory {
    id: String,
    owner: Option<String>,
    visibility: Visibility,
    revisions: Vec<StoredRevision>,
}

impl SnippetHistory {
    fn new(id: String, owner: Option<String>, visibility: Visibility) -> Self {
        Self {
            id,
            owner,
            visibility,
            revisions: Vec::new(),
        }
    }

    /// Append `record` as the newest revision and return its id
    fn push(&mut self, record: &SnippetRecord) -> String {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(self.id.as_bytes());
        hasher.update(&(self.revisions.len() as u64).to_le_bytes());
        hasher.update(record.code.as_bytes());
        hasher.update(record.markup.as_bytes());
        hasher.update(record.manifest_json.as_bytes());
        let revision = format!("{:08x}", hasher.finalize());

        self.revisions.push(StoredRevision {
            revision: revision.clone(),
            created_at: Utc::now(),
            code: record.code.clone(),
            markup: record.markup.clone(),
            manifest_json: record.manifest_json.clone(),
        });
        revision
    }

    fn record(&self, revision: Option<&str>) -> Result<SnippetRecord, RemoteError> {
        let stored = match revision {
            Some(wanted) => self.revisions.iter().find(|r| r.revision == wanted),
            None => self.revisions.last(),
        };
        let stored = stored.ok_or_else(|| match revision {
            Some(wanted) => RemoteError::RevisionNotFound {
                id: self.id.clone(),
                revision: wanted.to_string(),
            },
            None => RemoteError::NotFound {
                id: self.id.clone(),
            },
        })?;

        Ok(SnippetRecord {
            id: Some(self.id.clone()),
            revision: Some(stored.revision.clone()),
            code: stored.code.clone(),
            markup: stored.markup.clone(),
            manifest_json: stored.manifest_json.clone(),
        })
    }

    /// Anonymous snippets can never be updated in place
    fn is_owned_by(&self, user: Option<&str>) -> bool {
        self.owner.is_some() && self.owner.as_deref() == user
    }
}

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn new_snippet_id(user: Option<&str>) -> String {
    let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(user.unwrap_or("anonymous").as_bytes());
    hasher.update(&Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(&seq.to_le_bytes());
    format!("{:08x}{:04x}", hasher.finalize(), seq & 0xffff)
}

/// Apply an update to `history`, forking when `user` does not own it.
///
/// Returns the history to persist (the original or the fork) and the response.
fn apply_update(
    mut history: SnippetHistory,
    user: Option<&str>,
    record: &SnippetRecord,
    visibility: Visibility,
) -> (SnippetHistory, SyncResponse) {
    if history.is_owned_by(user) {
        history.visibility = visibility;
        let revision = history.push(record);
        let response = SyncResponse {
            id: history.id.clone(),
            revision,
            forked: false,
        };
        return (history, response);
    }

    tracing::info!(source = %history.id, "forking snippet not owned by current user");
    let mut fork = SnippetHistory::new(new_snippet_id(user), user.map(String::from), visibility);
    let revision = fork.push(record);
    let response = SyncResponse {
        id: fork.id.clone(),
        revision,
        forked: true,
    };
    (fork, response)
}

#[derive(Debug)]
struct Identity {
    user: Mutex<Option<String>>,
}

impl Identity {
    fn new(user: Option<String>) -> Self {
        Self {
            user: Mutex::new(user),
        }
    }

    fn current(&self) -> Option<String> {
        self.user.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn clear(&self) {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// In-process snippet host
#[derive(Debug, Clone)]
pub struct MemorySnippetStore {
    snippets: Arc<Mutex<HashMap<String, SnippetHistory>>>,
    identity: Arc<Identity>,
    latency: Duration,
}

impl MemorySnippetStore {
    pub fn new(user: Option<String>) -> Self {
        Self {
            snippets: Arc::new(Mutex::new(HashMap::new())),
            identity: Arc::new(Identity::new(user)),
            latency: Duration::ZERO,
        }
    }

    /// Delay every operation by `latency` to simulate a network round trip
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of stored snippets
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of revisions stored for `id`
    pub fn revision_count(&self, id: &str) -> usize {
        self.lock().get(id).map(|h| h.revisions.len()).unwrap_or(0)
    }

    pub fn owner_of(&self, id: &str) -> Option<String> {
        self.lock().get(id).and_then(|h| h.owner.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SnippetHistory>> {
        self.snippets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(latency: Duration) {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl RemoteSnippets for MemorySnippetStore {
    fn fetch(&self, snippet: SnippetRef) -> RemoteFuture<SnippetRecord> {
        let store = self.clone();
        async move {
            Self::simulate_latency(store.latency).await;
            let snippets = store.lock();
            let history = snippets
                .get(&snippet.id)
                .ok_or_else(|| RemoteError::NotFound {
                    id: snippet.id.clone(),
                })?;
            history.record(snippet.revision.as_deref())
        }
        .boxed()
    }

    fn create(&self, record: SnippetRecord, visibility: Visibility) -> RemoteFuture<SyncResponse> {
        let store = self.clone();
        let user = self.identity.current();
        async move {
            Self::simulate_latency(store.latency).await;
            let mut history =
                SnippetHistory::new(new_snippet_id(user.as_deref()), user, visibility);
            let revision = history.push(&record);
            let id = history.id.clone();
            store.lock().insert(id.clone(), history);

            tracing::debug!(%id, visibility = visibility.as_str(), "created snippet");
            Ok(SyncResponse {
                id,
                revision,
                forked: false,
            })
        }
        .boxed()
    }

    fn update(
        &self,
        id: String,
        record: SnippetRecord,
        visibility: Visibility,
    ) -> RemoteFuture<SyncResponse> {
        let store = self.clone();
        let user = self.identity.current();
        async move {
            Self::simulate_latency(store.latency).await;
            let mut snippets = store.lock();
            let history = snippets
                .get(&id)
                .cloned()
                .ok_or_else(|| RemoteError::NotFound { id: id.clone() })?;

            let (history, response) = apply_update(history, user.as_deref(), &record, visibility);
            snippets.insert(history.id.clone(), history);
            Ok(response)
        }
        .boxed()
    }

    fn deauthorize(&self) {
        self.identity.clear();
    }
}

/// Snippet host backed by a directory of `<id>.json` history files
#[derive(Debug, Clone)]
pub struct DirSnippetStore {
    root: PathBuf,
    identity: Arc<Identity>,
}

impl DirSnippetStore {
    pub fn new(root: impl Into<PathBuf>, user: Option<String>) -> Self {
        Self {
            root: root.into(),
            identity: Arc::new(Identity::new(user)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn history_path(root: &Path, id: &str) -> PathBuf {
        root.join(format!("{}.json", id))
    }

    async fn read(root: &Path, id: &str) -> Result<SnippetHistory, RemoteError> {
        // Ids come from the query string; never let them escape the root
        if id.is_empty() || id.contains(['/', '\\', '.']) {
            return Err(RemoteError::NotFound { id: id.to_string() });
        }
        let content = match tokio::fs::read_to_string(Self::history_path(root, id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RemoteError::NotFound { id: id.to_string() })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    async fn write(root: &Path, history: &SnippetHistory) -> Result<(), RemoteError> {
        tokio::fs::create_dir_all(root).await?;
        let encoded = serde_json::to_string_pretty(history)?;
        tokio::fs::write(Self::history_path(root, &history.id), encoded).await?;
        Ok(())
    }
}

impl RemoteSnippets for DirSnippetStore {
    fn fetch(&self, snippet: SnippetRef) -> RemoteFuture<SnippetRecord> {
        let root = self.root.clone();
        async move {
            let history = Self::read(&root, &snippet.id).await?;
            history.record(snippet.revision.as_deref())
        }
        .boxed()
    }

    fn create(&self, record: SnippetRecord, visibility: Visibility) -> RemoteFuture<SyncResponse> {
        let root = self.root.clone();
        let user = self.identity.current();
        async move {
            let mut history =
                SnippetHistory::new(new_snippet_id(user.as_deref()), user, visibility);
            let revision = history.push(&record);
            Self::write(&root, &history).await?;

            Ok(SyncResponse {
                id: history.id,
                revision,
                forked: false,
            })
        }
        .boxed()
    }

    fn update(
        &self,
        id: String,
        record: SnippetRecord,
        visibility: Visibility,
    ) -> RemoteFuture<SyncResponse> {
        let root = self.root.clone();
        let user = self.identity.current();
        async move {
            let history = Self::read(&root, &id).await?;
            let (history, response) = apply_update(history, user.as_deref(), &record, visibility);
            Self::write(&root, &history).await?;
            Ok(response)
        }
        .boxed()
    }

    fn deauthorize(&self) {
        self.identity.clear();
    }
}
