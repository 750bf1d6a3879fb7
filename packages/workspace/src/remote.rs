//! # Remote Snippet Adapter
//!
//! Contract for the versioned snippet host. Only the read/create/update
//! semantics matter here; transport and authentication belong to the
//! implementation.

use futures::future::BoxFuture;
use nextbin_editor::EditableState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    Public,
    Secret,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Secret => "secret",
        }
    }
}

/// Pending request to publish the state once the current build ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncIntent {
    #[default]
    None,
    Public,
    Secret,
}

impl SyncIntent {
    pub fn visibility(self) -> Option<Visibility> {
        match self {
            SyncIntent::None => None,
            SyncIntent::Public => Some(Visibility::Public),
            SyncIntent::Secret => Some(Visibility::Secret),
        }
    }

    pub fn is_pending(self) -> bool {
        self != SyncIntent::None
    }
}

impl From<Visibility> for SyncIntent {
    fn from(visibility: Visibility) -> Self {
        match visibility {
            Visibility::Public => SyncIntent::Public,
            Visibility::Secret => SyncIntent::Secret,
        }
    }
}

/// Unit exchanged with the snippet host. `id` is `None` until created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
    pub code: String,
    pub markup: String,
    pub manifest_json: String,
}

impl SnippetRecord {
    /// Unsaved record carrying the current editable fields
    pub fn from_state(state: &EditableState) -> Self {
        Self {
            id: None,
            revision: None,
            code: state.code().to_string(),
            markup: state.markup().to_string(),
            manifest_json: state.manifest_json().to_string(),
        }
    }
}

/// Snippet id with an optional pinned revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetRef {
    pub id: String,
    pub revision: Option<String>,
}

impl SnippetRef {
    pub fn latest(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            revision: None,
        }
    }

    pub fn at(id: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            revision: Some(revision.into()),
        }
    }
}

/// Result of a create or update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub id: String,
    pub revision: String,
    /// The update produced a copy under a new id instead of a new revision
    pub forked: bool,
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Snippet {id} not found")]
    NotFound { id: String },

    #[error("Snippet {id} has no revision {revision}")]
    RevisionNotFound { id: String, revision: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed snippet data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snippet host unavailable: {0}")]
    Unavailable(String),
}

pub type RemoteFuture<T> = BoxFuture<'static, Result<T, RemoteError>>;

/// Versioned snippet host.
///
/// Every operation reports failure through its result; none of them panic
/// or block the caller.
pub trait RemoteSnippets: Send + Sync {
    fn fetch(&self, snippet: SnippetRef) -> RemoteFuture<SnippetRecord>;

    fn create(&self, record: SnippetRecord, visibility: Visibility) -> RemoteFuture<SyncResponse>;

    fn update(
        &self,
        id: String,
        record: SnippetRecord,
        visibility: Visibility,
    ) -> RemoteFuture<SyncResponse>;

    /// Drop credentials; later writes are anonymous
    fn deauthorize(&self);
}
