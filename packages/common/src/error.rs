use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where a user-visible failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Source code failed to transpile
    Transpile,
    /// Manifest text is not valid JSON (or not an object)
    Manifest,
    /// Snippet fetch or sync failed
    Remote,
    /// The execution sandbox reported a failure
    Sandbox,
    /// Local session storage failed
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Transpile => "transpile",
            ErrorKind::Manifest => "manifest",
            ErrorKind::Remote => "remote",
            ErrorKind::Sandbox => "sandbox",
            ErrorKind::Storage => "storage",
        };
        f.write_str(label)
    }
}

/// Failure converted into state.
///
/// Errors never cross component boundaries as `Err`; they are captured here
/// and stored (as the visible editor error, or as the coordinator's last
/// failure) so that every consumer can render them without unwinding.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transpile(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transpile, message)
    }

    pub fn manifest(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Manifest, message)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Remote, message)
    }

    pub fn sandbox(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Sandbox, message)
    }
}
