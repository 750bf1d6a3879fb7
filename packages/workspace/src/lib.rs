//! # Nextbin Workspace
//!
//! Orchestrates a sketch session: decides where the initial state comes
//! from, runs builds through the sandbox one at a time and publishes finished
//! builds to the snippet host.
//!
//! - [`WorkspaceState`] is the synchronous core; it returns [`Effect`]s
//! - [`WorkspaceServer`] is the actor that performs them
//! - [`Coordinator`] is the build state machine
//! - [`RemoteSnippets`] and [`Sandbox`] are the external seams

pub mod config;
pub mod lifecycle;
pub mod remote;
pub mod sandbox;
pub mod server;
pub mod snippet_store;
pub mod state;

pub use config::Timings;
pub use lifecycle::{
    BundlingStatus, Coordinator, SyncOutcome, SyncRequest, SyncTarget, PROGRESS_DELAY,
};
pub use remote::{
    RemoteError, RemoteFuture, RemoteSnippets, SnippetRecord, SnippetRef, SyncIntent,
    SyncResponse, Visibility,
};
pub use sandbox::{discover_modules, package_name, DryRunSandbox, Sandbox, UNPINNED_VERSION};
pub use server::{Command, ServerError, WorkspaceHandle, WorkspaceServer};
pub use snippet_store::{DirSnippetStore, MemorySnippetStore};
pub use state::{Effect, WorkspaceSnapshot, WorkspaceState};
