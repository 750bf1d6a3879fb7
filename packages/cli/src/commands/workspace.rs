use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use nextbin_common::{EventChannel, Query};
use nextbin_editor::FileSessionStore;
use nextbin_transpiler::OxcTranspiler;
use nextbin_workspace::{
    DirSnippetStore, DryRunSandbox, WorkspaceHandle, WorkspaceServer, WorkspaceSnapshot,
    WorkspaceState,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Edits applied before running a command
#[derive(Debug, Args)]
pub struct InputArgs {
    /// Source file to use as the sketch code
    #[arg(long)]
    pub code: Option<PathBuf>,

    /// HTML file to use as the sketch markup
    #[arg(long)]
    pub markup: Option<PathBuf>,

    /// JSON file to use as the sketch manifest
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Startup query, e.g. "?gist=1a2b3c4d&rev=00ff00ff"
    #[arg(long, default_value = "")]
    pub query: String,
}

/// A running workspace backed by the on-disk session and snippet store
pub struct LocalWorkspace {
    pub handle: WorkspaceHandle,
    server: JoinHandle<()>,
}

impl LocalWorkspace {
    pub fn open(config: &Config, cwd: &Path, query: &str) -> Self {
        tracing::debug!(query, session = %config.session_path(cwd).display(), "opening workspace");
        let state = WorkspaceState::new(
            Query::parse(query),
            Arc::new(OxcTranspiler::new()),
            Arc::new(FileSessionStore::new(config.session_path(cwd))),
            config.timings,
        );
        let remote = DirSnippetStore::new(config.snippet_dir(cwd), config.user.clone());
        let (server, handle) = WorkspaceServer::new(
            state,
            Arc::new(remote),
            Arc::new(DryRunSandbox::new()),
            EventChannel::new(),
        );

        Self {
            handle,
            server: server.spawn(),
        }
    }

    /// Apply the edits named by `input` as if typed into the editor, once
    /// the initial state has loaded
    pub async fn apply(&self, input: &InputArgs) -> Result<()> {
        self.handle.wait_until_idle().await?;
        if let Some(path) = &input.code {
            self.handle.edit_code(read(path)?)?;
        }
        if let Some(path) = &input.markup {
            self.handle.edit_markup(read(path)?)?;
        }
        if let Some(path) = &input.manifest {
            self.handle.edit_manifest(read(path)?)?;
        }
        Ok(())
    }

    /// Wait for in-flight work, then fail if the last build or save failed
    pub async fn settle(&self) -> Result<WorkspaceSnapshot> {
        let snapshot = self.handle.wait_until_idle().await?;
        if let Some(failure) = &snapshot.last_failure {
            return Err(anyhow!("{}", failure));
        }
        Ok(snapshot)
    }

    pub async fn close(self) -> Result<()> {
        self.handle.shutdown()?;
        self.server.await?;
        Ok(())
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))
}
