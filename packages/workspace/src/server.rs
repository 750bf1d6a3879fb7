//! # Workspace Server
//!
//! Actor that owns a [`WorkspaceState`] and performs its effects.
//!
//! ```text
//! WorkspaceHandle ──Command──┐
//! EventChannel ─SandboxReport┼──▶ inbox ──▶ WorkspaceState ──Effect──▶ sandbox / remote tasks
//! remote tasks ──results─────┘                 │                            │
//!                                              └── sleep until next deadline │
//!                                                                            │
//!        results are sent back to the inbox ◀────────────────────────────────┘
//! ```
//!
//! All state changes happen on the actor task, one message at a time, so the
//! editor and coordinator need no locks. The actor stops when every handle is
//! dropped or on `shutdown`. Remote tasks and the event forwarder only hold a
//! weak sender: a result that arrives after the actor stopped is discarded.

use crate::lifecycle::{SyncOutcome, SyncTarget};
use crate::remote::{RemoteError, RemoteFuture, RemoteSnippets, SnippetRecord, SyncResponse, Visibility};
use crate::sandbox::Sandbox;
use crate::state::{Effect, WorkspaceSnapshot, WorkspaceState};
use nextbin_common::{EventChannel, Instant, SandboxReport, SubscriptionId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// How often `wait_until_idle` re-checks the workspace
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Workspace server has stopped")]
    Stopped,
}

#[derive(Debug)]
pub enum Command {
    EditCode(String),
    EditMarkup(String),
    EditManifest(String),
    Bundle,
    Save(Visibility),
    ToggleAutorun,
    Reset,
    Snapshot(oneshot::Sender<WorkspaceSnapshot>),
    Shutdown,
}

#[derive(Debug)]
enum Message {
    Command(Command),
    Sandbox(SandboxReport),
    Fetched(Result<SnippetRecord, RemoteError>),
    Synced(Result<SyncResponse, RemoteError>),
}

/// Cloneable client for a running [`WorkspaceServer`]
#[derive(Debug, Clone)]
pub struct WorkspaceHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl WorkspaceHandle {
    pub fn send(&self, command: Command) -> Result<(), ServerError> {
        self.tx
            .send(Message::Command(command))
            .map_err(|_| ServerError::Stopped)
    }

    pub fn edit_code(&self, code: impl Into<String>) -> Result<(), ServerError> {
        self.send(Command::EditCode(code.into()))
    }

    pub fn edit_markup(&self, markup: impl Into<String>) -> Result<(), ServerError> {
        self.send(Command::EditMarkup(markup.into()))
    }

    pub fn edit_manifest(&self, manifest_json: impl Into<String>) -> Result<(), ServerError> {
        self.send(Command::EditManifest(manifest_json.into()))
    }

    pub fn bundle(&self) -> Result<(), ServerError> {
        self.send(Command::Bundle)
    }

    pub fn save(&self, visibility: Visibility) -> Result<(), ServerError> {
        self.send(Command::Save(visibility))
    }

    pub fn toggle_autorun(&self) -> Result<(), ServerError> {
        self.send(Command::ToggleAutorun)
    }

    pub fn reset(&self) -> Result<(), ServerError> {
        self.send(Command::Reset)
    }

    pub fn shutdown(&self) -> Result<(), ServerError> {
        self.send(Command::Shutdown)
    }

    pub async fn snapshot(&self) -> Result<WorkspaceSnapshot, ServerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        rx.await.map_err(|_| ServerError::Stopped)
    }

    /// Wait until no fetch, build or sync is in flight
    pub async fn wait_until_idle(&self) -> Result<WorkspaceSnapshot, ServerError> {
        loop {
            let snapshot = self.snapshot().await?;
            if snapshot.is_idle() {
                return Ok(snapshot);
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }
}

pub struct WorkspaceServer {
    state: WorkspaceState,
    remote: Arc<dyn RemoteSnippets>,
    sandbox: Arc<dyn Sandbox>,
    events: EventChannel,
    tx: mpsc::WeakUnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    subscriptions: Vec<SubscriptionId>,
}

impl WorkspaceServer {
    pub fn new(
        state: WorkspaceState,
        remote: Arc<dyn RemoteSnippets>,
        sandbox: Arc<dyn Sandbox>,
        events: EventChannel,
    ) -> (Self, WorkspaceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let weak = tx.downgrade();

        let forward = weak.clone();
        let subscriptions = events.subscribe_all(move |report| {
            if let Some(tx) = forward.upgrade() {
                let _ = tx.send(Message::Sandbox(report.clone()));
            }
        });

        let server = Self {
            state,
            remote,
            sandbox,
            events,
            tx: weak,
            rx,
            subscriptions,
        };
        (server, WorkspaceHandle { tx })
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Start the workspace and process messages until stopped
    pub async fn run(mut self) {
        let effects = self.state.start();
        self.perform(effects);

        loop {
            let deadline = self.state.next_deadline();
            tokio::select! {
                biased;
                message = self.rx.recv() => {
                    let Some(message) = message else { break };
                    if !self.handle(message) {
                        break;
                    }
                }
                _ = sleep_until(deadline) => {
                    let effects = self.state.poll(Instant::now());
                    self.perform(effects);
                }
            }
        }

        for id in self.subscriptions.drain(..) {
            self.events.unsubscribe(id);
        }
        tracing::debug!("workspace server stopped");
    }

    /// Returns false when the server should stop
    fn handle(&mut self, message: Message) -> bool {
        let effects = match message {
            Message::Command(command) => match command {
                Command::EditCode(code) => {
                    self.state.edit_code(code, Instant::now());
                    Vec::new()
                }
                Command::EditMarkup(markup) => {
                    self.state.edit_markup(markup);
                    Vec::new()
                }
                Command::EditManifest(manifest_json) => {
                    self.state.edit_manifest(manifest_json);
                    Vec::new()
                }
                Command::Bundle => self.state.request_bundle(),
                Command::Save(visibility) => self.state.save(visibility),
                Command::ToggleAutorun => {
                    let on = self.state.toggle_autorun();
                    tracing::info!(autorun = on, "autorun toggled");
                    Vec::new()
                }
                Command::Reset => self.state.reset(),
                Command::Snapshot(reply) => {
                    let _ = reply.send(self.state.snapshot());
                    Vec::new()
                }
                Command::Shutdown => return false,
            },
            Message::Sandbox(report) => self.state.on_sandbox_event(report, Instant::now()),
            Message::Fetched(result) => self.state.on_fetched(result),
            Message::Synced(result) => {
                if let SyncOutcome::Saved { id, revision, .. } = self.state.on_synced(result) {
                    tracing::info!(%id, %revision, "snippet saved");
                }
                Vec::new()
            }
        };
        self.perform(effects);
        true
    }

    fn perform(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Execute { build, bundle } => {
                    self.sandbox.execute(build, bundle, self.events.clone())
                }
                Effect::Fetch(snippet) => {
                    self.spawn_remote(self.remote.fetch(snippet), Message::Fetched);
                }
                Effect::Sync(request) => {
                    let future = match request.target {
                        SyncTarget::Create => self.remote.create(request.record, request.visibility),
                        SyncTarget::Update { id } => {
                            self.remote.update(id, request.record, request.visibility)
                        }
                    };
                    self.spawn_remote(future, Message::Synced);
                }
                Effect::Deauthorize => self.remote.deauthorize(),
            }
        }
    }

    fn spawn_remote<T: Send + 'static>(
        &self,
        future: RemoteFuture<T>,
        into_message: fn(Result<T, RemoteError>) -> Message,
    ) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = future.await;
            match tx.upgrade() {
                Some(tx) => {
                    let _ = tx.send(into_message(result));
                }
                None => tracing::debug!("workspace stopped, dropping remote result"),
            }
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
