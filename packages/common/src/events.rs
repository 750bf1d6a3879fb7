//! # Sandbox Event Channel
//!
//! Process-local publish/subscribe bus. The execution sandbox is a sibling of
//! the build coordinator, not a child, so it reports its lifecycle here
//! instead of holding a reference back into the coordinator.
//!
//! Every event is published inside a [`SandboxReport`] tagged with the build
//! it belongs to, so a subscriber can tell a late report from an abandoned
//! build apart from one for the build it is waiting on.
//!
//! Delivery is synchronous and in subscription order. Handlers are
//! snapshotted before a pass starts, so subscribing or unsubscribing from
//! inside a handler is safe and only affects later passes.

use crate::ErrorInfo;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Module discovered by the sandbox while running a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRef {
    pub name: String,
    pub version: String,
}

impl ModuleRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Start,
    Error,
    End,
    Dependencies,
}

impl Topic {
    pub const ALL: [Topic; 4] = [Topic::Start, Topic::Error, Topic::End, Topic::Dependencies];
}

#[derive(Debug, Clone, PartialEq)]
pub enum SandboxEvent {
    /// Sandbox acknowledged a new bundle
    Start,
    /// Execution failed; ends the build
    Error(ErrorInfo),
    /// Execution finished; ends the build
    End,
    /// Modules the bundle actually used
    Dependencies(Vec<ModuleRef>),
}

impl SandboxEvent {
    pub fn topic(&self) -> Topic {
        match self {
            SandboxEvent::Start => Topic::Start,
            SandboxEvent::Error(_) => Topic::Error,
            SandboxEvent::End => Topic::End,
            SandboxEvent::Dependencies(_) => Topic::Dependencies,
        }
    }
}

/// Sequence number of a bundle handed to the sandbox
pub type BuildId = u64;

/// A sandbox event and the build that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxReport {
    pub build: BuildId,
    pub event: SandboxEvent,
}

impl SandboxReport {
    pub fn new(build: BuildId, event: SandboxEvent) -> Self {
        Self { build, event }
    }

    pub fn topic(&self) -> Topic {
        self.event.topic()
    }
}

pub type SubscriptionId = u64;

type Handler = Arc<dyn Fn(&SandboxReport) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    topic: Topic,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: SubscriptionId,
    subscribers: Vec<Subscriber>,
}

/// Cloneable handle to a shared bus
#[derive(Clone, Default)]
pub struct EventChannel {
    registry: Arc<Mutex<Registry>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&SandboxReport) + Send + Sync + 'static,
    {
        self.register(topic, Arc::new(handler))
    }

    /// Subscribe one handler to every topic
    pub fn subscribe_all<F>(&self, handler: F) -> Vec<SubscriptionId>
    where
        F: Fn(&SandboxReport) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        Topic::ALL
            .iter()
            .map(|topic| self.register(*topic, Arc::clone(&handler)))
            .collect()
    }

    /// Returns false when the id was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.lock();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|s| s.id != id);
        registry.subscribers.len() != before
    }

    /// Deliver `report` to every current subscriber of its topic.
    ///
    /// Returns the number of handlers invoked.
    pub fn publish(&self, report: &SandboxReport) -> usize {
        let topic = report.topic();
        let handlers: Vec<Handler> = self
            .lock()
            .subscribers
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| Arc::clone(&s.handler))
            .collect();

        tracing::trace!(
            ?topic,
            build = report.build,
            subscribers = handlers.len(),
            "publishing sandbox event"
        );

        for handler in &handlers {
            handler(report);
        }
        handlers.len()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|s| s.topic == topic)
            .count()
    }

    fn register(&self, topic: Topic, handler: Handler) -> SubscriptionId {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.subscribers.push(Subscriber { id, topic, handler });
        id
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // Handlers run outside the lock, so a poisoned registry is still consistent
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("subscribers", &self.lock().subscribers.len())
            .finish()
    }
}
