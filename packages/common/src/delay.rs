//! # Cancellable Delays
//!
//! A `Delay` is one debounce site: at most one pending payload with a
//! deadline. Re-arming supersedes the previous payload, so a burst of events
//! fires at most once. Owners never spawn timers; instead their event loop
//! sleeps until the earliest `deadline()` and then calls `take_due(now)`.

use std::time::Duration;

/// Clock used by every delay; pausable under tokio's test utilities
pub use tokio::time::Instant;

#[derive(Debug)]
pub struct Delay<T> {
    pending: Option<(Instant, T)>,
}

impl<T> Delay<T> {
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Schedule `payload` to become due `after` from `now`, replacing
    /// anything still pending.
    pub fn arm(&mut self, now: Instant, after: Duration, payload: T) {
        self.pending = Some((now + after, payload));
    }

    /// Drop the pending payload, if any
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(_, payload)| payload)
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(at, _)| *at)
    }

    /// Take the payload once its deadline has been reached
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((at, _)) if *at <= now => self.cancel(),
            _ => None,
        }
    }
}

impl<T> Default for Delay<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Earliest of several optional deadlines
pub fn earliest<I>(deadlines: I) -> Option<Instant>
where
    I: IntoIterator<Item = Option<Instant>>,
{
    deadlines.into_iter().flatten().min()
}
