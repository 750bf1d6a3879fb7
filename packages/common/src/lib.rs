//! # Nextbin Common
//!
//! Leaf types shared by every nextbin package: the error record that failures
//! are converted into, the startup query, the sandbox event channel and the
//! cancellable delay used by every debounce site.

pub mod delay;
pub mod error;
pub mod events;
pub mod query;

pub use delay::{earliest, Delay, Instant};
pub use error::{ErrorInfo, ErrorKind};
pub use events::{BuildId, EventChannel, ModuleRef, SandboxEvent, SandboxReport, SubscriptionId, Topic};
pub use query::Query;
