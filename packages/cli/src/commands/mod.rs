pub mod bundle;
pub mod reset;
pub mod save;
pub mod show;
mod workspace;

pub use bundle::{bundle, BundleArgs};
pub use reset::{reset, ResetArgs};
pub use save::{save, SaveArgs};
pub use show::{show, ShowArgs};
