pub mod bundle;
pub mod manifest;

pub use bundle::*;
pub use manifest::*;
