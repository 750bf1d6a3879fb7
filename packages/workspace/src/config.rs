use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Debounce and delay settings, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timings {
    /// Quiet period before a transpilation error becomes visible
    pub error_display_delay_ms: u64,
    /// How long a build may run before the progress indicator appears
    pub progress_delay_ms: u64,
    /// Quiet period after a code edit before autorun rebuilds
    pub autorun_delay_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            error_display_delay_ms: 1000,
            progress_delay_ms: 100,
            autorun_delay_ms: 1000,
        }
    }
}

impl Timings {
    pub fn error_display_delay(&self) -> Duration {
        Duration::from_millis(self.error_display_delay_ms)
    }

    pub fn progress_delay(&self) -> Duration {
        Duration::from_millis(self.progress_delay_ms)
    }

    pub fn autorun_delay(&self) -> Duration {
        Duration::from_millis(self.autorun_delay_ms)
    }
}
