//! Runner timing configuration

use std::time::Duration;

/// Timing for the staged analysis sequence.
///
/// `start_delay` is the deferred gap between upload acceptance and the
/// first stage; `step_delay` separates consecutive stages.
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    pub start_delay: Duration,
    pub step_delay: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_millis(1000),
            step_delay: Duration::from_millis(3000),
        }
    }
}

impl RunnerConfig {
    /// Read `ANALYSIS_START_DELAY_MS` / `ANALYSIS_STEP_DELAY_MS`, falling
    /// back to the defaults.
    pub fn from_env() -> Self {
        let millis = |var: &str, default: Duration| {
            std::env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        let defaults = Self::default();
        Self {
            start_delay: millis("ANALYSIS_START_DELAY_MS", defaults.start_delay),
            step_delay: millis("ANALYSIS_STEP_DELAY_MS", defaults.step_delay),
        }
    }
}
