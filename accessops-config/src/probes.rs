use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Startup probe and shutdown tuning for launched nodes. The availability
/// and scale-down wait timeouts are derived from these.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Probes {
    /// HTTP path the orchestrator probes to decide a node is up.
    #[serde(default = "Probes::startup_probe_path")]
    pub startup_probe_path: String,
    /// Seconds between startup probe attempts.
    #[serde(default = "Probes::startup_probe_period")]
    pub startup_probe_period: u32,
    /// Startup probe failures tolerated before the pod is restarted.
    #[serde(default = "Probes::startup_probe_failure_threshold")]
    pub startup_probe_failure_threshold: u32,
    /// Seconds a pod is given to shut down cleanly.
    #[serde(default = "Probes::termination_grace_period")]
    pub termination_grace_period: u32,
    /// Extra milliseconds allowed past the grace period when waiting for scale-down.
    #[serde(default = "Probes::scale_down_timeout_buffer")]
    pub scale_down_timeout_buffer: u64,
}

impl Probes {
    fn startup_probe_path() -> String {
        "/api/v1/status".into()
    }

    fn startup_probe_period() -> u32 {
        10
    }

    fn startup_probe_failure_threshold() -> u32 {
        6
    }

    fn termination_grace_period() -> u32 {
        60
    }

    fn scale_down_timeout_buffer() -> u64 {
        1_000
    }

    /// Longest a deployment may take to report available before
    /// the startup probe would have killed the pod anyway.
    pub fn availability_timeout(&self) -> Duration {
        Duration::from_millis(
            (self.startup_probe_failure_threshold as u64 + 1)
                * self.startup_probe_period as u64
                * 1_000,
        )
    }

    /// Longest a scale-down may take before something is wrong.
    pub fn scale_down_timeout(&self) -> Duration {
        Duration::from_millis(
            self.termination_grace_period as u64 * 1_000 + self.scale_down_timeout_buffer,
        )
    }
}

impl Default for Probes {
    fn default() -> Self {
        Self {
            startup_probe_path: Self::startup_probe_path(),
            startup_probe_period: Self::startup_probe_period(),
            startup_probe_failure_threshold: Self::startup_probe_failure_threshold(),
            termination_grace_period: Self::termination_grace_period(),
            scale_down_timeout_buffer: Self::scale_down_timeout_buffer(),
        }
    }
}
