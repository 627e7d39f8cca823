use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Settings that apply to the control plane itself,
/// or to every node it launches.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct General {
    /// Orchestrator namespace all resources are created in.
    #[serde(default = "General::namespace")]
    pub namespace: String,
    /// Port every launched node listens on inside its pod.
    #[serde(default = "General::pod_port")]
    pub pod_port: u16,
    /// Minimum log level passed to launched nodes.
    #[serde(default)]
    pub minimum_log_level: LogLevel,
    /// Prefix for persistent storage instance names.
    #[serde(default = "General::storage_name_prefix")]
    pub storage_name_prefix: String,
    /// How often deployment/service wait loops poll the orchestrator, in milliseconds.
    #[serde(default = "General::deployment_wait_poll_interval")]
    pub deployment_wait_poll_interval: u64,
    /// How often coordinator replicas re-read the shard configuration, in milliseconds.
    #[serde(default = "General::coordinator_refresh_interval")]
    pub coordinator_refresh_interval: u64,
    /// Extra time to wait on top of the refresh interval before trusting
    /// that every coordinator replica has seen a configuration change, in milliseconds.
    #[serde(default = "General::coordinator_refresh_buffer")]
    pub coordinator_refresh_buffer: u64,
}

impl General {
    fn namespace() -> String {
        "default".into()
    }

    fn pod_port() -> u16 {
        5000
    }

    fn storage_name_prefix() -> String {
        "applicationaccesstest".into()
    }

    fn deployment_wait_poll_interval() -> u64 {
        100
    }

    fn coordinator_refresh_interval() -> u64 {
        10_000
    }

    fn coordinator_refresh_buffer() -> u64 {
        1_000
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.deployment_wait_poll_interval)
    }

    /// Time to sleep after a configuration write before every
    /// coordinator replica is guaranteed to have refreshed.
    pub fn refresh_window(&self) -> Duration {
        Duration::from_millis(self.coordinator_refresh_interval + self.coordinator_refresh_buffer)
    }
}

impl Default for General {
    fn default() -> Self {
        Self {
            namespace: Self::namespace(),
            pod_port: Self::pod_port(),
            minimum_log_level: LogLevel::default(),
            storage_name_prefix: Self::storage_name_prefix(),
            deployment_wait_poll_interval: Self::deployment_wait_poll_interval(),
            coordinator_refresh_interval: Self::coordinator_refresh_interval(),
            coordinator_refresh_buffer: Self::coordinator_refresh_buffer(),
        }
    }
}

/// Log level passed to launched nodes via `MINIMUM_LOG_LEVEL`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Information,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "Debug",
            LogLevel::Information => "Information",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
            LogLevel::Critical => "Critical",
        };
        write!(f, "{}", name)
    }
}
