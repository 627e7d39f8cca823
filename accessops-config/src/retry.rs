use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry tuning for node admin clients and the event copy.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Retry {
    /// Attempts for a transiently failing admin request.
    #[serde(default = "Retry::admin_request_retries")]
    pub admin_request_retries: u32,
    /// Base delay between admin request retries, in milliseconds. Doubles per attempt.
    #[serde(default = "Retry::admin_retry_base_delay")]
    pub admin_retry_base_delay: u64,
    /// Times to check that the source writer is idle before the final copy batch.
    #[serde(default = "Retry::writer_idle_checks")]
    pub writer_idle_checks: u32,
    /// Delay between writer idle checks, in milliseconds.
    #[serde(default = "Retry::writer_idle_check_interval")]
    pub writer_idle_check_interval: u64,
    /// Events moved per batch during a shard group split.
    #[serde(default = "Retry::event_copy_batch_size")]
    pub event_copy_batch_size: usize,
}

impl Retry {
    fn admin_request_retries() -> u32 {
        3
    }

    fn admin_retry_base_delay() -> u64 {
        500
    }

    fn writer_idle_checks() -> u32 {
        10
    }

    fn writer_idle_check_interval() -> u64 {
        1_000
    }

    fn event_copy_batch_size() -> usize {
        1_000
    }

    pub fn admin_base_delay(&self) -> Duration {
        Duration::from_millis(self.admin_retry_base_delay)
    }

    pub fn writer_idle_interval(&self) -> Duration {
        Duration::from_millis(self.writer_idle_check_interval)
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            admin_request_retries: Self::admin_request_retries(),
            admin_retry_base_delay: Self::admin_retry_base_delay(),
            writer_idle_checks: Self::writer_idle_checks(),
            writer_idle_check_interval: Self::writer_idle_check_interval(),
            event_copy_batch_size: Self::event_copy_batch_size(),
        }
    }
}
