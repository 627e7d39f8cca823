//! Seams over a shard group's event log. Concrete storage drivers live
//! outside the control plane; the split protocol only needs to read,
//! bulk-persist and prune events through these traits.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;

use async_trait::async_trait;

use super::Error;
use crate::storage::Credentials;

/// One event in a shard group's event log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Position in the source log. Strictly increasing.
    pub sequence: u64,
    /// Hash of the element key the event applies to.
    pub hash_code: i32,
    pub data: serde_json::Value,
}

#[async_trait]
pub trait EventReader: Send + Sync {
    /// Events strictly after `after` (from the beginning when `None`),
    /// oldest first, at most `limit`.
    async fn read_batch(&self, after: Option<u64>, limit: usize) -> Result<Vec<Event>, Error>;
}

#[async_trait]
pub trait EventBulkPersister: Send + Sync {
    /// Idempotent: persisting an event that is already present is a no-op,
    /// so an interrupted copy can be re-driven.
    async fn persist(&self, events: &[Event]) -> Result<(), Error>;
}

#[async_trait]
pub trait EventDeleter: Send + Sync {
    /// Delete every event whose hash code falls within the range.
    async fn delete_range(&self, range: RangeInclusive<i32>) -> Result<(), Error>;
}

/// Builds event log accessors from storage credentials.
pub trait EventStoreFactory: Send + Sync {
    fn reader(&self, credentials: &Credentials) -> Arc<dyn EventReader>;

    fn bulk_persister(&self, credentials: &Credentials) -> Arc<dyn EventBulkPersister>;

    fn deleter(&self, credentials: &Credentials) -> Arc<dyn EventDeleter>;
}
