use thiserror::Error;

use crate::sharding::{DataElement, OperationKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("no shard configured for ({element}, {operation}, {key_hash})")]
    NoShardConfigured {
        element: DataElement,
        operation: OperationKind,
        key_hash: i32,
    },

    #[error("no shards configured for ({element}, {operation})")]
    NoShardsConfigured {
        element: DataElement,
        operation: OperationKind,
    },

    /// A downstream shard is shedding load. Passed through to the caller
    /// without retry.
    #[error("service unavailable")]
    ServiceUnavailable,

    #[error("downstream shard request failed: {0}")]
    Downstream(String),
}
