use thiserror::Error;

use super::{DataElement, OperationKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("shard group list for {0} is empty")]
    NoRanges(DataElement),

    #[error("shard group list for {element} contains duplicate hash range start value {start}.")]
    DuplicateRangeStart { element: DataElement, start: i32 },

    #[error("first hash range for {0} must start at {min}", min = i32::MIN)]
    MissingMinimumRangeStart(DataElement),

    #[error("{element} must have exactly one hash range, got {count}")]
    SingleRangeRequired { element: DataElement, count: usize },

    #[error("configuration already contains an entry for ({element}, {operation}, {start})")]
    DuplicateEntry {
        element: DataElement,
        operation: OperationKind,
        start: i32,
    },

    #[error("configuration already contains an entry with id {0}")]
    DuplicateEntryId(u64),

    #[error("no shard group for {element} with hash range start {start}")]
    UnknownRangeStart { element: DataElement, start: i32 },
}
