use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("a shard configuration set already exists")]
    AlreadyExists,

    #[error("no shard configuration set has been persisted")]
    NotFound,

    #[error("shard configuration persistence: {0}")]
    Persistence(String),
}
