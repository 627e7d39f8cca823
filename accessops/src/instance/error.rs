use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Parameter validation. Raised before any side effect.
    #[error("{0}")]
    InvalidArgument(String),

    /// Instance configuration preconditions violated. Raised before any
    /// side effect.
    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Sharding(#[from] crate::sharding::Error),

    #[error("{0}")]
    Lifecycle(#[from] crate::lifecycle::Error),

    #[error("{0}")]
    Orchestrator(#[from] crate::orchestrator::Error),

    #[error("{0}")]
    Storage(#[from] crate::storage::Error),

    #[error("{0}")]
    Registry(#[from] crate::registry::Error),

    #[error("{0}")]
    Split(#[from] crate::split::Error),

    #[error("{0}")]
    Url(#[from] url::ParseError),
}
