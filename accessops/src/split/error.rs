use thiserror::Error;

use super::copier::CopyError;
use super::SplitPhase;

#[derive(Debug, Error)]
pub enum Error {
    /// Pre-validation failed; nothing was touched.
    #[error("{0}")]
    InvalidArgument(String),

    /// The instance is not in a state a split can start from; nothing
    /// was touched.
    #[error("{0}")]
    InvalidState(String),

    /// A phase failed. State up to that phase is in place; the operator
    /// resumes or unwinds manually from the named phase.
    #[error("split failed while {phase}: {source}")]
    Phase {
        phase: SplitPhase,
        #[source]
        source: StepError,
    },
}

impl Error {
    pub fn phase(&self) -> Option<SplitPhase> {
        match self {
            Error::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("{0}")]
    Lifecycle(#[from] crate::lifecycle::Error),

    #[error("{0}")]
    Orchestrator(#[from] crate::orchestrator::Error),

    #[error("{0}")]
    Storage(#[from] crate::storage::Error),

    #[error("{0}")]
    Registry(#[from] crate::registry::Error),

    #[error("{0}")]
    Client(#[from] crate::clients::Error),

    #[error("{0}")]
    Sharding(#[from] crate::sharding::Error),

    #[error("{0}")]
    Copy(#[from] CopyError),

    #[error("{0}")]
    Url(#[from] url::ParseError),
}
