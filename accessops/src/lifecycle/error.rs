use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Orchestrator(#[from] crate::orchestrator::Error),

    #[error("{0}")]
    Storage(#[from] crate::storage::Error),

    #[error("{0}")]
    Template(#[from] crate::template::Error),

    #[error("{0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Tear-down paths treat missing resources as already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Orchestrator(err) if err.is_not_found())
    }
}
