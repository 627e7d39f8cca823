use thiserror::Error;

/// A remote call failed outright.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transport: {0}")]
pub struct TransportError(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} not present")]
    NotFound(String),

    #[error("{what} failed with status {status}")]
    Internal { what: String, status: u16 },

    #[error("{what} returned unexpected status {status}")]
    UnexpectedStatus { what: String, status: u16 },

    #[error("unparsable response from {what}: {message}")]
    BadResponse { what: String, message: String },

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Url(#[from] url::ParseError),

    #[error("event store: {0}")]
    EventStore(String),
}
