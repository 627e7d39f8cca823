use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("creating storage \"{name}\": {message}")]
    Create { name: String, message: String },

    #[error("dropping storage \"{name}\": {message}")]
    Drop { name: String, message: String },
}
