use thiserror::Error;

use super::NodeKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("JSON path '{path}' doesn't exist in {kind} node template")]
    MissingPath { kind: NodeKind, path: String },

    #[error("{0} node template is not a JSON object")]
    NotAnObject(NodeKind),

    #[error("{0}")]
    Serialize(#[from] serde_json::Error),
}
