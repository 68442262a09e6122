//! Errors surfaced to SDK callers.

use crate::node_api::NodeError;

pub type SdkResult<T, E = SdkError> = Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("A session is already connected in this process")]
    AlreadyConnected,

    #[error("Not connected - call connect() or start() first")]
    NotConnected,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Generic: {0}")]
    Generic(String),
}

impl From<NodeError> for SdkError {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::Connection(msg) => SdkError::Connection(msg),
            NodeError::Auth(msg) => SdkError::Auth(msg),
            NodeError::NodeNotFound(node_id) => {
                SdkError::Connection(format!("node {node_id} not found"))
            }
            NodeError::Generic(msg) => SdkError::Generic(msg),
        }
    }
}

impl From<std::io::Error> for SdkError {
    fn from(err: std::io::Error) -> Self {
        SdkError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Persistence(err.to_string())
    }
}
