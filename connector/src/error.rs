use interop_types::hash::H256;

/// Errors surfaced by the connector. Fatal variants make the connector
/// refuse to run; everything else is logged and retried on the next block.
#[derive(thiserror::Error, Debug)]
pub enum ConnectorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("store error: {0}")]
    Store(#[from] sled::Error),

    #[error("persisted record is corrupted: {0}")]
    Corrupted(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed")]
    Closed,

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("transaction {id} rejected: {message}")]
    Rejected { id: H256, message: String },
}

impl ConnectorError {
    /// Whether the error must be surfaced to the host instead of retried.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConnectorError::Config(_)
                | ConnectorError::Key(_)
                | ConnectorError::Store(_)
                | ConnectorError::Corrupted(_)
        )
    }
}

impl From<std::io::Error> for ConnectorError {
    fn from(err: std::io::Error) -> Self {
        ConnectorError::Transport(err.to_string())
    }
}

impl From<jsonrpsee::core::client::Error> for ConnectorError {
    fn from(err: jsonrpsee::core::client::Error) -> Self {
        match err {
            jsonrpsee::core::client::Error::Call(call) => ConnectorError::Rpc {
                code: i64::from(call.code()),
                message: call.message().to_string(),
            },
            other => ConnectorError::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        ConnectorError::Decode(err.to_string())
    }
}
