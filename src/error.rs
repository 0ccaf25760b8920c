use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForwardError>;

/// Unified error type for the forwarder.
#[derive(Debug, Clone, Error)]
pub enum ForwardError {
    // Query parsing errors
    #[error("malformed DNS packet: {0}")]
    Parse(String),
    #[error("packet is a response, not a query")]
    NotAQuery,

    // Routing errors
    #[error("upstream nameservers not set")]
    NoUpstreams,
    #[error("invalid upstream resolver: {0}")]
    InvalidResolver(String),
    #[error("{0}: not supported yet")]
    UnsupportedScheme(String),

    // Upstream transport errors
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),
    #[error("dial failed: {0}")]
    Dial(String),
    #[error("DoH request failed: {0}")]
    Http(String),
    #[error("unexpected DoH content type: {0}")]
    BadContentType(String),
    #[error("response transaction id does not match query")]
    TxidMismatch,

    // Lifecycle errors
    #[error("upstream query timed out")]
    Timeout,
    #[error("query cancelled")]
    Cancelled,
    #[error("response channel closed")]
    SinkClosed,
}

impl From<std::io::Error> for ForwardError {
    fn from(err: std::io::Error) -> Self {
        ForwardError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for ForwardError {
    fn from(err: reqwest::Error) -> Self {
        ForwardError::Http(err.to_string())
    }
}
