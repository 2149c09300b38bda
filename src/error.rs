//! Unified error type.

/// The error type returned by xpress's fallible operations.
///
/// Application-level outcomes (404, 500, etc.) are expressed as HTTP
/// responses, not as `Error`s. This type surfaces infrastructure failures
/// (binding a port, accepting a connection) and misuse of the response
/// contract.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The response was already ended; it cannot be written again.
    #[error("response already ended")]
    AlreadyEnded,

    /// A payload passed to [`Response::json`](crate::Response::json) could
    /// not be serialized.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A header value was not valid header text.
    #[error("invalid value for header `{0}`")]
    InvalidHeader(&'static str),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),
}
