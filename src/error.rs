//! Unified error type.

/// The error type returned by layover's fallible operations.
///
/// Application-level errors (404, 401, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. Metric reads and
/// writes never fail. This type surfaces infrastructure failures (binding a
/// port, accepting a connection) and configuration rejected at construction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// A background task was requested outside of a tokio runtime.
    #[error("no tokio runtime available to spawn background task")]
    NoRuntime,
}
