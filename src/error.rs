//! Error types for the scrape-proxy-pool crate.

use thiserror::Error;

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a single fetch through a proxy did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// A response arrived but its status is not in the valid-status list.
    #[error("disallowed status {0}")]
    Status(u16),

    /// The request did not complete within the configured timeout.
    #[error("timed out")]
    Timeout,

    /// The proxy could not be reached.
    #[error("connect error: {0}")]
    Connect(String),

    /// Any other transport level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request was aborted while in flight.
    #[error("cancelled")]
    Cancelled,
}

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("invalid table identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Unified error type for the pool.
#[derive(Debug, Error)]
pub enum Error {
    /// No working proxy exists even after a refresh attempt.
    #[error("no working proxy available in pool")]
    PoolExhausted,

    /// One attempt through one proxy failed; the proxy has been relabeled.
    #[error("fetch through proxy {proxy} failed: {cause}")]
    FetchFailed { proxy: String, cause: FetchFailure },

    #[error("giving up on {url} after {attempts} attempts")]
    RetryExhausted { url: String, attempts: usize },

    /// No proxies in any partition when the working pool is first built.
    #[error("no unchecked, not-working or working proxies exist")]
    FatalPoolMisconfiguration,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid css selector: {0}")]
    InvalidSelector(String),

    #[error("failed to load seed source {source_name}: {message}")]
    SeedSource { source_name: String, message: String },

    #[error("pool is shutting down")]
    ShuttingDown,
}

impl Error {
    /// Whether the error leaves no way to make progress on further URLs.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::FatalPoolMisconfiguration | Error::Storage(_) | Error::ShuttingDown
        )
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Storage(StorageError::Sqlx(err))
    }
}
