use std::sync::Arc;

use thiserror::Error;

/// Result type used by fallible operations of this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the engine and its stores.
///
/// Trigger evaluation itself never fails: malformed definitions and conditions degrade to "no
/// action". Errors are only returned from configuration and storage boundaries.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Session configuration is not shaped like an engagement response.
    #[error("error parsing session configuration")]
    ConfigurationParseError,
    /// A timestamp did not match `yyyy-MM-dd'T'HH:mm:ss.SSSZ`.
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
    /// A thread panicked while holding a store lock.
    #[error("store lock is poisoned")]
    StorePoisoned,
    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),
    /// Persisted data could not be (de)serialized.
    #[error(transparent)]
    Serialization(Arc<serde_json::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(value))
    }
}
