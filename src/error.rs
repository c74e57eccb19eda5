use thiserror::Error;

/// Error types for GeoWatch
#[derive(Debug, Error)]
pub enum GeoWatchError {
    /// Key rejected by validation
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// Location rejected by validation
    #[error("invalid location: {0}")]
    InvalidLocation(String),
    /// Geohash string rejected by validation
    #[error("invalid geohash: {0}")]
    InvalidGeohash(String),
    /// Query criteria rejected by validation
    #[error("invalid query criteria: {0}")]
    InvalidCriteria(String),
    /// Internal bookkeeping violated an invariant; indicates a bug
    #[error("internal state error: {0}")]
    InternalState(String),
    /// Error surfaced unchanged from the underlying datastore
    #[error("datastore error: {0}")]
    Store(String),
    /// Lock acquisition failed
    #[error("failed to acquire lock")]
    Lock,
}

/// Result type alias for GeoWatch operations
pub type Result<T> = std::result::Result<T, GeoWatchError>;
