//! Unified error type.

/// The error type returned by routekit's fallible operations.
///
/// Every variant is a startup-time failure: binding a port, registering a
/// route, pointing the dev proxy somewhere, mounting an asset tree.
/// Request-time failures (404, 500, 502, ...) are expressed as
/// [`Response`](crate::Response) values and never surface as an `Error`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    /// A pattern the router refused: bad method token, or a path that
    /// conflicts with one already registered.
    #[error("invalid route `{pattern}`: {reason}")]
    InvalidRoute { pattern: String, reason: String },

    #[error("invalid upstream address `{address}`: {reason}")]
    InvalidUpstream { address: String, reason: String },

    #[error("asset root `{0}` not found")]
    MissingAssetRoot(String),
}
