//! Error types for the cache engine

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache engine
///
/// A cache miss is *not* an error; lookups report it through
/// [`crate::store::Lookup`].
#[derive(Error, Debug)]
pub enum Error {
    /// Shared tier unreachable or failing (transient)
    #[error("Shared tier backend error: {0}")]
    Backend(String),

    /// Argument hashing failed; a degraded fallback key was used
    #[error("Key serialization failed: {0}")]
    Serialization(String),

    /// Invalid threshold/interval supplied at construction
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload could not be encoded/decoded
    #[error("Value codec error: {0}")]
    ValueCodec(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the error is a transient shared-tier failure
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Backend(_))
    }
}

// =============================================================================
// Tests
// =============================================================================
