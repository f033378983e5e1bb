//! Error types for the authorization engine

use thiserror::Error;

/// A fetcher body reported failure; aborts the whole `authorize` call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Fetcher '{fetcher}' failed to compute '{attribute}': {reason}")]
pub struct FetchFailure {
    /// Id of the fetcher that failed
    pub fetcher: String,

    /// Context attribute the fetcher was computing
    pub attribute: String,

    /// Reason reported by the fetcher body
    pub reason: String,
}

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Context building failed before any rule ran
    #[error(transparent)]
    Fetch(#[from] FetchFailure),

    /// Two rules share an id
    #[error("Duplicate rule id: {0}")]
    DuplicateRuleId(String),

    /// Two fetchers share an id
    #[error("Duplicate fetcher id: {0}")]
    DuplicateFetcherId(String),

    /// The same binding name is produced by more than one matcher slot
    #[error("Binding '{binding}' is bound more than once in '{definition}'")]
    DuplicateBinding {
        /// Rule or fetcher id
        definition: String,
        /// Colliding binding name
        binding: String,
    },

    /// Malformed rule or fetcher definition
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthzError {
    /// Returns the fetch failure if this error aborted an `authorize` call
    pub fn as_fetch_failure(&self) -> Option<&FetchFailure> {
        match self {
            AuthzError::Fetch(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
