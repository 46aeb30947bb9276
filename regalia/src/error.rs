//! Error types for Regalia operations

use thiserror::Error;

/// The specific rule a proposed value failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    /// Nothing left after stripping colors and whitespace
    #[error("value is empty")]
    Empty,

    #[error("too short: {actual} characters, minimum is {min}")]
    TooShort { min: usize, actual: usize },

    #[error("too long: {actual} characters, maximum is {max}")]
    TooLong { max: usize, actual: usize },

    #[error("character {0:?} is not allowed")]
    InvalidCharacter(char),

    /// Matched an entry of the configured forbidden-word list
    #[error("contains forbidden word {0:?}")]
    ForbiddenWord(String),

    /// Matched the built-in profanity denylist
    #[error("contains profanity {0:?}")]
    Profanity(String),

    #[error("invalid color {0:?}")]
    InvalidColor(String),

    /// Referenced catalog entry does not exist
    #[error("unknown style {0:?}")]
    UnknownStyle(String),
}

/// Regalia error types
#[derive(Debug, Error)]
pub enum RegaliaError {
    /// Color specification could not be parsed
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    /// Proposed value failed validation
    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationFailure),

    /// Durable store could not be reached or rejected the operation
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Permission backend could not be queried
    #[error("Permission service unavailable: {0}")]
    PermissionServiceUnavailable(String),

    /// A pre-commit hook rejected the change
    #[error("Vetoed by hook: {0}")]
    VetoedByHook(String),

    /// Tier does not grant the requested capability
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (JSON, YAML)
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type for Regalia operations
pub type Result<T> = std::result::Result<T, RegaliaError>;

impl RegaliaError {
    /// Check if the error is an expected rejection of a user-initiated change
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed(_)
                | Self::VetoedByHook(_)
                | Self::PermissionDenied(_)
                | Self::InvalidColor(_)
        )
    }

    /// Check if retrying the operation later may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::PermissionServiceUnavailable(_) | Self::Io(_)
        )
    }
}

impl From<serde_json::Error> for RegaliaError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for RegaliaError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
