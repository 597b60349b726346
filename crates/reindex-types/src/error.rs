//! Error types shared by the reindexer crates.

use thiserror::Error;

/// Errors raised while building requests or loading settings.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A document path could not be parsed
    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TypesError::Config("missing url".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing url");

        let err = TypesError::InvalidPath("$.".to_string());
        assert_eq!(err.to_string(), "Invalid document path: $.");
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<i32>("nope").unwrap_err();
        let err: TypesError = json_err.into();
        assert!(matches!(err, TypesError::Serialization(_)));
    }
}
