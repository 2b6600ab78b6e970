//! Crate-level error type for configuration and construction

use thiserror::Error;

/// Errors raised while loading configuration or assembling a binder
///
/// Request-time failures are [`ApiError`](crate::handlers::ApiError)s.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Configuration loaded but holds unusable values
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `build()` was called without a model
    #[error("A model is required to build a resource binder")]
    MissingModel,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::MissingModel.to_string(),
            "A model is required to build a resource binder"
        );
        assert_eq!(
            Error::InvalidConfig("page_size".to_string()).to_string(),
            "Invalid configuration: page_size"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
