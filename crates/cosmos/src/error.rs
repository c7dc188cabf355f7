//! Common error types for cosmos components.

use thiserror::Error;

/// Common error type for cosmos operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Error raised by a lower layer, prefixed with what was being attempted
    #[error("{message}: {source}")]
    Context {
        message: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    /// Wrap `source` with a short description of the failed step.
    pub fn context<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Context {
            message: message.into(),
            source: Box::new(source),
        }
    }
}

/// Result type alias using cosmos Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prefixes_source_message() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::context("failed to open model", io);
        assert_eq!(err.to_string(), "failed to open model: no such file");
    }

    #[test]
    fn config_errors_name_the_problem() {
        let err = Error::Config("invalid address '0.0.0.0:x'".to_string());
        assert_eq!(err.to_string(), "configuration error: invalid address '0.0.0.0:x'");
    }

    #[test]
    fn io_errors_convert() {
        let err: Error = std::io::Error::other("disk full").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
