//! Error types for Hearth

use thiserror::Error;

/// Result type alias for Hearth operations
pub type HearthResult<T> = Result<T, HearthError>;

/// Main error type for Hearth
#[derive(Error, Debug)]
pub enum HearthError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Mount error: {0}")]
    Mount(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HearthError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new mount error
    pub fn mount(msg: impl Into<String>) -> Self {
        Self::Mount(msg.into())
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            HearthError::Config(_) => "config",
            HearthError::Mount(_) => "mount",
            HearthError::Io(_) => "io",
            HearthError::Json(_) => "json",
            HearthError::Url(_) => "url",
            HearthError::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(HearthError::config("bad").category(), "config");
        assert_eq!(HearthError::mount("missing").category(), "mount");

        let url_err = url::Url::parse("not a url").unwrap_err();
        assert_eq!(HearthError::from(url_err).category(), "url");
    }

    #[test]
    fn test_error_display() {
        let err = HearthError::config("scope must be a path");
        assert_eq!(err.to_string(), "Configuration error: scope must be a path");
    }
}
