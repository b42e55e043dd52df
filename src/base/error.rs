use thiserror::Error;

/// Errors raised at the fallible edges of the crate.
///
/// Extraction, qualification and decoration are infallible by contract: they
/// degrade to "no identifier" or "do not decorate". `GlueError` only covers
/// construction and configuration.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum GlueError {
    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
    #[error("Failed to read configuration {path}: {message}")]
    ConfigRead { path: String, message: String },
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },
    #[error("Link watcher is no longer running")]
    WatcherClosed,
}

impl GlueError {
    pub fn invalid_url(url: impl Into<String>) -> Self {
        GlueError::InvalidUrl { url: url.into() }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        GlueError::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn config_read(path: impl Into<String>, message: impl Into<String>) -> Self {
        GlueError::ConfigRead {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the error comes from loading or validating configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            GlueError::InvalidConfig { .. }
                | GlueError::ConfigRead { .. }
                | GlueError::ConfigParse { .. }
        )
    }
}

impl From<serde_json::Error> for GlueError {
    fn from(err: serde_json::Error) -> Self {
        GlueError::ConfigParse {
            message: err.to_string(),
        }
    }
}
