use thiserror::Error;

/// error taxonomy for the extraction pipeline. per-file failures are not
/// errors (they become null entries in the detail map); everything here
/// propagates to the calling entry point.
#[derive(Debug, Error)]
pub enum ExtentError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsupported identifier '{0}'. check for typos, or list supported repositories with --providers")]
    UnsupportedIdentifier(String),

    #[error("{provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("{provider}: record is not open access: {message}")]
    AccessDenied { provider: String, message: String },

    #[error("network failure after retries: {0}")]
    TransientNetwork(String),

    #[error("extraction failed for {path}: {message}")]
    Extraction { path: String, message: String },

    #[error("bounding box could not be transformed to EPSG:4326: {0}")]
    CrsTransform(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ExtentError {
    pub fn provider(name: &str, message: impl std::fmt::Display) -> ExtentError {
        ExtentError::Provider {
            provider: String::from(name),
            message: message.to_string(),
        }
    }

    pub fn access_denied(name: &str, message: impl std::fmt::Display) -> ExtentError {
        ExtentError::AccessDenied {
            provider: String::from(name),
            message: message.to_string(),
        }
    }

    pub fn extraction(path: impl std::fmt::Display, message: impl std::fmt::Display) -> ExtentError {
        ExtentError::Extraction {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtentError>;
