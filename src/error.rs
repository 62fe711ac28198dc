//! Error types for the Firefly client.
//!
//! Every call fails independently; nothing here is retried internally.
//! [`FireflyError::is_transient`] lets callers decide for themselves.

use std::path::PathBuf;
use thiserror::Error;

/// Which catalog an unknown option name was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// An image style (text-to-image).
    Style,
    /// A text-effect preset (glyph-to-image).
    Preset,
    /// A text font.
    Font,
}

impl std::fmt::Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Style => write!(f, "style"),
            Self::Preset => write!(f, "preset"),
            Self::Font => write!(f, "font"),
        }
    }
}

/// Errors that can occur while talking to the image service.
#[derive(Error, Debug)]
pub enum FireflyError {
    /// The bearer credential was rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A style or preset name is not in the catalog.
    #[error("unknown {kind} '{name}'")]
    InvalidOption {
        /// Catalog the name was looked up in.
        kind: OptionKind,
        /// The name as given by the caller.
        name: String,
    },

    /// The service answered with a non-success status.
    #[error("service returned error status {status}: {message}")]
    Remote {
        /// HTTP status code returned.
        status: u16,
        /// Response body content, truncated.
        message: String,
    },

    /// The response could not be identified as an image.
    #[error("failed to decode image payload: {0}")]
    Decode(String),

    /// Network or transport failure.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(#[from] reqwest::Error),

    /// The call was rejected locally before any request was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The session's TTL has elapsed.
    #[error("session expired - create a new one with `create_session`")]
    SessionExpired,

    /// The service answered successfully but not in the expected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read a configuration file.
    #[error("failed to read config file '{path}': {source}")]
    ConfigRead {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a configuration file.
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl FireflyError {
    /// Builds an error from a non-success status and response body.
    ///
    /// 401 and 403 map to [`FireflyError::Authentication`].
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = truncate(body, 500);
        match status {
            401 | 403 => Self::Authentication(if message.is_empty() {
                "bearer token is invalid".to_string()
            } else {
                message
            }),
            _ => Self::Remote { status, message },
        }
    }

    /// Returns true if the failure is likely transient and a caller retry may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ServiceUnavailable(_) => true,
            Self::Remote { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns the HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            Self::ServiceUnavailable(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Result type alias for Firefly operations.
pub type Result<T> = std::result::Result<T, FireflyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_auth() {
        assert!(matches!(
            FireflyError::from_status(401, ""),
            FireflyError::Authentication(_)
        ));
        assert!(matches!(
            FireflyError::from_status(403, "forbidden"),
            FireflyError::Authentication(msg) if msg == "forbidden"
        ));
    }

    #[test]
    fn test_from_status_remote_truncates() {
        let body = "x".repeat(800);
        match FireflyError::from_status(500, &body) {
            FireflyError::Remote { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message.len(), 503);
                assert!(message.ends_with("..."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_is_transient() {
        assert!(FireflyError::from_status(503, "").is_transient());
        assert!(FireflyError::from_status(429, "").is_transient());
        assert!(!FireflyError::from_status(400, "").is_transient());
        assert!(!FireflyError::SessionExpired.is_transient());
        assert!(!FireflyError::Decode("bad".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = FireflyError::InvalidOption {
            kind: OptionKind::Style,
            name: "Neon".into(),
        };
        assert_eq!(err.to_string(), "unknown style 'Neon'");

        let err = FireflyError::Remote {
            status: 404,
            message: "Not found".into(),
        };
        assert_eq!(err.to_string(), "service returned error status 404: Not found");
    }
}
