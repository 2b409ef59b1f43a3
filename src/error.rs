//! Error types for gridcap
//!
//! This module provides the error type hierarchy using `thiserror`,
//! split by concern so callers can match on the failure class that
//! matters to them.

use thiserror::Error;

/// The main error type for gridcap operations
#[derive(Error, Debug)]
pub enum Error {
    /// Credential resolution errors
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Session lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Remote automation endpoint errors
    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Credential resolution errors
///
/// These are configuration-class failures: they fail the affected test
/// immediately and are never retried.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// No provider matches the requested driver name
    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    /// Neither the credential file nor any candidate environment variable
    /// yielded a value
    #[error(
        "Missing credential {key:?} for provider {provider}: \
         not found in credential file, checked environment variables {candidates:?}"
    )]
    MissingCredential {
        /// Provider the credential was requested for
        provider: String,
        /// Credential key name
        key: String,
        /// Environment variables that were checked, in order
        candidates: Vec<String>,
    },

    /// A resolved value failed an allowed-value check
    #[error(
        "Invalid credential {key:?} for provider {provider}: {value:?} is not one of {allowed:?}"
    )]
    InvalidCredential {
        /// Provider the credential was requested for
        provider: String,
        /// Credential key name
        key: String,
        /// The offending value
        value: String,
        /// The values that would have been accepted
        allowed: Vec<String>,
    },

    /// Credential file exists but could not be parsed
    #[error("Malformed credential file {path}: {message}")]
    MalformedFile {
        /// Path of the offending file
        path: String,
        /// Parser diagnostic
        message: String,
    },
}

/// Resolved-configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An enumerated setting received an unrecognized value
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A key=value capability pair could not be parsed
    #[error("Invalid capability pair {0:?}: expected key=value")]
    InvalidCapabilityPair(String),

    /// A capabilities file could not be loaded
    #[error("Failed to load capabilities file {path}: {message}")]
    CapabilitiesFile {
        /// Path of the offending file
        path: String,
        /// Underlying diagnostic
        message: String,
    },
}

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Session creation failed after the bounded retry loop
    #[error("Session acquisition failed after {attempts} attempt(s): {source}")]
    AcquisitionFailed {
        /// Number of creation attempts made
        attempts: u32,
        /// The last underlying endpoint failure, verbatim
        #[source]
        source: EndpointError,
    },
}

/// Remote automation endpoint errors
///
/// Carries enough structure for the acquisition loop to classify a
/// failure as transient or fatal without string matching.
#[derive(Error, Debug)]
pub enum EndpointError {
    /// Connection-level failure (DNS, refused, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-success HTTP status
    #[error("HTTP error {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or status text
        message: String,
    },

    /// The endpoint is reachable but not yet accepting sessions
    #[error("Endpoint not ready: {0}")]
    NotReady(String),

    /// The endpoint answered with a payload we could not interpret
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The call exceeded its deadline
    #[error("Endpoint call timed out after {0}ms")]
    Timeout(u64),

    /// A session event observer rejected the command
    #[error("Observer error: {0}")]
    Observer(String),
}

impl EndpointError {
    /// HTTP status code carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            EndpointError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for EndpointError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EndpointError::Timeout(0)
        } else if let Some(status) = err.status() {
            EndpointError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            EndpointError::Network(err.to_string())
        }
    }
}

/// Result type alias for gridcap operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_display() {
        let err = CredentialError::MissingCredential {
            provider: "saucelabs".to_string(),
            key: "username".to_string(),
            candidates: vec![
                "SAUCELABS_USERNAME".to_string(),
                "SAUCE_USERNAME".to_string(),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("saucelabs"));
        assert!(text.contains("username"));
        assert!(text.contains("SAUCELABS_USERNAME"));
        assert!(text.contains("SAUCE_USERNAME"));
    }

    #[test]
    fn test_unknown_driver_display() {
        let err = CredentialError::UnknownDriver("netscape".to_string());
        assert_eq!(err.to_string(), "Unknown driver: netscape");
    }

    #[test]
    fn test_acquisition_failure_keeps_cause() {
        let err = SessionError::AcquisitionFailed {
            attempts: 3,
            source: EndpointError::Http {
                status: 503,
                message: "grid full".to_string(),
            },
        };
        let text = err.to_string();
        assert!(text.contains("3 attempt"));
        assert!(text.contains("503"));
        assert!(text.contains("grid full"));
    }

    #[test]
    fn test_endpoint_error_status() {
        let err = EndpointError::Http {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.status(), Some(401));
        assert_eq!(EndpointError::Network("reset".to_string()).status(), None);
    }

    #[test]
    fn test_invalid_configuration_display() {
        let err = ConfigError::InvalidConfiguration("unknown job auth mode: weekly".to_string());
        assert!(err.to_string().contains("weekly"));
    }
}
