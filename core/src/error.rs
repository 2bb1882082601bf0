//! Error types for the Frappe REST client.
//!
//! # Design
//! Every non-2xx response lands in `Http` with the raw status code and body
//! text; the caller decides whether that text is a JSON error envelope. A 404
//! is not special-cased into its own variant, `is_not_found` answers that
//! question instead.

use thiserror::Error;

use crate::http::TransportError;

/// Errors returned by `FrappeClient`, the resource facade and `Session`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The transport failed before a response was received.
    #[error("transport failed: {0}")]
    Transport(#[source] TransportError),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// The client was configured without a base URL.
    #[error("server URL not provided")]
    MissingBaseUrl,

    /// A login was attempted with neither a token pair nor a username/password pair.
    #[error("provide either (username and password) or (api key and api secret)")]
    MissingCredentials,

    /// A token login was attempted on a session that cannot swap credentials.
    #[error("dynamic authentication is not enabled")]
    DynamicAuthDisabled,

    /// A cache invalidation pattern failed to compile.
    #[error("invalid invalidation pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A required environment variable is unset.
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
}

impl ApiError {
    /// HTTP status of the failed response, if the failure came from the server.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_displays_status_and_body() {
        let err = ApiError::Http {
            status: 404,
            body: "Not Found".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 404: Not Found");
        assert_eq!(err.status(), Some(404));
        assert!(err.is_not_found());
    }

    #[test]
    fn non_http_errors_have_no_status() {
        assert_eq!(ApiError::MissingBaseUrl.status(), None);
        assert!(!ApiError::MissingCredentials.is_not_found());
    }
}
