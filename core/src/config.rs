//! Client configuration.
//!
//! A `ClientOptions` value is immutable once handed to a client. Changing
//! credentials means applying a `CredentialsUpdate` to a copy and building a
//! new client from it (see `Session::update_credentials`).

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Connection and credential settings for one backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    pub url: String,
    /// Sent verbatim as `Authorization: token <token>`, usually `key:secret`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// `Some(false)` suppresses the token header even when a token is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_token: Option<bool>,
}

impl ClientOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_password(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Reads `FRAPPE_URL` plus whichever credentials are present:
    /// `FRAPPE_TOKEN`, or `FRAPPE_API_KEY` with `FRAPPE_API_SECRET`, and
    /// `FRAPPE_USERNAME` with `FRAPPE_PASSWORD`.
    pub fn from_env() -> Result<Self, ApiError> {
        let url = env_var("FRAPPE_URL").ok_or(ApiError::MissingEnv("FRAPPE_URL"))?;
        let token = env_var("FRAPPE_TOKEN").or_else(|| {
            match (env_var("FRAPPE_API_KEY"), env_var("FRAPPE_API_SECRET")) {
                (Some(key), Some(secret)) => Some(format!("{key}:{secret}")),
                _ => None,
            }
        });
        Ok(Self {
            url,
            token,
            username: env_var("FRAPPE_USERNAME"),
            password: env_var("FRAPPE_PASSWORD"),
            use_token: None,
        })
    }

    /// True when a token, or a complete username/password pair, is configured.
    pub fn has_credentials(&self) -> bool {
        self.token.is_some() || (self.username.is_some() && self.password.is_some())
    }

    /// Whether the `Authorization` header should be sent.
    pub fn sends_token(&self) -> bool {
        self.token.is_some() && self.use_token != Some(false)
    }

    /// Base URL with trailing slashes removed.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// Partial credentials applied over a base `ClientOptions`. `None` fields keep
/// the base value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsUpdate {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub use_token: Option<bool>,
}

impl CredentialsUpdate {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            use_token: Some(true),
            ..Self::default()
        }
    }

    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            use_token: Some(false),
            ..Self::default()
        }
    }

    pub fn apply(&self, base: &ClientOptions) -> ClientOptions {
        ClientOptions {
            url: base.url.clone(),
            token: self.token.clone().or_else(|| base.token.clone()),
            username: self.username.clone().or_else(|| base.username.clone()),
            password: self.password.clone().or_else(|| base.password.clone()),
            use_token: self.use_token.or(base.use_token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn trailing_slashes_are_stripped() {
        assert_eq!(ClientOptions::new("http://erp.local//").base_url(), "http://erp.local");
    }

    #[test]
    fn credentials_require_token_or_full_pair() {
        assert!(!ClientOptions::new("http://erp.local").has_credentials());
        assert!(ClientOptions::new("http://erp.local").with_token("k:s").has_credentials());
        let half = ClientOptions {
            username: Some("admin".to_string()),
            ..ClientOptions::new("http://erp.local")
        };
        assert!(!half.has_credentials());
        assert!(ClientOptions::new("http://erp.local")
            .with_password("admin", "secret")
            .has_credentials());
    }

    #[test]
    fn use_token_false_suppresses_header() {
        let mut options = ClientOptions::new("http://erp.local").with_token("k:s");
        assert!(options.sends_token());
        options.use_token = Some(false);
        assert!(!options.sends_token());
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let base = ClientOptions::new("http://erp.local").with_password("admin", "secret");
        let merged = CredentialsUpdate::token("k:s").apply(&base);
        assert_eq!(merged.url, "http://erp.local");
        assert_eq!(merged.token.as_deref(), Some("k:s"));
        assert_eq!(merged.username.as_deref(), Some("admin"));
        assert_eq!(merged.use_token, Some(true));
    }

    #[test]
    fn from_env_reads_url_and_key_pair() {
        env::remove_var("FRAPPE_TOKEN");
        env::set_var("FRAPPE_URL", "http://erp.local/");
        env::set_var("FRAPPE_API_KEY", "key");
        env::set_var("FRAPPE_API_SECRET", "secret");

        let options = ClientOptions::from_env().unwrap();
        assert_eq!(options.base_url(), "http://erp.local");
        assert_eq!(options.token.as_deref(), Some("key:secret"));

        env::remove_var("FRAPPE_URL");
        env::remove_var("FRAPPE_API_KEY");
        env::remove_var("FRAPPE_API_SECRET");
        let err = ClientOptions::from_env().unwrap_err();
        assert!(matches!(err, ApiError::MissingEnv("FRAPPE_URL")));
    }

    #[test]
    fn options_deserialize_with_optional_fields() {
        let options: ClientOptions =
            serde_json::from_str(r#"{"url":"http://erp.local","token":"k:s"}"#).unwrap();
        assert_eq!(options.token.as_deref(), Some("k:s"));
        assert!(options.username.is_none());
        assert!(options.use_token.is_none());
    }
}
