//! Credential-aware client holder with a response cache.
//!
//! # Design
//! A `Session` owns the active `FrappeClient` behind an `Arc` together with
//! the cache its reads populate. Credentials are never mutated in place:
//! `update_credentials` merges the update into the options the session was
//! created with, builds a fresh client and swaps the `Arc`. Clients handed out
//! earlier keep the credentials they were built with. Every swap clears the
//! cache and resets the transport's session (login cookies), since cached
//! documents may not be visible to the new user.
//!
//! Credential swapping is opt-in (`SessionConfig::enable_dynamic_auth`).
//! With it disabled, `update_credentials` and `clear_credentials` log a
//! warning and leave the session untouched.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{Cache, Invalidate, DEFAULT_TTL};
use crate::client::FrappeClient;
use crate::config::{ClientOptions, CredentialsUpdate};
use crate::error::ApiError;
use crate::http::Transport;
use crate::query::{self, ListQuery};
use crate::resource::collection_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub cache_ttl: Duration,
    pub enable_dynamic_auth: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_TTL,
            enable_dynamic_auth: false,
        }
    }
}

impl SessionConfig {
    pub fn with_dynamic_auth(mut self) -> Self {
        self.enable_dynamic_auth = true;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

/// Either an API key pair or a username/password pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
}

/// Cache key of a single document.
pub fn doc_key(doctype: &str, name: &str) -> String {
    format!("doc:{doctype}:{name}")
}

/// Cache key of a listing, `url` being the encoded listing path.
pub fn list_key(doctype: &str, url: &str) -> String {
    format!("docs:{doctype}:{url}")
}

/// Selects every listing of `doctype` plus the cached copy of `name`.
fn document_scope(doctype: &str, name: &str) -> Result<Invalidate, ApiError> {
    let doctype = regex::escape(doctype);
    let name = regex::escape(name);
    Ok(Invalidate::pattern(&format!("^(?:docs:{doctype}:|doc:{doctype}:{name}$)"))?)
}

pub struct Session {
    initial: ClientOptions,
    client: Arc<FrappeClient>,
    cache: Cache<Value>,
    config: SessionConfig,
}

impl Session {
    pub fn new(
        options: ClientOptions,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
    ) -> Result<Self, ApiError> {
        let client = FrappeClient::new(options.clone(), transport)?;
        Ok(Self {
            initial: options,
            client: Arc::new(client),
            cache: Cache::new(config.cache_ttl),
            config,
        })
    }

    /// The active client. Holders keep working with its credentials even
    /// after the session swaps to a new client.
    pub fn client(&self) -> Arc<FrappeClient> {
        Arc::clone(&self.client)
    }

    pub fn cache(&self) -> &Cache<Value> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut Cache<Value> {
        &mut self.cache
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.options().has_credentials()
    }

    fn swap_client(&mut self, options: ClientOptions) -> Result<(), ApiError> {
        let transport = self.client.transport();
        let client = FrappeClient::new(options, Arc::clone(&transport))?;
        transport.reset_session();
        self.client = Arc::new(client);
        self.cache.clear();
        Ok(())
    }

    /// Rebuilds the client from the initial options merged with `update`.
    ///
    /// Returns `false` (and changes nothing) when dynamic auth is disabled.
    pub fn update_credentials(&mut self, update: CredentialsUpdate) -> Result<bool, ApiError> {
        if !self.config.enable_dynamic_auth {
            tracing::warn!("dynamic authentication is not enabled; credentials left unchanged");
            return Ok(false);
        }
        self.swap_client(update.apply(&self.initial))?;
        tracing::debug!(authenticated = self.is_authenticated(), "credentials updated");
        Ok(true)
    }

    /// Rebuilds the client with the base URL only.
    ///
    /// Returns `false` (and changes nothing) when dynamic auth is disabled.
    pub fn clear_credentials(&mut self) -> Result<bool, ApiError> {
        if !self.config.enable_dynamic_auth {
            tracing::warn!("dynamic authentication is not enabled; credentials left unchanged");
            return Ok(false);
        }
        self.swap_client(ClientOptions::new(self.initial.url.clone()))?;
        tracing::debug!("credentials cleared");
        Ok(true)
    }

    /// Records the username/password, then opens a cookie session with them.
    /// Credentials are cleared again if the backend rejects the login.
    pub fn login(&mut self, username: &str, password: &str) -> Result<Value, ApiError> {
        let switched = self.update_credentials(CredentialsUpdate::password(username, password))?;
        match self.client.login(username, password) {
            Ok(result) => Ok(result),
            Err(err) => {
                if switched {
                    self.clear_credentials()?;
                }
                Err(err)
            }
        }
    }

    /// Switches to token auth (`key:secret`) and verifies it against the
    /// backend. Credentials are cleared again if verification fails.
    ///
    /// Fails with `ApiError::DynamicAuthDisabled` without sending anything
    /// when the token cannot be installed.
    pub fn login_with_token(&mut self, api_key: &str, api_secret: &str) -> Result<String, ApiError> {
        if !self.update_credentials(CredentialsUpdate::token(format!("{api_key}:{api_secret}")))? {
            return Err(ApiError::DynamicAuthDisabled);
        }
        match self.client.get_logged_user() {
            Ok(user) => Ok(user),
            Err(err) => {
                tracing::warn!(error = %err, "token verification failed; clearing credentials");
                self.clear_credentials()?;
                Err(err)
            }
        }
    }

    /// Token login when both API key and secret are given, otherwise
    /// password login. Returns the login response, or `{"message": user}`
    /// for token logins.
    pub fn dynamic_login(&mut self, credentials: &LoginCredentials) -> Result<Value, ApiError> {
        match credentials {
            LoginCredentials {
                api_key: Some(key),
                api_secret: Some(secret),
                ..
            } => {
                let user = self.login_with_token(key, secret)?;
                Ok(serde_json::json!({ "message": user }))
            }
            LoginCredentials {
                username: Some(username),
                password: Some(password),
                ..
            } => self.login(username, password),
            _ => Err(ApiError::MissingCredentials),
        }
    }

    /// Ends the remote session if there is one and always clears local credentials.
    pub fn logout(&mut self) -> Result<(), ApiError> {
        if let Err(err) = self.client.logout() {
            tracing::warn!(error = %err, "remote logout failed; ignoring");
        }
        self.clear_credentials()?;
        Ok(())
    }

    pub fn current_user(&self) -> Result<String, ApiError> {
        self.client.get_logged_user()
    }

    /// Cached `get_doc`.
    pub fn get_doc<T: DeserializeOwned>(&mut self, doctype: &str, name: &str) -> Result<T, ApiError> {
        let key = doc_key(doctype, name);
        let value = self.cached(&key, |client| client.get_doc(doctype, name))?;
        serde_json::from_value(value).map_err(ApiError::Deserialization)
    }

    /// Cached `get_list`, keyed by the encoded listing URL.
    pub fn get_list<T: DeserializeOwned>(&mut self, doctype: &str, query: &ListQuery) -> Result<Vec<T>, ApiError> {
        let key = list_key(doctype, &query::build(&collection_path(doctype), query));
        let value = self.cached(&key, |client| {
            client.get_list::<Value>(doctype, query).map(Value::Array)
        })?;
        serde_json::from_value(value).map_err(ApiError::Deserialization)
    }

    fn cached<F>(&mut self, key: &str, fetch: F) -> Result<Value, ApiError>
    where
        F: FnOnce(&FrappeClient) -> Result<Value, ApiError>,
    {
        if let Some(hit) = self.cache.get(key) {
            tracing::debug!(key, "cache hit");
            return Ok(hit.clone());
        }
        tracing::debug!(key, "cache miss");
        let value = fetch(self.client.as_ref())?;
        self.cache.set(key, value.clone());
        Ok(value)
    }

    /// Runs `op` against the active client and, only if it succeeds, drops
    /// the cache entries selected by `invalidate`.
    pub fn mutate<T, F>(&mut self, invalidate: &Invalidate, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(&FrappeClient) -> Result<T, ApiError>,
    {
        let result = op(self.client.as_ref())?;
        let removed = self.cache.invalidate_where(invalidate);
        tracing::debug!(removed, "cache invalidated after mutation");
        Ok(result)
    }

    /// Creates a document and drops every cached listing.
    pub fn create_doc<T, B>(&mut self, doctype: &str, data: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let invalidate = Invalidate::pattern("^docs:")?;
        self.mutate(&invalidate, |client| client.create_doc(doctype, data))
    }

    /// Updates a document and drops its cached copy and the doctype's listings.
    pub fn set_doc<T, B>(&mut self, doctype: &str, name: &str, data: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let scope = document_scope(doctype, name)?;
        self.mutate(&scope, |client| client.set_doc(doctype, name, data))
    }

    /// Deletes a document and drops its cached copy and the doctype's listings.
    pub fn delete_doc(&mut self, doctype: &str, name: &str) -> Result<Value, ApiError> {
        let scope = document_scope(doctype, name)?;
        self.mutate(&scope, |client| client.delete_doc(doctype, name))
    }
}
