//! Request client for the Frappe REST API.
//!
//! # Design
//! `FrappeClient` holds an immutable `ClientOptions` and a shared transport.
//! Every call is split into `build_request` (pure: URL, headers, JSON body)
//! and `parse_response` (pure: status check, JSON decoding), with `request`
//! running the transport in between. Keeping the two halves public lets a
//! host that owns its own I/O loop drive the client without a `Transport`.
//!
//! Credentials never change on a live client. To switch users, build a new
//! client (see `Session`).

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientOptions;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::query;

#[derive(Clone)]
pub struct FrappeClient {
    options: ClientOptions,
    base_url: String,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for FrappeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrappeClient")
            .field("base_url", &self.base_url)
            .field("sends_token", &self.options.sends_token())
            .field("username", &self.options.username)
            .finish_non_exhaustive()
    }
}

impl FrappeClient {
    /// Fails with `MissingBaseUrl` when `options.url` is empty.
    pub fn new(options: ClientOptions, transport: Arc<dyn Transport>) -> Result<Self, ApiError> {
        let base_url = options.base_url().to_string();
        if base_url.is_empty() {
            return Err(ApiError::MissingBaseUrl);
        }
        Ok(Self {
            options,
            base_url,
            transport,
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Builds the request for `path` (appended verbatim to the base URL).
    ///
    /// Header precedence: `Content-Type: application/json`, then `headers`,
    /// then `Authorization: token ...` when a token is in use.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
        headers: &[(String, String)],
    ) -> Result<HttpRequest, ApiError> {
        let mut merged = vec![("Content-Type".to_string(), "application/json".to_string())];
        for (name, value) in headers {
            set_header(&mut merged, name, value);
        }
        if self.options.sends_token() {
            if let Some(token) = &self.options.token {
                set_header(&mut merged, "Authorization", &format!("token {token}"));
            }
        }

        let body = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(ApiError::Serialization)?;

        Ok(HttpRequest {
            method,
            url: format!("{}{path}", self.base_url),
            headers: merged,
            body,
        })
    }

    /// Maps non-2xx statuses to `ApiError::Http` and decodes the JSON body otherwise.
    pub fn parse_response<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<T, ApiError> {
        if !response.is_success() {
            return Err(ApiError::Http {
                status: response.status,
                body: response.body,
            });
        }
        serde_json::from_str(&response.body).map_err(ApiError::Deserialization)
    }

    pub fn request<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
        headers: &[(String, String)],
    ) -> Result<T, ApiError> {
        let request = self.build_request(method, path, body, headers)?;
        tracing::debug!(method = method.as_str(), url = %request.url, "sending request");
        let response = self
            .transport
            .execute(&request)
            .map_err(ApiError::Transport)?;
        tracing::debug!(status = response.status, url = %request.url, "received response");
        self.parse_response(response)
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(HttpMethod::Get, path, None, &[])
    }

    /// GET with flat, percent-encoded query parameters.
    pub fn get_with<T, K, V>(&self, path: &str, params: &[(K, V)]) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.get(&query::with_params(path, params))
    }

    pub fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body).map_err(ApiError::Serialization)?;
        self.request(HttpMethod::Post, path, Some(&body), &[])
    }

    /// POST without a request body.
    pub fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(HttpMethod::Post, path, None, &[])
    }

    pub fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body).map_err(ApiError::Serialization)?;
        self.request(HttpMethod::Put, path, Some(&body), &[])
    }

    pub fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(HttpMethod::Delete, path, None, &[])
    }
}

/// Replaces `name` case-insensitively, or appends it.
fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
        Some(slot) => slot.1 = value.to_string(),
        None => headers.push((name.to_string(), value.to_string())),
    }
}
