//! Blocking client for the Frappe document REST API.
//!
//! # Overview
//! `FrappeClient` builds `HttpRequest` values and parses `HttpResponse`
//! values; a `Transport` executes the round-trip in between (host-does-IO
//! pattern). `UreqTransport` is the bundled transport. On top of that sit the
//! document operations (`get_doc`, `get_list`, `create_doc`, `set_doc`,
//! `delete_doc`, `call`) and a `Session` that caches reads, invalidates on
//! writes and swaps credentials.
//!
//! # Design
//! - Configuration is an explicit `ClientOptions` value handed to every
//!   client; there is no process-wide instance.
//! - Listing URLs come from `query::build`, a pure encoder for pagination,
//!   field selection, filters and ordering.
//! - Errors propagate once; nothing is retried.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod query;
pub mod resource;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{Cache, Invalidate, DEFAULT_TTL};
pub use client::FrappeClient;
pub use config::{ClientOptions, CredentialsUpdate};
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
pub use query::{Filter, ListQuery, Operator, StartOffsetPolicy};
pub use resource::{Envelope, MethodResponse};
pub use session::{LoginCredentials, Session, SessionConfig};
pub use transport::UreqTransport;
