//! # wiretest
//!
//! HTTP test harness: build requests, send them over HTTP/1.1, and check
//! the responses.
//!
//! - [`Request`] / [`RequestBuilder`] describe a request: query, headers and
//!   a JSON, form or multipart body.
//! - [`Client`] sends it, decompressing gzip bodies and parsing JSON.
//! - [`Agent`] adds a per-session [`CookieJar`].
//! - [`assert`] checks status, headers and JSON body fields.
//!
//! ```rust,ignore
//! use wiretest::{assert::*, Client, Request};
//!
//! let client = Client::builder().base_url("http://127.0.0.1:8080").build()?;
//! let mut agent = client.agent();
//! let resp = agent.send(&Request::get("/get").query([("a", "1")]).build()).await?;
//! expect_status(&resp, 200)?;
//! expect_body_field(&resp, "/args/a", "1")?;
//! ```

pub mod agent;
pub mod assert;
pub mod auth;
pub mod client;
pub mod cookie;
pub mod error;
pub mod headers;
pub mod multipart;
pub mod request;
pub mod response;
pub mod timeouts;
pub mod transport;

// Re-exports
pub use agent::Agent;
pub use client::{Client, ClientBuilder};
pub use cookie::{Cookie, CookieJar};
pub use error::{AssertionFailure, BodyMode, Error, Result, TransportError, TransportErrorKind};
pub use multipart::{Part, PartValue};
pub use request::{Body, ParamValue, Request, RequestBuilder};
pub use response::Response;
pub use timeouts::Timeouts;
