//! Fuel: a lightweight asynchronous HTTP client facade.
//!
//! A process-wide [`ClientContext`] holds the base path, additional headers
//! and parameters applied to every request. Selectors such as [`get`] and
//! [`download`] turn a target into a [`Request`], the [`Engine`] executes it
//! on a Tokio task, and the outcome arrives exactly once as a
//! [`Completion`] of `(request, response, result)`.
//!
//! ```no_run
//! # async fn demo() {
//! fuel::shared().set_base_path("https://httpbin.org");
//! let completion = fuel::get("/get").parameter("foo", "bar").response_string().await;
//! match completion.result {
//!     Ok(body) => println!("{body}"),
//!     Err(error) => eprintln!("request failed: {error}"),
//! }
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`config`] - shared defaults and the selectors
//! - [`builder`] - target normalisation, URL resolution and merging
//! - [`engine`] - asynchronous execution and completion delivery
//! - [`download`] - streamed downloads with progress
//! - [`client`] - the pooled `reqwest` client wrapper
//! - [`settings`] - settings file used by the `fuel` binary

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod builder;
pub mod client;
pub mod config;
pub mod constants;
pub mod deserialize;
pub mod download;
pub mod engine;
pub mod error;
pub mod method;
pub mod request;
pub mod response;
pub mod settings;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use builder::{
    DownloadBuilder, PathStringConvertible, RequestBuilder, RequestConvertible, Target, merge,
    merge_headers, resolve_url,
};
pub use client::HttpClient;
pub use config::{
    ClientContext, Defaults, delete, download, get, head, patch, post, put, request, shared,
};
pub use deserialize::{
    BytesDeserializer, Deserializable, FnDeserializer, JsonDeserializer, StringDeserializer,
};
pub use download::{Download, DownloadState, ProgressFn, ProgressState};
pub use engine::{Call, CancelToken, Completion, Engine, StatusPolicy};
pub use error::{ErrorKind, FuelError};
pub use method::{Method, UnknownMethod};
pub use request::{Destination, Request};
pub use response::Response;
pub use settings::{Settings, SettingsError};
