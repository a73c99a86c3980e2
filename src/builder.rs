//! Request construction: normalises caller targets into a [`Request`].
//!
//! Three target shapes are accepted (see [`Target`]). Path-based targets are
//! resolved against the context's base path and merged with its additional
//! headers and parameters; call-specific entries win on key collision. A
//! request-convertible bypasses all merging and is sent exactly as provided.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::config::Defaults;
use crate::deserialize::{BytesDeserializer, Deserializable, JsonDeserializer, StringDeserializer};
use crate::download::{Download, ProgressFn};
use crate::engine::{Call, CancelToken};
use crate::request::Destination;
use crate::{FuelError, Method, Request, Response};

/// A value that names a path, relative to the base path or absolute.
pub trait PathStringConvertible {
    /// The path string.
    fn path(&self) -> String;
}

/// A value that carries a fully pre-built request.
pub trait RequestConvertible {
    /// The request to send verbatim.
    fn request(&self) -> Request;
}

/// The target of a call.
#[derive(Debug, Clone)]
pub enum Target {
    /// A path string given directly by the caller.
    PathString(String),
    /// A path taken from a [`PathStringConvertible`].
    PathConvertible(String),
    /// A pre-built request taken from a [`RequestConvertible`].
    RequestConvertible(Box<Request>),
}

impl Target {
    /// Target from a path-string-convertible value.
    pub fn path(convertible: &impl PathStringConvertible) -> Self {
        Self::PathConvertible(convertible.path())
    }

    /// Target from a request-convertible value.
    pub fn request(convertible: &impl RequestConvertible) -> Self {
        Self::RequestConvertible(Box::new(convertible.request()))
    }
}

impl From<&str> for Target {
    fn from(path: &str) -> Self {
        Self::PathString(path.to_string())
    }
}

impl From<String> for Target {
    fn from(path: String) -> Self {
        Self::PathString(path)
    }
}

impl From<&String> for Target {
    fn from(path: &String) -> Self {
        Self::PathString(path.clone())
    }
}

impl From<Request> for Target {
    fn from(request: Request) -> Self {
        Self::RequestConvertible(Box::new(request))
    }
}

/// Resolves `path` to an absolute URL.
///
/// An absolute URL is used unchanged. Otherwise the path is appended to
/// `base_path` by concatenation; a single `/` is inserted only when neither
/// side supplies one at the junction.
///
/// # Errors
///
/// Returns [`FuelError::InvalidUrl`] when there is no base path for a
/// relative target or the concatenation does not parse.
pub fn resolve_url(base_path: Option<&str>, path: &str) -> Result<Url, FuelError> {
    if let Some(absolute) = parse_absolute(path) {
        return Ok(absolute);
    }

    let Some(base) = base_path.filter(|base| !base.is_empty()) else {
        return Err(FuelError::invalid_url(path));
    };

    let needs_separator = !path.is_empty()
        && !base.ends_with('/')
        && !path.starts_with('/')
        && !path.starts_with('?')
        && !path.starts_with('#');
    let joined = if needs_separator {
        format!("{base}/{path}")
    } else {
        format!("{base}{path}")
    };

    parse_absolute(&joined).ok_or_else(|| FuelError::invalid_url(joined))
}

/// Parses `raw` when it is a hierarchical URL with a scheme and host.
/// `localhost:8080/x` style strings parse with a bogus scheme and are rejected.
fn parse_absolute(raw: &str) -> Option<Url> {
    Url::parse(raw)
        .ok()
        .filter(|url| !url.cannot_be_a_base() && url.has_host())
}

/// Merges `defaults` with `call`, call entries winning on collision.
#[must_use]
pub fn merge(
    defaults: &BTreeMap<String, String>,
    call: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = defaults.clone();
    for (key, value) in call {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Merges header maps like [`merge`], comparing names case-insensitively.
///
/// On collision the later entry wins and keeps its own spelling.
#[must_use]
pub fn merge_headers(
    defaults: &BTreeMap<String, String>,
    call: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = BTreeMap::new();
    for (name, value) in defaults.iter().chain(call) {
        insert_header(&mut merged, name.clone(), value.clone());
    }
    merged
}

pub(crate) fn insert_header(headers: &mut BTreeMap<String, String>, name: String, value: String) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
    headers.insert(name, value);
}

/// Call-specific parts collected by the fluent builders.
#[derive(Clone, Default)]
struct CallOptions {
    headers: BTreeMap<String, String>,
    parameters: BTreeMap<String, String>,
    body: Option<Bytes>,
    timeout: Option<Duration>,
    destination: Option<Destination>,
}

impl CallOptions {
    fn has_overrides(&self) -> bool {
        !self.headers.is_empty()
            || !self.parameters.is_empty()
            || self.body.is_some()
            || self.timeout.is_some()
    }
}

fn build_request(
    defaults: &Defaults,
    method: Method,
    target: &Target,
    options: &CallOptions,
) -> Result<Request, FuelError> {
    let path = match target {
        Target::RequestConvertible(request) => {
            if options.has_overrides() {
                debug!(
                    url = %request.url(),
                    "ignoring call-specific headers/parameters for pre-built request"
                );
            }
            let request = Request::clone(request);
            return Ok(match (&options.destination, request.destination()) {
                (Some(destination), None) => request.with_destination(Arc::clone(destination)),
                _ => request,
            });
        }
        Target::PathString(path) | Target::PathConvertible(path) => path,
    };

    let url = resolve_url(defaults.base_path(), path)?;
    let headers = merge_headers(defaults.additional_headers(), &options.headers);
    let parameters = merge(defaults.additional_params(), &options.parameters);

    let mut request = Request::new(method, url)
        .with_headers(headers)
        .with_parameters(parameters);
    if let Some(body) = &options.body {
        request = request.with_body(body.clone());
    }
    if let Some(timeout) = options.timeout {
        request = request.with_timeout(timeout);
    }
    if let Some(destination) = &options.destination {
        request = request.with_destination(Arc::clone(destination));
    }
    Ok(request)
}

/// Fluent builder for an in-memory call.
///
/// Created by the selectors on [`ClientContext`](crate::ClientContext); holds
/// the defaults snapshot taken at that moment.
#[derive(Clone)]
pub struct RequestBuilder {
    defaults: Arc<Defaults>,
    method: Method,
    target: Target,
    options: CallOptions,
}

impl RequestBuilder {
    pub(crate) fn new(defaults: Arc<Defaults>, method: Method, target: Target) -> Self {
        Self {
            defaults,
            method,
            target,
            options: CallOptions::default(),
        }
    }

    /// Adds one call-specific header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        insert_header(&mut self.options.headers, name.into(), value.into());
        self
    }

    /// Adds several call-specific headers.
    #[must_use]
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            insert_header(&mut self.options.headers, name.into(), value.into());
        }
        self
    }

    /// Adds one call-specific parameter.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.parameters.insert(name.into(), value.into());
        self
    }

    /// Adds several call-specific parameters.
    #[must_use]
    pub fn parameters<I, K, V>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.options
            .parameters
            .extend(parameters.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets an explicit body; parameters then travel in the query string.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.options.body = Some(body.into());
        self
    }

    /// Sets a total deadline for this call, body included.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Method chosen by the selector.
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Builds the request without sending it.
    ///
    /// # Errors
    ///
    /// Returns [`FuelError::InvalidUrl`] when the target cannot be resolved.
    pub fn build(&self) -> Result<Request, FuelError> {
        build_request(&self.defaults, self.method, &self.target, &self.options)
    }

    /// Sends the request and decodes the body with `deserializer`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn response_with<D: Deserializable>(self, deserializer: D) -> Call<D::Output> {
        let engine = self.defaults.engine();
        match self.build() {
            Ok(request) => engine.execute(request, deserializer),
            Err(error) => engine.reject(error),
        }
    }

    /// Sends the request and yields the raw body.
    pub fn response_bytes(self) -> Call<Bytes> {
        self.response_with(BytesDeserializer)
    }

    /// Sends the request and yields the body as UTF-8 text.
    pub fn response_string(self) -> Call<String> {
        self.response_with(StringDeserializer)
    }

    /// Sends the request and decodes a JSON body into `T`.
    pub fn response_json<T>(self) -> Call<T>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        self.response_with(JsonDeserializer::new())
    }

    /// Sends the request and hands the completion to `callback` once.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, since both the call and
    /// the callback run on spawned tasks.
    pub fn response<D, F>(self, deserializer: D, callback: F) -> CancelToken
    where
        D: Deserializable,
        F: FnOnce(Option<Request>, Option<Response>, Result<D::Output, FuelError>)
            + Send
            + 'static,
    {
        self.response_with(deserializer).on_complete(callback)
    }

    /// Text variant of [`RequestBuilder::response`].
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn response_string_with_callback<F>(self, callback: F) -> CancelToken
    where
        F: FnOnce(Option<Request>, Option<Response>, Result<String, FuelError>) + Send + 'static,
    {
        self.response(StringDeserializer, callback)
    }
}

/// Fluent builder for a streamed download.
#[derive(Clone)]
pub struct DownloadBuilder {
    inner: RequestBuilder,
    progress: Option<ProgressFn>,
}

impl DownloadBuilder {
    pub(crate) fn new(inner: RequestBuilder) -> Self {
        Self {
            inner,
            progress: None,
        }
    }

    /// Adds one call-specific header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner = self.inner.header(name, value);
        self
    }

    /// Adds one call-specific parameter.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner = self.inner.parameter(name, value);
        self
    }

    /// Sets a total deadline for this call, body included.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.inner = self.inner.timeout(timeout);
        self
    }

    /// Sets the resolver choosing the output file.
    #[must_use]
    pub fn destination<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Response, &Url) -> std::io::Result<PathBuf> + Send + Sync + 'static,
    {
        self.inner.options.destination = Some(Arc::new(resolver));
        self
    }

    /// Sets the progress callback, invoked with `(bytes_read, total_bytes)`
    /// after every chunk; `total_bytes` is `-1` while unknown.
    #[must_use]
    pub fn progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(u64, i64) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Builds the request without sending it.
    ///
    /// # Errors
    ///
    /// Returns [`FuelError::InvalidUrl`] when the target cannot be resolved.
    pub fn build(&self) -> Result<Request, FuelError> {
        self.inner.build()
    }

    /// Starts the download.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn send(self) -> Call<Download> {
        let engine = self.inner.defaults.engine();
        match self.inner.build() {
            Ok(request) => engine.download(request, self.progress),
            Err(error) => engine.reject(error),
        }
    }

    /// Starts the download and hands the completion to `callback` once.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, since both the download
    /// and the callback run on spawned tasks.
    pub fn send_with_callback<F>(self, callback: F) -> CancelToken
    where
        F: FnOnce(Option<Request>, Option<Response>, Result<Download, FuelError>)
            + Send
            + 'static,
    {
        self.send().on_complete(callback)
    }
}
