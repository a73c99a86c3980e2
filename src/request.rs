//! Immutable description of one HTTP call.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use url::Url;

use crate::{Method, Response};

/// Resolver choosing where a download is written.
///
/// Invoked at most once per download, after the response headers arrive,
/// with the response metadata and the request URL.
pub type Destination = Arc<dyn Fn(&Response, &Url) -> std::io::Result<PathBuf> + Send + Sync>;

/// A fully resolved HTTP request.
///
/// Built by the [`RequestBuilder`](crate::RequestBuilder) (or directly through
/// [`Request::new`] for request-convertibles) and never mutated once handed
/// to the [`Engine`](crate::Engine).
#[derive(Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: BTreeMap<String, String>,
    parameters: Vec<(String, String)>,
    body: Option<Bytes>,
    timeout: Option<Duration>,
    destination: Option<Destination>,
}

impl Request {
    /// Creates a request with no headers, parameters or body.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: BTreeMap::new(),
            parameters: Vec::new(),
            body: None,
            timeout: None,
            destination: None,
        }
    }

    /// Replaces the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Replaces the parameters.
    #[must_use]
    pub fn with_parameters<I, K, V>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.parameters = parameters
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Sets an explicit body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a total deadline for this request, from sending until the body
    /// is fully read. Independent of the client's idle read timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attaches a download destination resolver.
    #[must_use]
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Resolved absolute URL (parameters not yet applied).
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Headers sent with the request.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Parameters, in the order they will be encoded.
    #[must_use]
    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    /// Explicit body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Per-request timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Download destination resolver, if any.
    #[must_use]
    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    /// Whether parameters travel as a form body (payload verb without an explicit body).
    #[must_use]
    pub fn encodes_params_as_form(&self) -> bool {
        self.method.encodes_params_in_body() && self.body.is_none() && !self.parameters.is_empty()
    }

    /// URL with query parameters applied, as it goes on the wire.
    #[must_use]
    pub fn effective_url(&self) -> Url {
        let mut url = self.url.clone();
        if !self.parameters.is_empty() && !self.encodes_params_as_form() {
            url.query_pairs_mut().extend_pairs(
                self.parameters
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str())),
            );
        }
        url
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("parameters", &self.parameters)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("timeout", &self.timeout)
            .field("destination", &self.destination.is_some())
            .finish()
    }
}
