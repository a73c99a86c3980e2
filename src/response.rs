//! Immutable view of an HTTP reply.

use std::collections::BTreeMap;

use bytes::Bytes;
use url::Url;

/// Status, headers and body of a completed HTTP exchange.
///
/// Header names are lower-cased; a header that appears several times keeps
/// every value in arrival order. For downloads the body is empty because the
/// payload was streamed to the destination file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status_code: u16,
    url: Url,
    headers: BTreeMap<String, Vec<String>>,
    body: Bytes,
}

impl Response {
    /// Creates a response from its parts.
    #[must_use]
    pub fn new(
        status_code: u16,
        url: Url,
        headers: BTreeMap<String, Vec<String>>,
        body: Bytes,
    ) -> Self {
        Self {
            status_code,
            url,
            headers,
            body,
        }
    }

    /// Captures status, final URL and headers of a reqwest response.
    /// The body is attached later via [`Response::with_body`].
    pub(crate) fn from_head(response: &reqwest::Response) -> Self {
        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_ascii_lowercase())
                .or_default()
                .push(value);
        }
        Self {
            status_code: response.status().as_u16(),
            url: response.url().clone(),
            headers,
            body: Bytes::new(),
        }
    }

    pub(crate) fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// HTTP status code.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Final URL of the exchange (after redirects).
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// All headers, keyed by lower-case name.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, Vec<String>> {
        &self.headers
    }

    /// Values of one header (case-insensitive lookup); empty when absent.
    #[must_use]
    pub fn header(&self, name: &str) -> &[String] {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map_or(&[], Vec::as_slice)
    }

    /// Raw body bytes.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// `Content-Length` as announced by the server, when present and valid.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")
            .first()
            .and_then(|value| value.trim().parse::<u64>().ok())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> Response {
        let mut headers = BTreeMap::new();
        headers.insert("content-length".to_string(), vec!["42".to_string()]);
        headers.insert(
            "set-cookie".to_string(),
            vec!["a=1".to_string(), "b=2".to_string()],
        );
        Response::new(
            200,
            Url::parse("https://example.com/get").unwrap(),
            headers,
            Bytes::from_static(b"hello"),
        )
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = sample();
        assert_eq!(response.header("Set-Cookie"), ["a=1", "b=2"]);
        assert!(response.header("x-missing").is_empty());
    }

    #[test]
    fn test_content_length_parsed() {
        assert_eq!(sample().content_length(), Some(42));
    }

    #[test]
    fn test_with_body_replaces_body() {
        let response = sample().with_body(Bytes::from_static(b"other"));
        assert_eq!(response.body().as_ref(), b"other");
        assert_eq!(response.status_code(), 200);
    }
}
