//! Error types for the request pipeline.
//!
//! Every failure of a call is expressed as a [`FuelError`] and delivered
//! through the call's completion, never raised on the caller's thread.

use std::path::PathBuf;

use thiserror::Error;

use crate::Response;

/// Coarse classification of a [`FuelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No resolvable absolute URL.
    InvalidUrl,
    /// Transport-level failure: DNS, refused connection, timeout, dropped stream.
    Connection,
    /// Status code rejected by the status policy.
    HttpStatus,
    /// Body could not be converted to the requested representation.
    Decoding,
    /// Caller-initiated cancellation.
    Cancelled,
    /// Local I/O failure (destination resolution, file write, short download).
    Io,
}

/// Errors that can end a call.
#[derive(Debug, Error)]
pub enum FuelError {
    /// The target could not be resolved to an absolute URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The unresolvable target (after base path concatenation, if any).
        url: String,
    },

    /// Network-level error (DNS resolution, connection refused, TLS, timeout, etc.)
    #[error("connection error requesting {url}: {source}")]
    Connection {
        /// The URL being requested.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Status code outside the accepted range.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The full response, body included.
        response: Box<Response>,
    },

    /// The body could not be decoded.
    #[error("failed to decode response from {url}: {message}")]
    Decoding {
        /// The URL whose body failed to decode.
        url: String,
        /// What went wrong.
        message: String,
        /// The response whose body failed to decode.
        response: Box<Response>,
        /// Underlying decoder error, when there is one.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The call was cancelled by the caller.
    #[error("request to {url} was cancelled")]
    Cancelled {
        /// The URL of the cancelled call.
        url: String,
    },

    /// File system error while writing a download.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The destination resolver failed or was never configured.
    #[error("could not resolve download destination for {url}: {source}")]
    Destination {
        /// The URL being downloaded.
        url: String,
        /// Error reported by the resolver.
        #[source]
        source: std::io::Error,
    },

    /// Stream ended before the announced `Content-Length` was reached.
    #[error("incomplete download to {path}: expected {expected_bytes} bytes, got {actual_bytes}")]
    Incomplete {
        /// Download path holding the partial data.
        path: PathBuf,
        /// Announced size in bytes.
        expected_bytes: u64,
        /// Bytes actually written.
        actual_bytes: u64,
    },

    /// The worker task panicked or was aborted before completing.
    #[error("worker task for {url} failed: {message}")]
    TaskFailed {
        /// The URL of the call.
        url: String,
        /// Join error description.
        message: String,
    },

    /// The underlying HTTP client could not be constructed.
    #[error("failed to build HTTP client: {message}")]
    ClientBuild {
        /// Why construction failed.
        message: String,
    },
}

impl FuelError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a connection error from a reqwest error.
    pub fn connection(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Connection {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error that owns the rejected response.
    pub fn http_status(url: impl Into<String>, response: Response) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status: response.status_code(),
            response: Box::new(response),
        }
    }

    /// Creates a decoding error without an underlying source.
    pub fn decoding(url: impl Into<String>, message: impl Into<String>, response: Response) -> Self {
        Self::Decoding {
            url: url.into(),
            message: message.into(),
            response: Box::new(response),
            source: None,
        }
    }

    /// Creates a decoding error wrapping the decoder's own error.
    pub fn decoding_with_source(
        url: impl Into<String>,
        response: Response,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Decoding {
            url: url.into(),
            message: source.to_string(),
            response: Box::new(response),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a destination resolution error.
    pub fn destination(url: impl Into<String>, source: std::io::Error) -> Self {
        Self::Destination {
            url: url.into(),
            source,
        }
    }

    /// Creates an incomplete download error.
    pub fn incomplete(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Incomplete {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates a worker task failure error.
    pub fn task_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TaskFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a client construction error.
    pub fn client_build(message: impl Into<String>) -> Self {
        Self::ClientBuild {
            message: message.into(),
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Self::Connection { .. } | Self::TaskFailed { .. } | Self::ClientBuild { .. } => {
                ErrorKind::Connection
            }
            Self::HttpStatus { .. } => ErrorKind::HttpStatus,
            Self::Decoding { .. } => ErrorKind::Decoding,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Io { .. } | Self::Destination { .. } | Self::Incomplete { .. } => ErrorKind::Io,
        }
    }

    /// Whether the call was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether the transport reported a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Connection { source, .. } if source.is_timeout())
    }

    /// HTTP status code attached to the error, if any.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.response().map(Response::status_code)
    }

    /// The response embedded in the error, for status and decoding failures.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::HttpStatus { response, .. } | Self::Decoding { response, .. } => Some(response),
            _ => None,
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// url or path context that the source errors don't carry.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use bytes::Bytes;
    use url::Url;

    use super::*;

    fn response(status: u16) -> Response {
        Response::new(
            status,
            Url::parse("https://example.com/missing").unwrap(),
            BTreeMap::new(),
            Bytes::from_static(b"not here"),
        )
    }

    #[test]
    fn test_invalid_url_display() {
        let error = FuelError::invalid_url("/get");
        let msg = error.to_string();
        assert!(msg.contains("invalid URL"), "Expected 'invalid URL' in: {msg}");
        assert!(msg.contains("/get"), "Expected target in: {msg}");
        assert_eq!(error.kind(), ErrorKind::InvalidUrl);
    }

    #[test]
    fn test_http_status_carries_response() {
        let error = FuelError::http_status("https://example.com/missing", response(404));
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert_eq!(error.status_code(), Some(404));
        assert_eq!(error.response().unwrap().body().as_ref(), b"not here");
        assert_eq!(error.kind(), ErrorKind::HttpStatus);
    }

    #[test]
    fn test_decoding_error_keeps_source() {
        let utf8 = String::from_utf8(vec![0xff, 0xfe]).unwrap_err();
        let error = FuelError::decoding_with_source("https://example.com", response(200), utf8);
        assert_eq!(error.kind(), ErrorKind::Decoding);
        assert!(std::error::Error::source(&error).is_some());
        assert_eq!(error.status_code(), Some(200));
    }

    #[test]
    fn test_cancelled_classification() {
        let error = FuelError::cancelled("https://example.com/slow");
        assert!(error.is_cancelled());
        assert!(!error.is_timeout());
        assert_eq!(error.kind(), ErrorKind::Cancelled);
        assert!(error.response().is_none());
    }

    #[test]
    fn test_io_family_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = FuelError::io(PathBuf::from("/tmp/out.bin"), io);
        assert!(error.to_string().contains("/tmp/out.bin"));
        assert_eq!(error.kind(), ErrorKind::Io);

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no resolver");
        assert_eq!(
            FuelError::destination("https://example.com", missing).kind(),
            ErrorKind::Io
        );
        assert_eq!(
            FuelError::incomplete("/tmp/out.bin", 10, 4).kind(),
            ErrorKind::Io
        );
    }
}
