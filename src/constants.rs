//! Constants for the HTTP client (timeouts, streaming).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout: the longest wait for the next bytes of a reply.
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Upper bound on the bytes written and reported per download chunk (64 KiB).
pub const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Maximum number of redirects followed before the last 3xx is surfaced.
pub const MAX_REDIRECTS: usize = 10;

/// Sentinel used for `total_bytes` while the length of a download is unknown.
pub const UNKNOWN_TOTAL_BYTES: i64 = -1;
