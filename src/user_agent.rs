//! Default User-Agent string sent by every [`HttpClient`](crate::HttpClient).

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/kittinunf/fuel";

/// Default User-Agent for requests (identifies the library and its version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("fuel/{version} (+{PROJECT_UA_URL})")
}
