//! HTTP client wrapper used by the execution engine.
//!
//! This module provides the `HttpClient` struct which owns the reqwest
//! connection pool, timeout configuration and default headers, and turns a
//! [`Request`] into wire traffic.

use std::panic::{AssertUnwindSafe, catch_unwind, set_hook, take_hook};
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect;
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::{debug, instrument, warn};

use crate::constants::{CONNECT_TIMEOUT_SECS, MAX_REDIRECTS, READ_TIMEOUT_SECS};
use crate::error::FuelError;
use crate::request::Request;
use crate::user_agent;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP client engine shared by every request built from one context.
///
/// Cloning is cheap and shares the underlying connection pool.
///
/// # Example
///
/// ```no_run
/// use fuel::{ClientContext, HttpClient};
///
/// let context = ClientContext::with_client(HttpClient::new_with_timeouts(5, 60));
/// context.set_base_path("https://httpbin.org");
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes without receiving data
    /// - Gzip decompression: enabled
    /// - Redirects: followed, up to 10
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice; use
    /// [`HttpClient::try_new`] to handle the failure instead.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// `read_timeout_secs` bounds each wait for data, not the whole
    /// exchange; a slow body that keeps arriving is never cut off.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        Self::try_new(None, connect_timeout_secs, read_timeout_secs)
            .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a new HTTP client with a cookie jar.
    ///
    /// Cookies in the jar are attached to matching requests and `Set-Cookie`
    /// responses are stored back into it.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    #[instrument(level = "debug", skip(cookie_jar))]
    pub fn with_cookie_jar(cookie_jar: Arc<Jar>) -> Self {
        Self::try_new(Some(cookie_jar), CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
            .expect("failed to build HTTP client with static configuration")
    }

    /// Fallible constructor behind all the others.
    ///
    /// # Errors
    ///
    /// Returns [`FuelError::ClientBuild`] when reqwest rejects the
    /// configuration or the proxy fallback builder panics as well.
    pub fn try_new(
        cookie_jar: Option<Arc<Jar>>,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, FuelError> {
        let client = build_client(cookie_jar, connect_timeout_secs, read_timeout_secs)?;
        Ok(Self { client })
    }

    /// Sends a request and returns the reply once its headers are in.
    ///
    /// Status codes are not inspected here; classification belongs to the
    /// engine's status policy.
    ///
    /// # Errors
    ///
    /// Returns [`FuelError::Connection`] for transport failures and timeouts.
    #[instrument(level = "debug", skip(self, request), fields(method = %request.method(), url = %request.url()))]
    pub async fn send(&self, request: &Request) -> Result<reqwest::Response, FuelError> {
        let url = request.effective_url();
        let mut builder = self
            .client
            .request(request.method().to_reqwest(), url.clone());

        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout() {
            builder = builder.timeout(timeout);
        }

        if request.encodes_params_as_form() {
            let form = encode_form(request.parameters());
            if !has_header(request, CONTENT_TYPE.as_str()) {
                builder = builder.header(CONTENT_TYPE, FORM_CONTENT_TYPE);
            }
            builder = builder.body(form);
        } else if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        debug!(url = %url, "sending request");
        builder
            .send()
            .await
            .map_err(|e| FuelError::connection(url.as_str(), e))
    }

    /// Returns a reference to the underlying reqwest client.
    ///
    /// This can be used for advanced operations not covered by this wrapper.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

fn has_header(request: &Request, name: &str) -> bool {
    request
        .headers()
        .keys()
        .any(|key| key.eq_ignore_ascii_case(name))
}

fn encode_form(parameters: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(parameters.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}

fn build_client(
    cookie_jar: Option<Arc<Jar>>,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
) -> Result<Client, FuelError> {
    let initial = try_build_client(
        cookie_jar.clone(),
        connect_timeout_secs,
        read_timeout_secs,
        false,
    );
    match initial {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            warn!(
                "HTTP client builder panicked while loading system proxy settings; retrying with env-proxy fallback"
            );
            match try_build_client(cookie_jar, connect_timeout_secs, read_timeout_secs, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Build(error)) => {
                    Err(FuelError::client_build(error.to_string()))
                }
                Err(BuildClientFailure::Panic) => Err(FuelError::client_build(
                    "HTTP client builder panicked while applying env-proxy fallback",
                )),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(FuelError::client_build(error.to_string())),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

// System proxy discovery can panic inside reqwest. The default hook would
// still print the panic, so it is swapped out while a build is attempted.
static PANIC_HOOK_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn try_build_client(
    cookie_jar: Option<Arc<Jar>>,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
    env_proxy_only: bool,
) -> Result<Client, BuildClientFailure> {
    let _guard = PANIC_HOOK_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let previous_hook = take_hook();
    set_hook(Box::new(|_| {}));
    let outcome = catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_client_builder(cookie_jar, connect_timeout_secs, read_timeout_secs);
        if env_proxy_only {
            builder = with_env_proxies(builder.no_proxy());
        }
        builder.build()
    }));
    set_hook(previous_hook);

    match outcome {
        Ok(built) => built.map_err(BuildClientFailure::Build),
        Err(_) => Err(BuildClientFailure::Panic),
    }
}

fn base_client_builder(
    cookie_jar: Option<Arc<Jar>>,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
) -> ClientBuilder {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .read_timeout(Duration::from_secs(read_timeout_secs))
        .redirect(redirect::Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .user_agent(user_agent::default_user_agent());
    if let Some(jar) = cookie_jar {
        builder = builder.cookie_provider(jar);
    }
    builder
}

/// Applies `HTTPS_PROXY` / `HTTP_PROXY` (or `ALL_PROXY`) from the environment.
fn with_env_proxies(mut builder: ClientBuilder) -> ClientBuilder {
    let lookup = |names: [&str; 4]| {
        names.iter().find_map(|name| {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
    };
    if let Some(proxy) = lookup(["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"])
        .and_then(|proxy| Proxy::https(&proxy).ok())
    {
        builder = builder.proxy(proxy);
    }
    if let Some(proxy) = lookup(["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"])
        .and_then(|proxy| Proxy::http(&proxy).ok())
    {
        builder = builder.proxy(proxy);
    }
    builder
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use url::Url;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::Method;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    #[test]
    fn test_env_proxy_fallback_builds_a_client() {
        assert!(try_build_client(None, 5, 5, true).is_ok());
    }

    #[tokio::test]
    async fn test_read_timeout_allows_slow_body_that_keeps_arriving() {
        if crate::test_support::socket_guard::should_skip_socket_bound_test() {
            return;
        }
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};

            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = [0_u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\n")
                .await;
            for _ in 0..6 {
                tokio::time::sleep(Duration::from_millis(300)).await;
                if socket.write_all(b"z").await.is_err() {
                    return;
                }
            }
        });

        // 1.8 s of body against a 1 s read timeout.
        let request = Request::new(Method::Get, Url::parse(&format!("http://{addr}/slow")).unwrap());
        let client = HttpClient::new_with_timeouts(2, 1);
        let response = client.send(&request).await.unwrap();
        let body = response.bytes().await.unwrap();
        assert_eq!(body.as_ref(), b"zzzzzz");
    }

    #[test]
    fn test_encode_form_escapes_reserved_characters() {
        let encoded = encode_form(&[
            ("key".to_string(), "value".to_string()),
            ("q".to_string(), "a&b c".to_string()),
        ]);
        assert_eq!(encoded, "key=value&q=a%26b+c");
    }

    #[tokio::test]
    async fn test_send_get_applies_headers_and_query() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/get"))
            .and(header("foo", "bar"))
            .and(query_param("key", "value"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut headers = BTreeMap::new();
        headers.insert("foo".to_string(), "bar".to_string());
        let request = Request::new(
            Method::Get,
            Url::parse(&format!("{}/get", mock_server.uri())).unwrap(),
        )
        .with_headers(headers)
        .with_parameters([("key", "value")]);

        let response = HttpClient::new().send(&request).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_send_post_encodes_form_body() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("POST"))
            .and(path("/post"))
            .and(header("content-type", FORM_CONTENT_TYPE))
            .and(body_string("key=value"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let request = Request::new(
            Method::Post,
            Url::parse(&format!("{}/post", mock_server.uri())).unwrap(),
        )
        .with_parameters([("key", "value")]);

        let response = HttpClient::new().send(&request).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_send_does_not_classify_status() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("DELETE"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&mock_server)
            .await;

        let request = Request::new(
            Method::Delete,
            Url::parse(&format!("{}/gone", mock_server.uri())).unwrap(),
        );
        let response = HttpClient::new().send(&request).await.unwrap();
        assert_eq!(response.status().as_u16(), 410);
    }

    #[tokio::test]
    async fn test_send_connection_refused_is_connection_error() {
        // Port 9 (discard) on localhost is almost never listening.
        let request = Request::new(Method::Get, Url::parse("http://127.0.0.1:9/").unwrap());
        let client = HttpClient::new_with_timeouts(2, 2);
        let error = client.send(&request).await.unwrap_err();
        assert!(matches!(error, FuelError::Connection { .. }), "{error:?}");
    }

    #[tokio::test]
    async fn test_cookie_jar_replays_set_cookie() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "session=abc; Path=/"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("cookie", "session=abc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = HttpClient::with_cookie_jar(Arc::new(Jar::default()));
        let login = Request::new(
            Method::Get,
            Url::parse(&format!("{}/login", mock_server.uri())).unwrap(),
        );
        let me = Request::new(
            Method::Get,
            Url::parse(&format!("{}/me", mock_server.uri())).unwrap(),
        );

        client.send(&login).await.unwrap();
        let response = client.send(&me).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_default_user_agent_is_sent() {
        use wiremock::{Match, Request as MockRequest};

        struct DefaultUaMatcher;

        impl Match for DefaultUaMatcher {
            fn matches(&self, request: &MockRequest) -> bool {
                request
                    .headers
                    .get("User-Agent")
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|ua| ua.starts_with("fuel/"))
            }
        }

        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("HEAD"))
            .and(path("/ua"))
            .and(DefaultUaMatcher)
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let request = Request::new(
            Method::Head,
            Url::parse(&format!("{}/ua", mock_server.uri())).unwrap(),
        );
        let response = HttpClient::new().send(&request).await.unwrap();
        assert_eq!(response.status().as_u16(), 204);
    }
}
