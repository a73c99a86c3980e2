//! Shared request defaults and the context that owns them.
//!
//! A [`ClientContext`] holds the base path, additional headers, additional
//! parameters, client engine and status policy applied to every request it
//! builds. Setters swap in a fresh [`Defaults`] snapshot; builders capture the
//! snapshot current at selector time, so requests already built or in flight
//! never observe later changes.
//!
//! A setter racing with a concurrent build is not ordered against it: the
//! build sees either the previous or the new snapshot, never a mix.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::debug;

use crate::builder::{
    DownloadBuilder, RequestBuilder, RequestConvertible, Target, insert_header,
};
use crate::engine::{Engine, StatusPolicy};
use crate::settings::Settings;
use crate::{FuelError, HttpClient, Method};

/// Immutable snapshot of the defaults merged into built requests.
#[derive(Debug, Clone, Default)]
pub struct Defaults {
    base_path: Option<String>,
    additional_headers: BTreeMap<String, String>,
    additional_params: BTreeMap<String, String>,
    client: HttpClient,
    status_policy: StatusPolicy,
}

impl Defaults {
    /// Base path relative targets are resolved against.
    #[must_use]
    pub fn base_path(&self) -> Option<&str> {
        self.base_path.as_deref()
    }

    /// Headers added to every merged request.
    #[must_use]
    pub fn additional_headers(&self) -> &BTreeMap<String, String> {
        &self.additional_headers
    }

    /// Parameters added to every merged request.
    #[must_use]
    pub fn additional_params(&self) -> &BTreeMap<String, String> {
        &self.additional_params
    }

    /// Client engine used to execute requests.
    #[must_use]
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Status codes accepted as success.
    #[must_use]
    pub fn status_policy(&self) -> StatusPolicy {
        self.status_policy
    }

    /// Engine executing requests built from this snapshot.
    #[must_use]
    pub fn engine(&self) -> Engine {
        Engine::new(self.client.clone(), self.status_policy)
    }
}

/// Owner of the request defaults and entry point for building calls.
///
/// # Example
///
/// ```no_run
/// use fuel::ClientContext;
///
/// # async fn example() {
/// let context = ClientContext::new();
/// context.set_base_path("https://httpbin.org");
/// context.set_additional_headers([("foo", "bar")]);
///
/// let completion = context.get("/get").response_string().await;
/// match completion.result {
///     Ok(body) => println!("{body}"),
///     Err(error) => eprintln!("request failed: {error}"),
/// }
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ClientContext {
    defaults: RwLock<Arc<Defaults>>,
}

impl ClientContext {
    /// Creates a context with no base path, no extra headers or parameters,
    /// a default [`HttpClient`] and the default status policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context executing requests through `client`.
    #[must_use]
    pub fn with_client(client: HttpClient) -> Self {
        let context = Self::new();
        context.set_client(client);
        context
    }

    /// Creates a context from loaded [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns [`FuelError::ClientBuild`] when the configured timeouts
    /// cannot be applied to a client.
    pub fn from_settings(settings: &Settings) -> Result<Self, FuelError> {
        let client = HttpClient::try_new(
            None,
            settings.connect_timeout_secs(),
            settings.read_timeout_secs(),
        )?;
        let context = Self::with_client(client);
        if let Some(base_path) = settings.base_path() {
            context.set_base_path(base_path);
        }
        context.set_additional_headers(settings.headers().clone());
        context.set_additional_params(settings.params().clone());
        Ok(context)
    }

    /// Returns the current defaults.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Defaults> {
        let guard = self.defaults.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    fn update(&self, apply: impl FnOnce(&mut Defaults)) {
        let mut guard = self.defaults.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Defaults::clone(&guard);
        apply(&mut next);
        *guard = Arc::new(next);
    }

    /// Sets the base path relative targets are appended to.
    ///
    /// An empty string clears the base path.
    pub fn set_base_path(&self, base_path: impl Into<String>) {
        let base_path = base_path.into();
        debug!(base_path = %base_path, "setting base path");
        self.update(|defaults| {
            defaults.base_path = Some(base_path).filter(|path| !path.is_empty());
        });
    }

    /// Removes the base path.
    pub fn clear_base_path(&self) {
        self.update(|defaults| defaults.base_path = None);
    }

    /// Replaces the additional headers.
    pub fn set_additional_headers<I, K, V>(&self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let headers = headers.into_iter().fold(BTreeMap::new(), |mut map, (k, v)| {
            insert_header(&mut map, k.into(), v.into());
            map
        });
        debug!(count = headers.len(), "setting additional headers");
        self.update(|defaults| defaults.additional_headers = headers);
    }

    /// Replaces the additional parameters.
    pub fn set_additional_params<I, K, V>(&self, params: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let params = collect_map(params);
        debug!(count = params.len(), "setting additional params");
        self.update(|defaults| defaults.additional_params = params);
    }

    /// Replaces the client engine.
    pub fn set_client(&self, client: HttpClient) {
        self.update(|defaults| defaults.client = client);
    }

    /// Replaces the status policy.
    pub fn set_status_policy(&self, status_policy: StatusPolicy) {
        self.update(|defaults| defaults.status_policy = status_policy);
    }

    /// Engine for the current defaults.
    #[must_use]
    pub fn engine(&self) -> Engine {
        self.snapshot().engine()
    }

    /// Starts a request with an explicit method.
    pub fn call(&self, method: Method, target: impl Into<Target>) -> RequestBuilder {
        RequestBuilder::new(self.snapshot(), method, target.into())
    }

    /// Starts a `GET` request.
    pub fn get(&self, target: impl Into<Target>) -> RequestBuilder {
        self.call(Method::Get, target)
    }

    /// Starts a `POST` request.
    pub fn post(&self, target: impl Into<Target>) -> RequestBuilder {
        self.call(Method::Post, target)
    }

    /// Starts a `PUT` request.
    pub fn put(&self, target: impl Into<Target>) -> RequestBuilder {
        self.call(Method::Put, target)
    }

    /// Starts a `DELETE` request.
    pub fn delete(&self, target: impl Into<Target>) -> RequestBuilder {
        self.call(Method::Delete, target)
    }

    /// Starts a `PATCH` request.
    pub fn patch(&self, target: impl Into<Target>) -> RequestBuilder {
        self.call(Method::Patch, target)
    }

    /// Starts a `HEAD` request.
    pub fn head(&self, target: impl Into<Target>) -> RequestBuilder {
        self.call(Method::Head, target)
    }

    /// Starts a streamed `GET` download.
    pub fn download(&self, target: impl Into<Target>) -> DownloadBuilder {
        DownloadBuilder::new(self.call(Method::Get, target))
    }

    /// Starts a call from a pre-built request, sent exactly as provided.
    pub fn request(&self, convertible: &impl RequestConvertible) -> RequestBuilder {
        let request = convertible.request();
        let method = request.method();
        self.call(method, Target::RequestConvertible(Box::new(request)))
    }
}

fn collect_map<I, K, V>(entries: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

static SHARED: OnceLock<ClientContext> = OnceLock::new();

/// Process-wide default context, created empty on first use.
pub fn shared() -> &'static ClientContext {
    SHARED.get_or_init(ClientContext::new)
}

/// Starts a `GET` request on the [`shared`] context.
pub fn get(target: impl Into<Target>) -> RequestBuilder {
    shared().get(target)
}

/// Starts a `POST` request on the [`shared`] context.
pub fn post(target: impl Into<Target>) -> RequestBuilder {
    shared().post(target)
}

/// Starts a `PUT` request on the [`shared`] context.
pub fn put(target: impl Into<Target>) -> RequestBuilder {
    shared().put(target)
}

/// Starts a `DELETE` request on the [`shared`] context.
pub fn delete(target: impl Into<Target>) -> RequestBuilder {
    shared().delete(target)
}

/// Starts a `PATCH` request on the [`shared`] context.
pub fn patch(target: impl Into<Target>) -> RequestBuilder {
    shared().patch(target)
}

/// Starts a `HEAD` request on the [`shared`] context.
pub fn head(target: impl Into<Target>) -> RequestBuilder {
    shared().head(target)
}

/// Starts a streamed download on the [`shared`] context.
pub fn download(target: impl Into<Target>) -> DownloadBuilder {
    shared().download(target)
}

/// Starts a call from a pre-built request on the [`shared`] context.
pub fn request(convertible: &impl RequestConvertible) -> RequestBuilder {
    shared().request(convertible)
}
