//! Execution engine: dispatches requests on Tokio tasks and resolves each
//! call into exactly one [`Completion`].
//!
//! # Overview
//!
//! [`Engine::execute`] spawns a worker task and returns a [`Call`]
//! immediately. The worker sends the request, reads the body, classifies the
//! status through the [`StatusPolicy`] and decodes the body; every failure is
//! captured and becomes the `Err` side of the completion. A call resolves
//! exactly once, including when the worker panics or is cancelled.
//!
//! # Cancellation
//!
//! Cancelling a call always yields a terminal completion carrying
//! [`FuelError::Cancelled`], even when cancellation happens before any I/O.
//! Cancellation is cooperative: it is observed before sending, while waiting
//! for headers, and between body chunks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::deserialize::Deserializable;
use crate::download::{self, Download, ProgressFn};
use crate::{FuelError, HttpClient, Request, Response};

/// Range of status codes classified as success.
///
/// The default accepts `200..=299`. Redirects are followed by the client, so
/// a 3xx only reaches the policy when the redirect limit is exhausted or the
/// response has no usable `Location`; it is a failure by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    min: u16,
    max: u16,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self { min: 200, max: 299 }
    }
}

impl StatusPolicy {
    /// Accepts every status in `min..=max`.
    #[must_use]
    pub fn range(min: u16, max: u16) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    /// Accepts 2xx and 3xx.
    #[must_use]
    pub fn allow_redirects() -> Self {
        Self::range(200, 399)
    }

    /// Whether `status` counts as success.
    #[must_use]
    pub fn accepts(&self, status: u16) -> bool {
        (self.min..=self.max).contains(&status)
    }
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation flag shared between a caller and a worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    /// Creates an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::SeqCst) {
            self.state.notify.notify_waiters();
        }
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel() is not missed.
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Terminal outcome of one call.
#[derive(Debug)]
pub struct Completion<T> {
    /// The request that was executed; `None` only when it could not be built.
    pub request: Option<Request>,
    /// The response, whenever status and headers were received.
    pub response: Option<Response>,
    /// Decoded payload or the failure that ended the call.
    pub result: Result<T, FuelError>,
}

impl<T> Completion<T> {
    /// Whether the call succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Splits into `(request, response, result)`.
    pub fn into_parts(self) -> (Option<Request>, Option<Response>, Result<T, FuelError>) {
        (self.request, self.response, self.result)
    }
}

/// Handle to an in-flight call; resolves to its [`Completion`] exactly once.
///
/// Dropping a `Call` does not stop the worker.
#[must_use = "a call does nothing observable unless awaited or given a completion callback"]
pub struct Call<T> {
    handle: JoinHandle<Completion<T>>,
    cancel: CancelToken,
    request: Option<Request>,
    url: String,
}

impl<T: Send + 'static> Call<T> {
    /// Requests cancellation of the call.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this call; usable after the call is moved.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Delivers the completion to `callback` exactly once, on a worker task.
    ///
    /// Returns the token that cancels the call.
    pub fn on_complete<F>(self, callback: F) -> CancelToken
    where
        F: FnOnce(Option<Request>, Option<Response>, Result<T, FuelError>) + Send + 'static,
    {
        let token = self.cancel_token();
        tokio::spawn(async move {
            let (request, response, result) = self.await.into_parts();
            callback(request, response, result);
        });
        token
    }
}

impl<T> Future for Call<T> {
    type Output = Completion<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(completion)) => Poll::Ready(completion),
            Poll::Ready(Err(join_error)) => {
                warn!(url = %this.url, error = %join_error, "worker task failed");
                Poll::Ready(Completion {
                    request: this.request.take(),
                    response: None,
                    result: Err(FuelError::task_failed(
                        this.url.as_str(),
                        join_error.to_string(),
                    )),
                })
            }
        }
    }
}

/// Dispatches requests on Tokio tasks.
///
/// Must be used from within a Tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    client: HttpClient,
    status_policy: StatusPolicy,
}

impl Engine {
    /// Creates an engine.
    #[must_use]
    pub fn new(client: HttpClient, status_policy: StatusPolicy) -> Self {
        Self {
            client,
            status_policy,
        }
    }

    /// Status policy in effect.
    #[must_use]
    pub fn status_policy(&self) -> StatusPolicy {
        self.status_policy
    }

    /// Executes `request` in memory and decodes the body with `deserializer`.
    ///
    /// Returns immediately; the work happens on a spawned task. A destination
    /// attached to the request is ignored here, see [`Engine::download`].
    #[instrument(level = "debug", skip(self, request, deserializer), fields(method = %request.method(), url = %request.url()))]
    pub fn execute<D: Deserializable>(&self, request: Request, deserializer: D) -> Call<D::Output> {
        let cancel = CancelToken::new();
        let client = self.client.clone();
        let policy = self.status_policy;
        let worker_cancel = cancel.clone();
        let worker_request = request.clone();

        let handle = tokio::spawn(async move {
            let (response, result) =
                perform(&client, policy, &worker_request, deserializer, &worker_cancel).await;
            log_outcome(&worker_request, response.as_ref(), &result);
            Completion {
                request: Some(worker_request),
                response,
                result,
            }
        });

        Call {
            handle,
            cancel,
            url: request.url().to_string(),
            request: Some(request),
        }
    }

    /// Streams `request` to its destination, reporting progress.
    ///
    /// Returns immediately; the work happens on a spawned task.
    #[instrument(level = "debug", skip(self, request, progress), fields(url = %request.url()))]
    pub fn download(&self, request: Request, progress: Option<ProgressFn>) -> Call<Download> {
        let cancel = CancelToken::new();
        let client = self.client.clone();
        let policy = self.status_policy;
        let worker_cancel = cancel.clone();
        let worker_request = request.clone();

        let handle = tokio::spawn(async move {
            let (response, result) = download::run_download(
                &client,
                policy,
                &worker_request,
                progress.as_ref(),
                &worker_cancel,
            )
            .await;
            log_outcome(&worker_request, response.as_ref(), &result);
            Completion {
                request: Some(worker_request),
                response,
                result,
            }
        });

        Call {
            handle,
            cancel,
            url: request.url().to_string(),
            request: Some(request),
        }
    }

    /// Call that fails with `error` without touching the network.
    ///
    /// Used when a request cannot be built; the completion still arrives
    /// asynchronously like any other.
    pub fn reject<T: Send + 'static>(&self, error: FuelError) -> Call<T> {
        debug!(error = %error, "rejecting call before dispatch");
        let url = match &error {
            FuelError::InvalidUrl { url } => url.clone(),
            _ => String::new(),
        };
        let handle = tokio::spawn(async move {
            Completion {
                request: None,
                response: None,
                result: Err(error),
            }
        });
        Call {
            handle,
            cancel: CancelToken::new(),
            request: None,
            url,
        }
    }
}

fn log_outcome<T>(request: &Request, response: Option<&Response>, result: &Result<T, FuelError>) {
    let status = response.map(Response::status_code);
    match result {
        Ok(_) => debug!(method = %request.method(), url = %request.url(), ?status, "call succeeded"),
        Err(error) => debug!(
            method = %request.method(),
            url = %request.url(),
            ?status,
            error = %error,
            "call failed"
        ),
    }
}

/// Sends the request, waiting for headers unless cancelled first.
pub(crate) async fn send_cancellable(
    client: &HttpClient,
    request: &Request,
    cancel: &CancelToken,
) -> Result<reqwest::Response, FuelError> {
    if cancel.is_cancelled() {
        return Err(FuelError::cancelled(request.url().as_str()));
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(FuelError::cancelled(request.url().as_str())),
        reply = client.send(request) => reply,
    }
}

/// Reads the remaining body into memory, checking for cancellation between chunks.
pub(crate) async fn read_body(
    reply: reqwest::Response,
    cancel: &CancelToken,
) -> Result<Bytes, FuelError> {
    let url = reply.url().to_string();
    let mut stream = reply.bytes_stream();
    let mut body = BytesMut::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FuelError::cancelled(url)),
            next = stream.next() => match next {
                None => break,
                Some(Ok(chunk)) => body.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(FuelError::connection(url, e)),
            },
        }
    }

    Ok(body.freeze())
}

#[allow(clippy::needless_pass_by_value)]
async fn perform<D: Deserializable>(
    client: &HttpClient,
    policy: StatusPolicy,
    request: &Request,
    deserializer: D,
    cancel: &CancelToken,
) -> (Option<Response>, Result<D::Output, FuelError>) {
    let reply = match send_cancellable(client, request, cancel).await {
        Ok(reply) => reply,
        Err(error) => return (None, Err(error)),
    };

    let head = Response::from_head(&reply);
    debug!(status = head.status_code(), "received response headers");

    let body = match read_body(reply, cancel).await {
        Ok(body) => body,
        Err(error) => return (Some(head), Err(error)),
    };
    let response = head.with_body(body);

    if !policy.accepts(response.status_code()) {
        let error = FuelError::http_status(request.url().as_str(), response.clone());
        return (Some(response), Err(error));
    }

    let result = deserializer.deserialize(&response);
    (Some(response), result)
}
