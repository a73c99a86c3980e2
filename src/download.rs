//! Streamed downloads with progress accounting.
//!
//! A download walks `Pending -> Connecting -> Streaming` and ends in exactly
//! one of `Completed`, `Failed` or `Cancelled`. The destination resolver runs
//! lazily once the first body chunk arrives, so it can look at the response
//! headers. Progress is reported after every chunk of at most
//! [`DOWNLOAD_CHUNK_SIZE`](crate::constants::DOWNLOAD_CHUNK_SIZE) bytes.
//!
//! A partially written file is left in place on failure; callers needing
//! atomicity should write to a temporary path and rename on success.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::constants::{DOWNLOAD_CHUNK_SIZE, UNKNOWN_TOTAL_BYTES};
use crate::engine::{self, CancelToken, StatusPolicy};
use crate::{FuelError, HttpClient, Request, Response};

/// Progress callback: `(bytes_read, total_bytes)`, `total_bytes` is `-1` while unknown.
pub type ProgressFn = Arc<dyn Fn(u64, i64) + Send + Sync>;

/// Lifecycle of one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Pending,
    Connecting,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadState {
    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use DownloadState::{Cancelled, Completed, Connecting, Failed, Pending, Streaming};
        matches!(
            (self, next),
            (Pending, Connecting | Cancelled)
                | (Connecting, Streaming | Failed | Cancelled)
                | (Streaming, Completed | Failed | Cancelled)
        )
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Cumulative byte counts of one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    bytes_read: u64,
    total_bytes: i64,
}

impl ProgressState {
    /// Starts at zero; `content_length` of `None` records an unknown total.
    #[must_use]
    pub fn new(content_length: Option<u64>) -> Self {
        let total_bytes = content_length
            .and_then(|len| i64::try_from(len).ok())
            .unwrap_or(UNKNOWN_TOTAL_BYTES);
        Self {
            bytes_read: 0,
            total_bytes,
        }
    }

    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Expected size, `-1` when unknown.
    #[must_use]
    pub fn total_bytes(&self) -> i64 {
        self.total_bytes
    }

    #[must_use]
    pub fn is_total_known(&self) -> bool {
        self.total_bytes >= 0
    }

    fn advance(&mut self, len: usize) {
        self.bytes_read = self.bytes_read.saturating_add(len as u64);
    }

    /// Fixes an unknown total to the bytes actually read.
    fn finalize(&mut self) {
        if !self.is_total_known() {
            self.total_bytes = i64::try_from(self.bytes_read).unwrap_or(i64::MAX);
        }
    }
}

/// Successful result of a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// File the body was written to.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes_read: u64,
    /// Final total, equal to `bytes_read`.
    pub total_bytes: u64,
}

struct Tracker<'a> {
    url: &'a str,
    state: DownloadState,
}

impl Tracker<'_> {
    fn transition(&mut self, next: DownloadState) {
        if self.state.can_transition_to(next) {
            debug!(url = self.url, from = %self.state, to = %next, "download state");
        } else {
            warn!(url = self.url, from = %self.state, to = %next, "unexpected download transition");
        }
        self.state = next;
    }
}

struct Reporter<'a> {
    callback: Option<&'a ProgressFn>,
    last: Option<(u64, i64)>,
}

impl Reporter<'_> {
    fn report(&mut self, progress: &ProgressState) {
        let snapshot = (progress.bytes_read(), progress.total_bytes());
        if let Some(callback) = self.callback {
            callback(snapshot.0, snapshot.1);
        }
        self.last = Some(snapshot);
    }

    fn report_final(&mut self, progress: &ProgressState) {
        if self.last != Some((progress.bytes_read(), progress.total_bytes())) {
            self.report(progress);
        }
    }
}

/// Output file opened on first use.
struct Sink {
    path: PathBuf,
    writer: BufWriter<File>,
}

async fn open_sink(request: &Request, head: &Response) -> Result<Sink, FuelError> {
    let url = request.url().as_str();
    let resolver = request.destination().ok_or_else(|| {
        FuelError::destination(
            url,
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no destination resolver configured",
            ),
        )
    })?;
    let path = resolver(head, request.url()).map_err(|e| FuelError::destination(url, e))?;
    debug!(url, path = %path.display(), "resolved download destination");

    let file = File::create(&path)
        .await
        .map_err(|e| FuelError::io(path.clone(), e))?;
    Ok(Sink {
        path,
        writer: BufWriter::new(file),
    })
}

async fn write_chunked(
    sink: &mut Sink,
    chunk: &[u8],
    progress: &mut ProgressState,
    reporter: &mut Reporter<'_>,
) -> Result<(), FuelError> {
    for piece in chunk.chunks(DOWNLOAD_CHUNK_SIZE) {
        sink.writer
            .write_all(piece)
            .await
            .map_err(|e| FuelError::io(sink.path.clone(), e))?;
        progress.advance(piece.len());
        reporter.report(progress);
    }
    Ok(())
}

/// Runs one download to a terminal state.
///
/// The returned response has an empty body unless the status was rejected,
/// in which case the body is read into memory and attached.
pub(crate) async fn run_download(
    client: &HttpClient,
    policy: StatusPolicy,
    request: &Request,
    progress_callback: Option<&ProgressFn>,
    cancel: &CancelToken,
) -> (Option<Response>, Result<Download, FuelError>) {
    let url = request.url().as_str();
    let mut tracker = Tracker {
        url,
        state: DownloadState::Pending,
    };

    if cancel.is_cancelled() {
        tracker.transition(DownloadState::Cancelled);
        return (None, Err(FuelError::cancelled(url)));
    }

    tracker.transition(DownloadState::Connecting);
    let reply = match engine::send_cancellable(client, request, cancel).await {
        Ok(reply) => reply,
        Err(error) => {
            tracker.transition(if error.is_cancelled() {
                DownloadState::Cancelled
            } else {
                DownloadState::Failed
            });
            return (None, Err(error));
        }
    };

    let head = Response::from_head(&reply);
    if !policy.accepts(head.status_code()) {
        tracker.transition(DownloadState::Failed);
        return match engine::read_body(reply, cancel).await {
            Ok(body) => {
                let response = head.with_body(body);
                let error = FuelError::http_status(url, response.clone());
                (Some(response), Err(error))
            }
            Err(error) => (Some(head), Err(error)),
        };
    }

    tracker.transition(DownloadState::Streaming);
    let mut progress = ProgressState::new(reply.content_length());
    let mut reporter = Reporter {
        callback: progress_callback,
        last: None,
    };
    let result = stream_body(reply, request, &head, cancel, &mut progress, &mut reporter).await;

    match result {
        Ok(path) => {
            progress.finalize();
            reporter.report_final(&progress);
            tracker.transition(DownloadState::Completed);
            info!(url, path = %path.display(), bytes = progress.bytes_read(), "download complete");
            let download = Download {
                path,
                bytes_read: progress.bytes_read(),
                total_bytes: progress.bytes_read(),
            };
            (Some(head), Ok(download))
        }
        Err(error) => {
            tracker.transition(if error.is_cancelled() {
                DownloadState::Cancelled
            } else {
                DownloadState::Failed
            });
            (Some(head), Err(error))
        }
    }
}

/// Streams the body into the destination; returns the file path.
async fn stream_body(
    reply: reqwest::Response,
    request: &Request,
    head: &Response,
    cancel: &CancelToken,
    progress: &mut ProgressState,
    reporter: &mut Reporter<'_>,
) -> Result<PathBuf, FuelError> {
    let mut sink: Option<Sink> = None;

    if let Err(error) = pump(reply, request, head, cancel, &mut sink, progress, reporter).await {
        // Bytes already reported through progress must reach the partial file.
        if let Some(sink) = sink.as_mut()
            && let Err(flush_error) = sink.writer.flush().await
        {
            warn!(path = %sink.path.display(), error = %flush_error, "failed to flush partial download");
        }
        return Err(error);
    }

    // Empty body: the file must still exist.
    let mut sink = match sink {
        Some(sink) => sink,
        None => open_sink(request, head).await?,
    };
    sink.writer
        .flush()
        .await
        .map_err(|e| FuelError::io(sink.path.clone(), e))?;

    if let Ok(expected) = u64::try_from(progress.total_bytes())
        && expected != progress.bytes_read()
    {
        return Err(FuelError::incomplete(
            sink.path,
            expected,
            progress.bytes_read(),
        ));
    }

    Ok(sink.path)
}

/// Moves body chunks into `sink`, opening it on the first non-empty chunk.
async fn pump(
    reply: reqwest::Response,
    request: &Request,
    head: &Response,
    cancel: &CancelToken,
    sink: &mut Option<Sink>,
    progress: &mut ProgressState,
    reporter: &mut Reporter<'_>,
) -> Result<(), FuelError> {
    let url = request.url().as_str();
    let mut stream = reply.bytes_stream();

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FuelError::cancelled(url)),
            next = stream.next() => next,
        };
        let chunk = match next {
            None => return Ok(()),
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(FuelError::connection(url, e)),
        };
        if chunk.is_empty() {
            continue;
        }
        if sink.is_none() {
            *sink = Some(open_sink(request, head).await?);
        }
        if let Some(sink) = sink.as_mut() {
            write_chunked(sink, &chunk, progress, reporter).await?;
        }
    }
}
