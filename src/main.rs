//! CLI entry point for the fuel HTTP client.

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use fuel::{ClientContext, Completion, Download, FuelError, Response, Settings};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info};

mod cli;

use cli::{Args, Command, DownloadArgs, RequestArgs};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let settings = load_settings(&args)?;
    let context = ClientContext::from_settings(&settings).context("failed to build HTTP client")?;

    let succeeded = match args.command.request() {
        Some((method, request)) => run_request(&context, method, request, args.json).await?,
        None => match &args.command {
            Command::Download(download) => run_download(&context, download, &args).await?,
            _ => false,
        },
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Settings file values overridden by command line flags.
fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = match Settings::load_default().context("failed to load settings file")? {
        Some((path, settings)) => {
            debug!(path = %path.display(), "loaded settings file");
            settings
        }
        None => Settings::default(),
    };

    if let Some(base_path) = &args.base_path {
        settings.set_base_path(base_path.clone());
    }
    if let Some(secs) = args.connect_timeout {
        settings.set_connect_timeout_secs(secs);
    }
    if let Some(secs) = args.read_timeout {
        settings.set_read_timeout_secs(secs);
    }
    for (name, value) in &args.headers {
        settings.insert_header(name.clone(), value.clone());
    }
    for (key, value) in &args.params {
        settings.insert_param(key.clone(), value.clone());
    }
    Ok(settings)
}

#[derive(Serialize)]
struct Summary<'a> {
    method: Option<String>,
    url: Option<String>,
    status: Option<u16>,
    headers: Option<&'a std::collections::BTreeMap<String, Vec<String>>>,
    body: Option<String>,
    path: Option<String>,
    bytes: Option<u64>,
    error: Option<String>,
    error_kind: Option<String>,
}

impl<'a> Summary<'a> {
    fn new<T>(completion: &'a Completion<T>) -> Self {
        let response = completion.response.as_ref();
        let error = completion.result.as_ref().err();
        Self {
            method: completion
                .request
                .as_ref()
                .map(|request| request.method().to_string()),
            url: completion
                .request
                .as_ref()
                .map(|request| request.url().to_string()),
            status: response.map(Response::status_code),
            headers: response.map(Response::headers),
            body: None,
            path: None,
            bytes: None,
            error: error.map(ToString::to_string),
            error_kind: error.map(|e| format!("{:?}", e.kind())),
        }
    }
}

async fn run_request(
    context: &ClientContext,
    method: fuel::Method,
    args: &RequestArgs,
    json: bool,
) -> Result<bool> {
    let mut builder = context.call(method, args.target.as_str());
    if let Some(data) = &args.data {
        builder = builder.body(data.clone());
    }

    let completion = builder.response_bytes().await;
    let succeeded = completion.is_success();

    if json {
        let mut summary = Summary::new(&completion);
        summary.body = completion
            .result
            .as_ref()
            .ok()
            .map(|body| String::from_utf8_lossy(body).into_owned());
        print_json(&summary)?;
    } else {
        match &completion.result {
            Ok(body) => {
                if let Some(response) = &completion.response {
                    info!(status = response.status_code(), url = %response.url(), "request complete");
                }
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(body).context("failed to write body")?;
                stdout.flush().context("failed to flush stdout")?;
            }
            Err(error) => report_failure(error),
        }
    }
    Ok(succeeded)
}

async fn run_download(context: &ClientContext, args: &DownloadArgs, cli: &Args) -> Result<bool> {
    let bar = if cli.quiet || cli.json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec})",
        )
        .context("invalid progress template")?
        .progress_chars("=> "),
    );

    let output = args.output.clone();
    let progress_bar = bar.clone();
    let completion: Completion<Download> = context
        .download(args.target.as_str())
        .destination(move |_, _| Ok(output.clone()))
        .progress(move |read, total| {
            if let Ok(total) = u64::try_from(total) {
                progress_bar.set_length(total);
            }
            progress_bar.set_position(read);
        })
        .send()
        .await;
    bar.finish_and_clear();

    let succeeded = completion.is_success();
    if cli.json {
        let mut summary = Summary::new(&completion);
        if let Ok(download) = &completion.result {
            summary.path = Some(download.path.display().to_string());
            summary.bytes = Some(download.bytes_read);
        }
        print_json(&summary)?;
    } else {
        match &completion.result {
            Ok(download) => info!(
                path = %download.path.display(),
                bytes = download.bytes_read,
                "download complete"
            ),
            Err(error) => report_failure(error),
        }
    }
    Ok(succeeded)
}

fn print_json(summary: &Summary<'_>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(summary).context("failed to render JSON")?;
    println!("{rendered}");
    Ok(())
}

fn report_failure(error: &FuelError) {
    eprintln!("error: {error}");
    if let Some(response) = error.response()
        && !response.body().is_empty()
    {
        eprintln!("{}", String::from_utf8_lossy(response.body()));
    }
}
