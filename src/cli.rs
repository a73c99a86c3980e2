//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use fuel::Method;

/// Issue HTTP requests and stream downloads from the command line.
///
/// Relative targets are resolved against `--base-path` or the `base_path`
/// entry of the settings file.
#[derive(Parser, Debug)]
#[command(name = "fuel")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Base URL for relative targets
    #[arg(long, value_name = "URL")]
    pub base_path: Option<String>,

    /// Additional header sent with every request (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Additional parameter sent with every request (repeatable)
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Connect timeout in seconds (1-3600)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub connect_timeout: Option<u64>,

    /// Read timeout in seconds (1-3600)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub read_timeout: Option<u64>,

    /// Print a JSON summary instead of the raw body
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a GET request
    Get(RequestArgs),
    /// Send a POST request
    Post(RequestArgs),
    /// Send a PUT request
    Put(RequestArgs),
    /// Send a DELETE request
    Delete(RequestArgs),
    /// Send a PATCH request
    Patch(RequestArgs),
    /// Send a HEAD request
    Head(RequestArgs),
    /// Stream a response body into a file
    Download(DownloadArgs),
}

impl Command {
    /// Method and arguments of the in-memory request subcommands.
    #[must_use]
    pub fn request(&self) -> Option<(Method, &RequestArgs)> {
        match self {
            Self::Get(args) => Some((Method::Get, args)),
            Self::Post(args) => Some((Method::Post, args)),
            Self::Put(args) => Some((Method::Put, args)),
            Self::Delete(args) => Some((Method::Delete, args)),
            Self::Patch(args) => Some((Method::Patch, args)),
            Self::Head(args) => Some((Method::Head, args)),
            Self::Download(_) => None,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct RequestArgs {
    /// Path relative to the base path, or an absolute URL
    pub target: String,

    /// Explicit request body; parameters then go to the query string
    #[arg(short, long, value_name = "BODY")]
    pub data: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct DownloadArgs {
    /// Path relative to the base path, or an absolute URL
    pub target: String,

    /// Output file
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("header name must not be empty".to_string());
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err("parameter key must not be empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_get_parses_target() {
        let args = Args::try_parse_from(["fuel", "get", "/get"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        let (method, request) = args.command.request().unwrap();
        assert_eq!(method, Method::Get);
        assert_eq!(request.target, "/get");
        assert!(request.data.is_none());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["fuel", "-vv", "get", "/"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["fuel", "get", "/", "--verbose"]).unwrap();
        assert_eq!(args.verbose, 1);
    }

    #[test]
    fn test_cli_headers_and_params_are_repeatable() {
        let args = Args::try_parse_from([
            "fuel",
            "-H",
            "X-One: 1",
            "--header",
            "X-Two:2",
            "-p",
            "a=b=c",
            "post",
            "/post",
            "--data",
            "{}",
        ])
        .unwrap();
        assert_eq!(
            args.headers,
            vec![
                ("X-One".to_string(), "1".to_string()),
                ("X-Two".to_string(), "2".to_string())
            ]
        );
        assert_eq!(args.params, vec![("a".to_string(), "b=c".to_string())]);
        let (method, request) = args.command.request().unwrap();
        assert_eq!(method, Method::Post);
        assert_eq!(request.data.as_deref(), Some("{}"));
    }

    #[test]
    fn test_cli_rejects_malformed_header() {
        let result = Args::try_parse_from(["fuel", "-H", "no-colon", "get", "/"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_timeout_range_enforced() {
        assert!(Args::try_parse_from(["fuel", "--connect-timeout", "0", "get", "/"]).is_err());
        let args =
            Args::try_parse_from(["fuel", "--read-timeout", "3600", "get", "/"]).unwrap();
        assert_eq!(args.read_timeout, Some(3600));
    }

    #[test]
    fn test_cli_download_requires_output() {
        assert!(Args::try_parse_from(["fuel", "download", "/bytes/10"]).is_err());
        let args = Args::try_parse_from(["fuel", "download", "/bytes/10", "-o", "out.bin"]).unwrap();
        assert!(args.command.request().is_none());
        let Command::Download(download) = args.command else {
            panic!("expected download");
        };
        assert_eq!(download.output, PathBuf::from("out.bin"));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["fuel", "--help"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Args::try_parse_from(["fuel"]).is_err());
    }
}
