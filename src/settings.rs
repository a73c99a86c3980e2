//! User settings file for the command line front end.
//!
//! The file is a small TOML subset: top-level `key = value` lines plus
//! `[headers]` and `[params]` tables whose entries become additional headers
//! and parameters. `#` starts a comment outside quoted strings.
//!
//! ```toml
//! base_path = "https://httpbin.org"
//! connect_timeout_secs = 10
//!
//! [headers]
//! "X-Client" = "fuel"   # quoted keys allow dashes and dots
//!
//! [params]
//! lang = "en"
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Errors raised while loading a settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings syntax on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("unknown settings key '{key}' on line {line}")]
    UnknownKey { line: usize, key: String },

    #[error("unknown settings section '[{section}]' on line {line}")]
    UnknownSection { line: usize, section: String },

    #[error("invalid value for `{key}` on line {line}: {message}")]
    InvalidValue {
        line: usize,
        key: String,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Root,
    Headers,
    Params,
}

/// Parsed settings. Missing values fall back to library defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    base_path: Option<String>,
    connect_timeout_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
    headers: BTreeMap<String, String>,
    params: BTreeMap<String, String>,
}

impl Settings {
    /// Parses settings from a string.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] on malformed lines, unknown keys or sections,
    /// and timeouts outside `1..=3600`.
    pub fn parse(raw: &str) -> Result<Self, SettingsError> {
        let mut settings = Self::default();
        let mut section = Section::Root;

        for (index, raw_line) in raw.lines().enumerate() {
            let line_no = index + 1;
            let line = strip_inline_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let Some(name) = header.strip_suffix(']') else {
                    return Err(SettingsError::Syntax {
                        line: line_no,
                        message: "unterminated section header".to_string(),
                    });
                };
                section = match name.trim() {
                    "headers" => Section::Headers,
                    "params" => Section::Params,
                    other => {
                        return Err(SettingsError::UnknownSection {
                            line: line_no,
                            section: other.to_string(),
                        });
                    }
                };
                continue;
            }

            let Some((raw_key, raw_value)) = line.split_once('=') else {
                return Err(SettingsError::Syntax {
                    line: line_no,
                    message: "expected key = value".to_string(),
                });
            };
            let key = parse_key(raw_key.trim()).ok_or_else(|| SettingsError::Syntax {
                line: line_no,
                message: "empty key".to_string(),
            })?;
            let value = raw_value.trim();

            match section {
                Section::Headers => {
                    let value = string_value(&key, value, line_no)?;
                    settings.headers.insert(key, value);
                }
                Section::Params => {
                    let value = string_value(&key, value, line_no)?;
                    settings.params.insert(key, value);
                }
                Section::Root => match key.as_str() {
                    "base_path" => {
                        settings.base_path = Some(string_value(&key, value, line_no)?);
                    }
                    "connect_timeout_secs" => {
                        settings.connect_timeout_secs =
                            Some(timeout_value(&key, value, line_no)?);
                    }
                    "read_timeout_secs" => {
                        settings.read_timeout_secs = Some(timeout_value(&key, value, line_no)?);
                    }
                    _ => {
                        return Err(SettingsError::UnknownKey { line: line_no, key });
                    }
                },
            }
        }

        Ok(settings)
    }

    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Read`] when the file cannot be read, or any
    /// parse error.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    /// Loads the default settings file when it exists.
    ///
    /// Returns `Ok(None)` when no path can be resolved or the file is absent.
    ///
    /// # Errors
    ///
    /// Propagates read and parse failures of an existing file.
    pub fn load_default() -> Result<Option<(PathBuf, Self)>, SettingsError> {
        let Some(path) = resolve_default_config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let settings = Self::load(&path)?;
        Ok(Some((path, settings)))
    }

    #[must_use]
    pub fn base_path(&self) -> Option<&str> {
        self.base_path.as_deref()
    }

    /// Connect timeout, defaulting to [`CONNECT_TIMEOUT_SECS`].
    #[must_use]
    pub fn connect_timeout_secs(&self) -> u64 {
        self.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS)
    }

    /// Read timeout, defaulting to [`READ_TIMEOUT_SECS`].
    #[must_use]
    pub fn read_timeout_secs(&self) -> u64 {
        self.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS)
    }

    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn set_base_path(&mut self, base_path: impl Into<String>) {
        self.base_path = Some(base_path.into());
    }

    pub fn set_connect_timeout_secs(&mut self, secs: u64) {
        self.connect_timeout_secs = Some(secs);
    }

    pub fn set_read_timeout_secs(&mut self, secs: u64) {
        self.read_timeout_secs = Some(secs);
    }

    pub fn insert_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn insert_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), value.into());
    }
}

/// Resolves the default settings path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/fuel/config.toml`
/// 2. `$HOME/.config/fuel/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("fuel").join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("fuel")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

/// Bare or double-quoted key.
fn parse_key(raw: &str) -> Option<String> {
    let key = unquote(raw).unwrap_or(raw);
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

fn unquote(raw: &str) -> Option<&str> {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        Some(&raw[1..raw.len() - 1])
    } else {
        None
    }
}

fn string_value(key: &str, raw: &str, line: usize) -> Result<String, SettingsError> {
    unquote(raw)
        .map(str::to_string)
        .ok_or_else(|| SettingsError::InvalidValue {
            line,
            key: key.to_string(),
            message: "expected double-quoted string".to_string(),
        })
}

fn timeout_value(key: &str, raw: &str, line: usize) -> Result<u64, SettingsError> {
    let invalid = |message: String| SettingsError::InvalidValue {
        line,
        key: key.to_string(),
        message,
    };
    let value = raw
        .parse::<u64>()
        .map_err(|e| invalid(format!("expected non-negative integer ({e})")))?;
    if !(1..=3600).contains(&value) {
        return Err(invalid(format!("{value} outside expected range 1..=3600")));
    }
    Ok(value)
}
