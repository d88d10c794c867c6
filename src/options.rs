//! Import configuration.
//!
//! One [`ImportOptions`] value is built per import and handed to the
//! pipeline; nothing here is process-wide.

use crate::error::{ImportError, ImportResult};
use crate::io::compression::Compression;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

/// Records per hand-off unit when not configured.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Input text format. Only decides the default field separator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    #[default]
    Csv,
    Tsv,
}

impl InputFormat {
    #[must_use]
    pub const fn default_separator(self) -> u8 {
        match self {
            Self::Csv => b',',
            Self::Tsv => b'\t',
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
        })
    }
}

impl FromStr for InputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "tsv" | "tab" => Ok(Self::Tsv),
            other => Err(format!("unknown input format {other:?}")),
        }
    }
}

/// Options controlling how delimited text is tokenized and converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    pub format: InputFormat,
    /// Overrides the format's default separator.
    pub field_separator: Option<char>,
    /// Lines starting with this character are dropped.
    pub comment: Option<char>,
    /// Number of leading records (header included) to discard.
    pub skip: u64,
    /// Raw field text that decodes to NULL.
    pub null_encoding: Option<String>,
    /// Records per batch handed to a converter.
    pub batch_size: usize,
    /// Converter threads; host parallelism when unset.
    pub workers: Option<usize>,
    /// Decompression applied when inputs are opened from paths.
    pub compression: Compression,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            format: InputFormat::Csv,
            field_separator: None,
            comment: None,
            skip: 0,
            null_encoding: None,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: None,
            compression: Compression::Auto,
        }
    }
}

impl ImportOptions {
    #[must_use]
    pub fn with_format(mut self, format: InputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_separator(mut self, sep: char) -> Self {
        self.field_separator = Some(sep);
        self
    }

    #[must_use]
    pub fn with_comment(mut self, marker: char) -> Self {
        self.comment = Some(marker);
        self
    }

    #[must_use]
    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub fn with_null_encoding(mut self, null: impl Into<String>) -> Self {
        self.null_encoding = Some(null.into());
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Effective field separator byte.
    #[must_use]
    pub fn delimiter(&self) -> u8 {
        self.field_separator
            .and_then(ascii_byte)
            .unwrap_or_else(|| self.format.default_separator())
    }

    #[must_use]
    pub fn comment_byte(&self) -> Option<u8> {
        self.comment.and_then(ascii_byte)
    }

    /// Number of converter workers to run.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Check the options for internal consistency.
    ///
    /// # Errors
    /// Returns [`ImportError::Config`] describing the first problem found.
    pub fn validate(&self) -> ImportResult<()> {
        if self.batch_size == 0 {
            return Err(ImportError::config("batch size must be at least 1"));
        }
        if self.workers == Some(0) {
            return Err(ImportError::config("worker count must be at least 1"));
        }
        if let Some(sep) = self.field_separator {
            check_marker("field separator", sep)?;
            if sep == '"' {
                return Err(ImportError::config("field separator cannot be a quote"));
            }
        }
        if let Some(comment) = self.comment {
            check_marker("comment marker", comment)?;
            if comment == char::from(self.delimiter()) {
                return Err(ImportError::config(
                    "comment marker cannot equal the field separator",
                ));
            }
        }
        Ok(())
    }

    /// Load options from a JSON document; absent keys keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse import options {}", path.display()))
    }
}

fn ascii_byte(c: char) -> Option<u8> {
    u8::try_from(c).ok().filter(u8::is_ascii)
}

fn check_marker(what: &str, c: char) -> ImportResult<()> {
    if ascii_byte(c).is_none() {
        return Err(ImportError::config(format!("{what} {c:?} is not ASCII")));
    }
    if c == '\n' || c == '\r' {
        return Err(ImportError::config(format!("{what} cannot be a line break")));
    }
    Ok(())
}
