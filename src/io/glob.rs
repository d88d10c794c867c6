//! Expansion of input patterns into file lists.
//!
//! Inputs are named on the command line or in code as paths or glob patterns
//! (`data/part-*.csv.gz`, `exports/**/*.tsv`). Expansion is sorted so that
//! file indices, and with them the order of progress reports, are
//! deterministic across runs.
//!
//! ```no_run
//! use bulkload::io::glob::expand_glob;
//!
//! let parts = expand_glob("exports/2024-*/part-*.csv")?;
//! # use anyhow::Error; Ok::<(), Error>(())
//! ```

use anyhow::{Context, Result, bail};
use glob::glob;
use std::path::{Path, PathBuf};

/// Expand a glob pattern into a sorted vector of matching files.
///
/// A pattern naming an existing file is returned as-is, even when it
/// contains glob metacharacters. Directories are never returned.
///
/// # Errors
///
/// Returns an error if the pattern is invalid or a directory entry cannot
/// be read. Zero matches is not an error.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let literal = Path::new(pattern);
    if literal.is_file() {
        return Ok(vec![literal.to_path_buf()]);
    }

    let entries = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;
    let mut files = entries
        .filter_map(|entry| match entry {
            Ok(path) if !path.is_file() => None,
            other => Some(other),
        })
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("reading matches of {pattern}"))?;
    files.sort();
    Ok(files)
}

/// Like [`expand_glob`], but zero matches is an error.
///
/// # Errors
///
/// Returns an error if the pattern is invalid, unreadable, or matches no
/// files.
pub fn expand_glob_required(pattern: &str) -> Result<Vec<PathBuf>> {
    let files = expand_glob(pattern)?;
    if files.is_empty() {
        bail!("no files found matching pattern: {pattern}");
    }
    Ok(files)
}

/// Expand several patterns in order, dropping files already matched by an
/// earlier pattern. Every pattern must match at least one file.
///
/// # Errors
///
/// Returns the first error from [`expand_glob_required`].
pub fn expand_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<PathBuf>> {
    let mut out: Vec<PathBuf> = Vec::new();
    for pattern in patterns {
        for path in expand_glob_required(pattern.as_ref())? {
            if !out.contains(&path) {
                out.push(path);
            }
        }
    }
    Ok(out)
}
