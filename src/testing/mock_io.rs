//! Temporary input files for tests.

use crate::io::{CodecRegistry, FinishWrite};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

/// A temporary file that is deleted when dropped.
pub struct TempFilePath(NamedTempFile);

impl TempFilePath {
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created.
    pub fn new() -> std::io::Result<Self> {
        NamedTempFile::new().map(Self)
    }

    /// A temporary file whose name ends in `.{extension}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created.
    pub fn with_extension(extension: &str) -> std::io::Result<Self> {
        let suffix = format!(".{extension}");
        tempfile::Builder::new().suffix(&suffix).tempfile().map(Self)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.0.path()
    }
}

/// A scratch directory for multi-file imports, removed with its contents
/// when dropped.
pub struct TempDirPath(TempDir);

impl TempDirPath {
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        TempDir::new().map(Self)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.0.path()
    }

    /// Path of `name` inside the directory. The file is not created.
    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.0.path().join(name)
    }
}

/// Write `contents` to `path`, compressed according to its extension.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_input_file(path: impl AsRef<Path>, contents: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = CodecRegistry::builtin().auto_detect_writer(file, path)?;
    writer.write_all(contents)?;
    writer.finish()
}

/// A temporary input file named `*.{extension}` holding `contents`,
/// compressed when the extension names a codec (e.g. `csv.gz`).
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn mock_input_file(contents: &str, extension: &str) -> std::io::Result<TempFilePath> {
    let temp = TempFilePath::with_extension(extension)?;
    write_input_file(temp.path(), contents.as_bytes())?;
    Ok(temp)
}
