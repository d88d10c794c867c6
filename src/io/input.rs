//! Named input streams.

use crate::error::{ImportError, ImportResult};
use crate::io::compression::{CodecRegistry, Compression, InputReader};
use crate::io::glob::expand_patterns;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

/// One input of an import: a display name, its position among the inputs,
/// and the (already decompressed) byte stream.
pub struct InputFile {
    pub name: Arc<str>,
    pub index: u32,
    pub reader: InputReader,
}

impl InputFile {
    pub fn from_reader(name: impl Into<Arc<str>>, index: u32, reader: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            index,
            reader: Box::new(reader),
        }
    }

    /// In-memory input, mostly for tests and small imports.
    pub fn from_bytes(name: impl Into<Arc<str>>, index: u32, bytes: impl Into<Vec<u8>>) -> Self {
        Self::from_reader(name, index, io::Cursor::new(bytes.into()))
    }

    /// Open `path`, decompressing according to `compression`.
    ///
    /// # Errors
    /// Returns [`ImportError::Io`] if the file cannot be opened or its codec
    /// cannot be set up.
    pub fn open(
        path: impl AsRef<Path>,
        index: u32,
        compression: Compression,
        codecs: &CodecRegistry,
    ) -> ImportResult<Self> {
        let path = path.as_ref();
        let name: Arc<str> = Arc::from(path.display().to_string());
        let io_err = |source| ImportError::Io {
            file: Arc::clone(&name),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        let reader = codecs.open_reader(file, path, compression).map_err(io_err)?;
        Ok(Self {
            name,
            index,
            reader,
        })
    }
}

impl fmt::Debug for InputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputFile")
            .field("name", &self.name)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Expand `patterns` and open every matching file, numbering them in order.
///
/// # Errors
/// Returns [`ImportError::Config`] if a pattern is invalid or matches
/// nothing, and [`ImportError::Io`] if a file cannot be opened.
pub fn open_inputs<S: AsRef<str>>(
    patterns: &[S],
    compression: Compression,
    codecs: &CodecRegistry,
) -> ImportResult<Vec<InputFile>> {
    let paths = expand_patterns(patterns).map_err(|e| ImportError::config(format!("{e:#}")))?;
    paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let index = u32::try_from(i)
                .map_err(|_| ImportError::config("too many input files"))?;
            InputFile::open(path, index, compression, codecs)
        })
        .collect()
}
