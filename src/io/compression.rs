//! Transparent decompression of input files and compression of output.
//!
//! Data exports are routinely shipped compressed. A [`CodecRegistry`] holds
//! the codecs known to one import and wraps readers and writers with the
//! right one, detected by file extension first and by magic bytes second.
//!
//! ## Built-in Codecs
//!
//! When enabled via feature flags, the following codecs are available:
//! - **Gzip** (`.gz`) - via `flate2` crate (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` crate (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) - via `bzip2` crate (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - via `xz2` crate (feature: `compression-xz`)
//!
//! ## Usage
//! ```no_run
//! use bulkload::io::compression::{CodecRegistry, Compression, FinishWrite};
//! use std::fs::File;
//! use std::io::Write;
//! # fn main() -> anyhow::Result<()> {
//! let codecs = CodecRegistry::builtin();
//!
//! // Detected from the extension, decompressed on the fly.
//! let file = File::open("orders.csv.gz")?;
//! let reader = codecs.open_reader(file, "orders.csv.gz", Compression::Auto)?;
//!
//! // Compressed with zstd because of the extension.
//! let file = File::create("rows.jsonl.zst")?;
//! let mut writer = codecs.auto_detect_writer(file, "rows.jsonl.zst")?;
//! writer.write_all(b"{}\n")?;
//! writer.finish()?;
//! # Ok(())
//! # }
//! ```
//!
//! Readers are `Send`: the producer thread of an import owns them. Writers
//! must be closed with [`FinishWrite::finish`] so that trailer and flush
//! errors are reported.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Reader handed to the tokenizer.
pub type InputReader = Box<dyn Read + Send>;

/// Writer returned by [`CodecRegistry::auto_detect_writer`].
pub type OutputWriter = Box<dyn FinishWrite>;

/// A writer that must be closed explicitly.
///
/// Dropping it instead may silently lose the end of the stream.
pub trait FinishWrite: Write {
    /// Write any trailer, then flush down to the underlying writer.
    ///
    /// # Errors
    /// Returns the first error raised while writing the tail or flushing.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

impl<W: Write> FinishWrite for BufWriter<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut inner = (*self).into_inner().map_err(io::IntoInnerError::into_error)?;
        inner.flush()
    }
}

/// How an input's bytes are to be decompressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Detect from extension, then magic bytes.
    #[default]
    Auto,
    /// Read bytes as they are.
    None,
    Gzip,
    Zstd,
    Bzip2,
    Xz,
}

impl Compression {
    /// Codec name for the explicit variants.
    #[must_use]
    pub const fn codec_name(self) -> Option<&'static str> {
        match self {
            Self::Auto | Self::None => None,
            Self::Gzip => Some("gzip"),
            Self::Zstd => Some("zstd"),
            Self::Bzip2 => Some("bzip2"),
            Self::Xz => Some("xz"),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::None => f.write_str("none"),
            other => f.write_str(other.codec_name().unwrap_or_default()),
        }
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "none" => Ok(Self::None),
            "gzip" | "gz" => Ok(Self::Gzip),
            "zstd" | "zst" => Ok(Self::Zstd),
            "bzip2" | "bz2" => Ok(Self::Bzip2),
            "xz" => Ok(Self::Xz),
            other => Err(format!("unknown compression {other:?}")),
        }
    }
}

/// A compression algorithm.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip", "zstd").
    fn name(&self) -> &str;

    /// Lowercase file extensions with the leading dot (e.g. `&[".gz"]`).
    fn extensions(&self) -> &[&str];

    /// Signature at the start of a compressed stream, if the format has one.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap a reader with decompression.
    ///
    /// # Errors
    /// Returns an error if the decoder cannot be initialised.
    fn wrap_reader(&self, reader: InputReader) -> io::Result<InputReader>;

    /// Wrap a writer with compression.
    ///
    /// # Errors
    /// Returns an error if the encoder cannot be initialised.
    fn wrap_writer(&self, writer: Box<dyn Write>) -> io::Result<OutputWriter>;
}

/// The codecs available to an import.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn CompressionCodec>>,
}

impl CodecRegistry {
    /// A registry holding the codecs compiled into this build.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            codecs: vec![
                #[cfg(feature = "compression-gzip")]
                Arc::new(GzipCodec),
                #[cfg(feature = "compression-zstd")]
                Arc::new(ZstdCodec),
                #[cfg(feature = "compression-bzip2")]
                Arc::new(Bzip2Codec),
                #[cfg(feature = "compression-xz")]
                Arc::new(XzCodec),
            ],
        }
    }

    #[must_use]
    pub const fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Add a codec. Later registrations are consulted after earlier ones.
    pub fn register(&mut self, codec: Arc<dyn CompressionCodec>) {
        self.codecs.push(codec);
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<Arc<dyn CompressionCodec>> {
        self.codecs.iter().find(|c| c.name() == name).cloned()
    }

    fn detect_from_extension(&self, path: &Path) -> Option<Arc<dyn CompressionCodec>> {
        let path_str = path.to_string_lossy().to_lowercase();
        self.codecs
            .iter()
            .find(|c| c.extensions().iter().any(|ext| path_str.ends_with(ext)))
            .cloned()
    }

    // Peeks without consuming.
    fn detect_from_magic<R: BufRead>(&self, reader: &mut R) -> Option<Arc<dyn CompressionCodec>> {
        let buf = reader.fill_buf().ok()?;
        if buf.is_empty() {
            return None;
        }
        self.codecs
            .iter()
            .find(|c| c.magic_bytes().is_some_and(|magic| buf.starts_with(magic)))
            .cloned()
    }

    /// Wrap `reader` according to `compression`.
    ///
    /// # Errors
    /// Returns [`io::ErrorKind::Unsupported`] when an explicit codec is not
    /// compiled in, or the codec's initialisation error.
    pub fn open_reader<R: Read + Send + 'static>(
        &self,
        reader: R,
        path_hint: impl AsRef<Path>,
        compression: Compression,
    ) -> io::Result<InputReader> {
        match compression {
            Compression::None => Ok(Box::new(reader)),
            Compression::Auto => self.auto_detect_reader(reader, path_hint),
            explicit => {
                let name = explicit.codec_name().unwrap_or_default();
                let codec = self.by_name(name).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::Unsupported,
                        format!("{name} support is not compiled in"),
                    )
                })?;
                codec.wrap_reader(Box::new(reader))
            }
        }
    }

    /// Detect the codec of `reader` and wrap it; uncompressed input is
    /// returned buffered.
    ///
    /// # Errors
    /// Returns the codec's initialisation error.
    pub fn auto_detect_reader<R: Read + Send + 'static>(
        &self,
        reader: R,
        path_hint: impl AsRef<Path>,
    ) -> io::Result<InputReader> {
        if let Some(codec) = self.detect_from_extension(path_hint.as_ref()) {
            return codec.wrap_reader(Box::new(reader));
        }

        let mut buf_reader = BufReader::new(reader);
        if let Some(codec) = self.detect_from_magic(&mut buf_reader) {
            return codec.wrap_reader(Box::new(buf_reader));
        }
        Ok(Box::new(buf_reader))
    }

    /// Wrap `writer` with the codec matching the extension of `path_hint`;
    /// otherwise return it buffered.
    ///
    /// # Errors
    /// Returns the codec's initialisation error.
    pub fn auto_detect_writer<W: Write + 'static>(
        &self,
        writer: W,
        path_hint: impl AsRef<Path>,
    ) -> io::Result<OutputWriter> {
        if let Some(codec) = self.detect_from_extension(path_hint.as_ref()) {
            return codec.wrap_writer(Box::new(writer));
        }
        Ok(Box::new(BufWriter::new(writer)))
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.codecs.iter().map(|c| c.name()))
            .finish()
    }
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader(&self, reader: InputReader) -> io::Result<InputReader> {
        // Concatenated members are common in split exports.
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> io::Result<OutputWriter> {
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, flate2::Compression::default())))
    }
}

#[cfg(feature = "compression-gzip")]
impl<W: Write> FinishWrite for flate2::write::GzEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        Self::finish(*self)?.flush()
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader(&self, reader: InputReader) -> io::Result<InputReader> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as InputReader)
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> io::Result<OutputWriter> {
        zstd::stream::write::Encoder::new(writer, 3).map(|e| Box::new(e) as OutputWriter)
    }
}

#[cfg(feature = "compression-zstd")]
impl<W: Write> FinishWrite for zstd::stream::write::Encoder<'static, W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        Self::finish(*self)?.flush()
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(b"BZh")
    }

    fn wrap_reader(&self, reader: InputReader) -> io::Result<InputReader> {
        Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> io::Result<OutputWriter> {
        use bzip2::write::BzEncoder;
        Ok(Box::new(BzEncoder::new(writer, bzip2::Compression::default())))
    }
}

#[cfg(feature = "compression-bzip2")]
impl<W: Write> FinishWrite for bzip2::write::BzEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        Self::finish(*self)?.flush()
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader(&self, reader: InputReader) -> io::Result<InputReader> {
        Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> io::Result<OutputWriter> {
        Ok(Box::new(xz2::write::XzEncoder::new(writer, 6)))
    }
}

#[cfg(feature = "compression-xz")]
impl<W: Write> FinishWrite for xz2::write::XzEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        Self::finish(*self)?.flush()
    }
}
