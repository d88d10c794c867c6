//! Streaming tokenization of delimited text.
//!
//! [`Tokenizer`] turns a byte stream into records using the `csv` crate in
//! its permissive mode: quotes are honoured where they open a field, stray
//! quotes inside unquoted fields are kept literally, and an unterminated
//! quoted field runs to the end of input. Blank lines and lines starting
//! with the comment marker produce no record.
//!
//! Each record is tagged with a [`RowPosition`]: its ordinal among the
//! records of the input and the physical line it starts on. Lines are
//! counted by line feeds, so blank lines, comment lines and line breaks
//! inside quoted fields all advance the line number of later records.

use crate::error::{ImportError, ImportResult};
use crate::options::ImportOptions;
use csv::{ReaderBuilder, StringRecord};
use std::io::{self, Read};
use std::sync::Arc;

/// Where a record came from in its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPosition {
    /// 1-based ordinal among the records of the input.
    pub record: u64,
    /// 1-based line the record starts on.
    pub line: u64,
}

/// Lazy sequence of `(position, record)` pairs read from one input.
///
/// The sequence ends after the first error.
pub struct Tokenizer<R: Read> {
    file: Arc<str>,
    reader: csv::Reader<LineIndex<R>>,
    comment: Option<u8>,
    records: u64,
    done: bool,
}

impl<R: Read> Tokenizer<R> {
    pub fn new(file: Arc<str>, input: R, options: &ImportOptions) -> Self {
        let comment = options.comment_byte();
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(options.delimiter())
            .comment(comment)
            .from_reader(LineIndex::new(input));
        Self {
            file,
            reader,
            comment,
            records: 0,
            done: false,
        }
    }

    /// Number of records produced so far.
    #[must_use]
    pub const fn records_read(&self) -> u64 {
        self.records
    }
}

impl<R: Read> Iterator for Tokenizer<R> {
    type Item = ImportResult<(RowPosition, StringRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let from = self.reader.position().byte();
        let mut record = StringRecord::new();
        let read = self.reader.read_record(&mut record);
        let line = self.reader.get_ref().record_line(from, self.comment);
        let end = self.reader.position().byte();
        self.reader.get_mut().release(end);
        match read {
            Ok(true) => {
                self.records += 1;
                let position = RowPosition {
                    record: self.records,
                    line,
                };
                Some(Ok((position, record)))
            }
            Ok(false) => {
                self.done = true;
                None
            }
            Err(source) => {
                self.done = true;
                Some(Err(ImportError::Parse {
                    file: Arc::clone(&self.file),
                    row: line,
                    source,
                }))
            }
        }
    }
}

/// Byte source that remembers enough of the input to tell which line a
/// record starts on.
///
/// `window` holds the bytes from stream offset `base` onwards that the
/// parser has buffered. Line feeds before `base + mark` are already counted
/// in `lines_before`.
struct LineIndex<R> {
    inner: R,
    window: Vec<u8>,
    base: u64,
    mark: usize,
    lines_before: u64,
}

impl<R> LineIndex<R> {
    const fn new(inner: R) -> Self {
        Self {
            inner,
            window: Vec::new(),
            base: 0,
            mark: 0,
            lines_before: 0,
        }
    }

    fn index(&self, offset: u64) -> usize {
        usize::try_from(offset.saturating_sub(self.base))
            .map_or(self.window.len(), |i| i.min(self.window.len()))
    }

    /// Line of the first byte at or after stream offset `from` that belongs
    /// to a record, passing over line terminators and comment lines the
    /// way the parser does.
    fn record_line(&self, from: u64, comment: Option<u8>) -> u64 {
        let mut at = self.index(from).max(self.mark);
        while let Some(&b) = self.window.get(at) {
            if is_terminator(b) {
                at += 1;
            } else if Some(b) == comment {
                let rest = &self.window[at..];
                at += rest.iter().position(|&c| is_terminator(c)).unwrap_or(rest.len());
            } else {
                break;
            }
        }
        1 + self.lines_before + count_line_feeds(&self.window[self.mark..at])
    }

    /// Mark everything before stream offset `upto` as consumed.
    fn release(&mut self, upto: u64) {
        let end = self.index(upto);
        if end > self.mark {
            self.lines_before += count_line_feeds(&self.window[self.mark..end]);
            self.mark = end;
        }
    }
}

impl<R: Read> Read for LineIndex<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.mark > 0 {
            self.window.drain(..self.mark);
            self.base += self.mark as u64;
            self.mark = 0;
        }
        let n = self.inner.read(buf)?;
        self.window.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

const fn is_terminator(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

fn count_line_feeds(bytes: &[u8]) -> u64 {
    bytes.iter().filter(|&&b| b == b'\n').count() as u64
}
