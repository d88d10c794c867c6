//! Record shape validation.
//!
//! Every record that survives the skip prefix must carry exactly one field
//! per visible column. Exporters that terminate each line with the separator
//! produce one extra, empty trailing field; that field is dropped.

use crate::error::{ImportError, ImportResult};
use crate::reader::RowPosition;
use csv::StringRecord;
use std::sync::Arc;

/// Checks field counts and applies the leading-record skip for one file.
#[derive(Debug, Clone)]
pub struct RecordValidator {
    file: Arc<str>,
    expected: usize,
    skip: u64,
}

impl RecordValidator {
    #[must_use]
    pub const fn new(file: Arc<str>, expected: usize, skip: u64) -> Self {
        Self {
            file,
            expected,
            skip,
        }
    }

    #[must_use]
    pub const fn expected(&self) -> usize {
        self.expected
    }

    /// Validate the record found at `at`.
    ///
    /// Returns `Ok(None)` for records inside the skip prefix and the
    /// (possibly truncated) record otherwise. The prefix is measured in
    /// records, not lines.
    ///
    /// # Errors
    /// Returns [`ImportError::FieldCount`] with the record's line when it
    /// has the wrong number of fields.
    pub fn check(&self, at: RowPosition, mut record: StringRecord) -> ImportResult<Option<StringRecord>> {
        if at.record <= self.skip {
            return Ok(None);
        }
        let actual = record.len();
        if actual == self.expected {
            return Ok(Some(record));
        }
        if actual == self.expected + 1 && record.get(self.expected) == Some("") {
            record.truncate(self.expected);
            return Ok(Some(record));
        }
        Err(ImportError::FieldCount {
            file: Arc::clone(&self.file),
            row: at.line,
            expected: self.expected,
            actual,
        })
    }
}
