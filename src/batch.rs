//! Batching and the flush protocol.
//!
//! The producer accumulates validated records into a [`RecordBatch`] and
//! hands full batches to the converter pool through a rendezvous channel.
//! A flush happens lazily: before accepting a record into a full batch, and
//! once more at the end of each input with `finished` set. Each flush
//! reports [`FlushProgress`] to the caller's callback, including flushes that
//! had nothing to hand off (an input with no records still reports once).

use crate::cancel::CancelToken;
use crate::error::{ImportError, ImportResult};
use crossbeam_channel::{Sender, select};
use csv::StringRecord;
use std::sync::Arc;
use tracing::debug;

/// A run of consecutive records from one input.
///
/// `rows[i]` is the line number of `records[i]`. Comment lines, blank lines
/// and quoted line breaks leave gaps, so rows are increasing but not
/// necessarily consecutive.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub file: Arc<str>,
    pub file_index: u32,
    pub rows: Vec<u64>,
    pub records: Vec<StringRecord>,
}

impl RecordBatch {
    #[must_use]
    pub fn new(file: Arc<str>, file_index: u32, capacity: usize) -> Self {
        Self {
            file,
            file_index,
            rows: Vec::with_capacity(capacity),
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, row: u64, record: StringRecord) {
        self.rows.push(row);
        self.records.push(record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Line number of the first record.
    #[must_use]
    pub fn first_row(&self) -> Option<u64> {
        self.rows.first().copied()
    }

    /// Records paired with their line numbers.
    pub fn rows(&self) -> impl Iterator<Item = (u64, &StringRecord)> {
        self.rows.iter().copied().zip(&self.records)
    }
}

/// Progress reported after every flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushProgress {
    pub file_index: u32,
    /// Records handed off so far for this file.
    pub records_flushed: u64,
    /// Set on the last flush of the file.
    pub finished: bool,
}

/// Builds batches for one input and hands them off.
pub struct Batcher {
    file: Arc<str>,
    file_index: u32,
    batch_size: usize,
    current: RecordBatch,
    records_flushed: u64,
    batches: u64,
}

impl Batcher {
    #[must_use]
    pub fn new(file: Arc<str>, file_index: u32, batch_size: usize) -> Self {
        let current = RecordBatch::new(Arc::clone(&file), file_index, batch_size);
        Self {
            file,
            file_index,
            batch_size,
            current,
            records_flushed: 0,
            batches: 0,
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.current.len() >= self.batch_size
    }

    /// Append the record found on line `row`. The caller flushes first when
    /// [`is_full`](Self::is_full).
    pub fn push(&mut self, row: u64, record: StringRecord) {
        self.current.push(row, record);
    }

    #[must_use]
    pub const fn records_flushed(&self) -> u64 {
        self.records_flushed
    }

    #[must_use]
    pub const fn batches(&self) -> u64 {
        self.batches
    }

    /// Hand the current batch to a worker (if it holds any records), then
    /// report progress.
    ///
    /// Blocks until a worker takes the batch or `cancel` is raised.
    ///
    /// # Errors
    /// Returns [`ImportError::Cancelled`] if the import is cancelled while
    /// waiting (or no worker is left to take the batch), and
    /// [`ImportError::Callback`] if `progress` fails.
    pub fn flush<P>(
        &mut self,
        finished: bool,
        queue: &Sender<RecordBatch>,
        cancel: &CancelToken,
        progress: &mut P,
    ) -> ImportResult<()>
    where
        P: FnMut(&FlushProgress) -> anyhow::Result<()> + ?Sized,
    {
        if !self.current.is_empty() {
            cancel.check()?;
            let capacity = if finished { 0 } else { self.batch_size };
            let next = RecordBatch::new(Arc::clone(&self.file), self.file_index, capacity);
            let batch = std::mem::replace(&mut self.current, next);
            let len = batch.len() as u64;
            let first_row = batch.first_row();
            select! {
                send(queue, batch) -> res => res.map_err(|_| ImportError::Cancelled)?,
                recv(cancel.signal()) -> _ => return Err(ImportError::Cancelled),
            }
            self.records_flushed += len;
            self.batches += 1;
            debug!(
                file = %self.file,
                first_row,
                records = len,
                finished,
                "batch handed off"
            );
        }
        progress(&FlushProgress {
            file_index: self.file_index,
            records_flushed: self.records_flushed,
            finished,
        })
        .map_err(ImportError::Callback)
    }
}
