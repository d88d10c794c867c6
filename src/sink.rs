//! Destinations for converted rows.
//!
//! Each converter worker owns one [`RowSink`], created by a shared
//! [`SinkFactory`]. The factory is closed exactly once, after every worker has
//! stopped, so consumers observe end-of-output only when no more rows can
//! arrive.

use crate::cancel::CancelToken;
use crate::datum::Datum;
use crate::error::ImportError;
use anyhow::{Result, anyhow};
use crossbeam_channel::{Sender, select};

/// Rows per [`RowGroup`] sent by a [`ChannelSink`] when not configured.
pub const DEFAULT_GROUP_SIZE: usize = 5000;

/// Receives the decoded rows of one worker.
pub trait RowSink {
    /// Accept one row. `datums` is only valid for the duration of the call.
    ///
    /// # Errors
    /// Any error aborts the import.
    fn emit_row(&mut self, file_index: u32, row: u64, datums: &[Datum]) -> Result<()>;

    /// Push out anything buffered. Called once after a worker has drained
    /// the queue; never called after cancellation.
    ///
    /// # Errors
    /// Any error aborts the import.
    fn flush(&mut self) -> Result<()>;
}

/// Creates one [`RowSink`] per worker and owns the shared output.
pub trait SinkFactory: Sync {
    type Sink: RowSink;

    /// Build the sink for worker number `worker`.
    ///
    /// # Errors
    /// Any error aborts the import.
    fn create(&self, worker: usize, cancel: CancelToken) -> Result<Self::Sink>;

    /// Release the shared output. Called once, after all workers are done.
    fn close(self)
    where
        Self: Sized,
    {
    }
}

/// One converted row.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedRow {
    pub file_index: u32,
    pub row: u64,
    pub datums: Vec<Datum>,
}

/// Unit sent on the output channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowGroup {
    pub rows: Vec<EmittedRow>,
}

impl RowGroup {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Sends row groups over a crossbeam channel.
///
/// The channel disconnects once the factory is closed and every worker's
/// sink has been dropped.
pub struct ChannelSinkFactory {
    tx: Sender<RowGroup>,
    group_size: usize,
}

impl ChannelSinkFactory {
    #[must_use]
    pub const fn new(tx: Sender<RowGroup>) -> Self {
        Self {
            tx,
            group_size: DEFAULT_GROUP_SIZE,
        }
    }

    #[must_use]
    pub fn with_group_size(mut self, group_size: usize) -> Self {
        self.group_size = group_size.max(1);
        self
    }
}

impl SinkFactory for ChannelSinkFactory {
    type Sink = ChannelSink;

    fn create(&self, _worker: usize, cancel: CancelToken) -> Result<ChannelSink> {
        Ok(ChannelSink {
            tx: self.tx.clone(),
            cancel,
            group_size: self.group_size,
            pending: RowGroup::default(),
        })
    }

    fn close(self) {
        drop(self.tx);
    }
}

/// Per-worker buffering sink created by [`ChannelSinkFactory`].
pub struct ChannelSink {
    tx: Sender<RowGroup>,
    cancel: CancelToken,
    group_size: usize,
    pending: RowGroup,
}

impl ChannelSink {
    fn send_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let group = std::mem::take(&mut self.pending);
        select! {
            send(self.tx, group) -> res => res.map_err(|_| anyhow!("row group receiver dropped")),
            recv(self.cancel.signal()) -> _ => Err(ImportError::Cancelled.into()),
        }
    }
}

impl RowSink for ChannelSink {
    fn emit_row(&mut self, file_index: u32, row: u64, datums: &[Datum]) -> Result<()> {
        self.pending.rows.push(EmittedRow {
            file_index,
            row,
            datums: datums.to_vec(),
        });
        if self.pending.len() >= self.group_size {
            self.send_pending()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.send_pending()
    }
}
