//! Testing utilities for imports.
//!
//! - **Fixtures**: a sample table schema and CSV generators matching it
//! - **Mock I/O**: temporary input files, optionally compressed
//! - [`collect_import`]: run an import against an in-memory consumer and
//!   get back everything it produced
//!
//! # Quick Start
//!
//! ```
//! use bulkload::testing::*;
//! use bulkload::{ImportOptions, Importer, InputFile};
//!
//! # fn main() -> anyhow::Result<()> {
//! let importer = Importer::new(ImportOptions::default().with_skip(1), orders_schema())?;
//! let input = InputFile::from_bytes("orders.csv", 0, orders_csv(10, true));
//!
//! let out = collect_import(&importer, vec![input]);
//! let summary = out.result?;
//! assert_eq!(summary.rows_emitted, 10);
//! assert_eq!(out.rows[0].row, 2);
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
pub mod mock_io;

pub use fixtures::*;
pub use mock_io::*;

use crate::batch::FlushProgress;
use crate::error::ImportResult;
use crate::io::InputFile;
use crate::pipeline::{ImportSummary, Importer};
use crate::sink::{ChannelSinkFactory, EmittedRow, RowGroup};
use crossbeam_channel::bounded;
use std::sync::{Mutex, PoisonError};
use std::thread;

/// Everything observed while running an import.
#[derive(Debug)]
pub struct CollectedImport {
    pub result: ImportResult<ImportSummary>,
    /// Emitted rows sorted by `(file_index, row)`.
    pub rows: Vec<EmittedRow>,
    /// Progress reports in call order.
    pub progress: Vec<FlushProgress>,
    /// Row groups received on the output channel.
    pub groups: usize,
}

/// Run `importer` over `inputs`, collecting rows on a consumer thread.
#[must_use]
pub fn collect_import(importer: &Importer, inputs: Vec<InputFile>) -> CollectedImport {
    collect_import_with_group_size(importer, inputs, crate::sink::DEFAULT_GROUP_SIZE)
}

/// [`collect_import`] with an explicit row group size.
#[must_use]
pub fn collect_import_with_group_size(
    importer: &Importer,
    inputs: Vec<InputFile>,
    group_size: usize,
) -> CollectedImport {
    let (tx, rx) = bounded::<RowGroup>(4);
    let seen = Mutex::new(Vec::new());

    let (result, (mut rows, groups)) = thread::scope(|s| {
        let consumer = s.spawn(move || {
            let mut rows = Vec::new();
            let mut groups = 0;
            for group in rx {
                groups += 1;
                rows.extend(group.rows);
            }
            (rows, groups)
        });
        let sinks = ChannelSinkFactory::new(tx).with_group_size(group_size);
        let result = importer.import(inputs, sinks, |p: &FlushProgress| -> anyhow::Result<()> {
            seen.lock().unwrap_or_else(PoisonError::into_inner).push(*p);
            Ok(())
        });
        (result, consumer.join().unwrap_or_default())
    });

    rows.sort_by_key(|r| (r.file_index, r.row));
    CollectedImport {
        result,
        rows,
        progress: seen.into_inner().unwrap_or_else(PoisonError::into_inner),
        groups,
    }
}
