//! # Bulkload
//!
//! Streaming, parallel conversion of delimited text files (CSV/TSV) into the
//! typed rows of a table, ready to be handed to a bulk-ingestion backend.
//!
//! ## Key Features
//!
//! - **Streaming tokenizer** - permissive CSV quoting, custom separators, comment lines
//! - **Row provenance** - every row keeps its 1-based record number for diagnostics
//! - **Schema conformance** - field counts checked per record, values decoded per column type
//! - **Bounded memory** - fixed-size batches through a rendezvous hand-off
//! - **Parallel conversion** - a pool of converter threads, one producer
//! - **Fail fast** - the first error cancels the whole import and is the one reported
//! - **Compressed inputs** - gzip, zstd, bzip2 and xz (optional via feature flags)
//!
//! ## Quick Start
//!
//! ```no_run
//! use bulkload::*;
//! use crossbeam_channel::bounded;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let schema = TableSchema::from_json_file("orders.schema.json")?;
//! let options = ImportOptions::default().with_skip(1).with_null_encoding("\\N");
//! let importer = Importer::new(options, schema)?;
//!
//! let (tx, rx) = bounded::<RowGroup>(16);
//! let loader = std::thread::spawn(move || {
//!     for group in rx {
//!         // hand `group.rows` to the storage layer
//!         let _ = group.len();
//!     }
//! });
//!
//! let summary = importer.import_paths(
//!     &["exports/orders-*.csv.gz"],
//!     ChannelSinkFactory::new(tx),
//!     |p: &FlushProgress| {
//!         println!("file {}: {} records", p.file_index, p.records_flushed);
//!         Ok(())
//!     },
//! )?;
//! loader.join().ok();
//! println!("imported {} rows", summary.rows_emitted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! bytes -> Tokenizer -> RecordValidator -> Batcher -> hand-off queue
//!       -> converter pool (RowConverter per worker) -> RowSink
//! ```
//!
//! - [`reader`] tokenizes input and numbers records.
//! - [`validation`] enforces the field count and the skip prefix.
//! - [`batch`] groups records and implements the flush protocol.
//! - [`runner`] runs the producer and the converter pool.
//! - [`convert`] decodes fields into [`Datum`]s.
//! - [`sink`] defines where rows go.
//!
//! ## Row numbers
//!
//! A row number is the 1-based physical line a record starts on in its file.
//! Skipped records, comment lines, blank lines and line breaks inside quoted
//! fields all count, so an error points at the line an editor shows. Numbers
//! do not depend on batch size or worker count. The `skip` option counts
//! records, not lines.
//!
//! ## Errors and cancellation
//!
//! Every error is fatal. The first one raised by any thread cancels the
//! import; threads blocked on the queue or on a sink wake immediately. The
//! caller can cancel too, through [`Importer::cancel_token`].

pub mod batch;
pub mod cancel;
pub mod convert;
pub mod datum;
pub mod error;
pub mod io;
pub mod metrics;
pub mod options;
pub mod pipeline;
pub mod reader;
pub mod runner;
pub mod schema;
pub mod sink;
pub mod testing;
pub mod validation;

pub use batch::{Batcher, FlushProgress, RecordBatch};
pub use cancel::{CancelToken, FirstError};
pub use convert::RowConverter;
pub use datum::{Datum, ParseDatumError};
pub use error::{ImportError, ImportResult};
pub use io::{CodecRegistry, Compression, InputFile, open_inputs};
pub use metrics::MetricsCollector;
pub use options::{ImportOptions, InputFormat};
pub use pipeline::{ImportSummary, Importer};
pub use reader::{RowPosition, Tokenizer};
pub use schema::{ColumnDescriptor, ColumnType, TableSchema};
pub use sink::{ChannelSink, ChannelSinkFactory, EmittedRow, RowGroup, RowSink, SinkFactory};
pub use validation::RecordValidator;
