//! The import entry point.

use crate::batch::FlushProgress;
use crate::cancel::CancelToken;
use crate::error::{ImportError, ImportResult};
use crate::io::{CodecRegistry, InputFile, open_inputs};
use crate::metrics::MetricsCollector;
use crate::options::ImportOptions;
use crate::runner::{self, RunStats};
use crate::schema::TableSchema;
use crate::sink::SinkFactory;
use std::time::{Duration, Instant};
use tracing::info;

/// Converts delimited text into rows of one table.
///
/// An `Importer` holds the options and schema of an import and the token
/// that cancels it from outside. It can run any number of imports; a failed
/// import does not affect the next one. Options are validated up front, so
/// a misconfigured import fails before any input is read.
#[derive(Debug)]
pub struct Importer {
    options: ImportOptions,
    schema: TableSchema,
    codecs: CodecRegistry,
    cancel: CancelToken,
}

/// What an import did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub files: u64,
    pub records_read: u64,
    pub records_skipped: u64,
    pub records_flushed: u64,
    pub batches: u64,
    pub rows_emitted: u64,
    pub workers: usize,
    pub elapsed: Duration,
}

impl ImportSummary {
    fn from_stats(stats: RunStats, elapsed: Duration) -> Self {
        Self {
            files: stats.files,
            records_read: stats.records_read,
            records_skipped: stats.records_skipped,
            records_flushed: stats.records_flushed,
            batches: stats.batches,
            rows_emitted: stats.rows_emitted,
            workers: stats.workers,
            elapsed,
        }
    }

    /// Counters of this import as a [`MetricsCollector`].
    #[must_use]
    pub fn to_metrics(&self) -> MetricsCollector {
        let metrics = MetricsCollector::new();
        let workers = u64::try_from(self.workers).unwrap_or(u64::MAX);
        for (name, value, description) in [
            ("files", self.files, "Input files read"),
            ("records_read", self.records_read, "Records produced by the tokenizer"),
            ("records_skipped", self.records_skipped, "Leading records discarded"),
            ("records_flushed", self.records_flushed, "Records handed to converters"),
            ("batches", self.batches, "Batches handed to converters"),
            ("rows_emitted", self.rows_emitted, "Rows delivered to sinks"),
            ("workers", workers, "Converter threads"),
        ] {
            metrics.set_counter(name, value);
            metrics.describe(name, description);
        }
        metrics.set_elapsed(self.elapsed);
        metrics
    }
}

impl Importer {
    /// # Errors
    /// Returns [`ImportError::Config`] if the options are inconsistent or the
    /// schema has no visible columns.
    pub fn new(options: ImportOptions, schema: TableSchema) -> ImportResult<Self> {
        options.validate()?;
        if schema.expected_fields() == 0 {
            return Err(ImportError::config(format!(
                "table {:?} has no visible columns to import",
                schema.name
            )));
        }
        Ok(Self {
            options,
            schema,
            codecs: CodecRegistry::builtin(),
            cancel: CancelToken::new(),
        })
    }

    /// Replace the codecs used by [`import_paths`](Self::import_paths).
    #[must_use]
    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    #[must_use]
    pub const fn options(&self) -> &ImportOptions {
        &self.options
    }

    #[must_use]
    pub const fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Handle that cancels the running import from any thread. Once raised it
    /// also cancels every later import on this `Importer`.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Convert `inputs` in order, sending rows to sinks created by `sinks`.
    ///
    /// `progress` is called from the reading thread after every flush.
    ///
    /// # Errors
    /// Returns the first error of the import; see [`ImportError`].
    pub fn import<F, P>(&self, inputs: Vec<InputFile>, sinks: F, progress: P) -> ImportResult<ImportSummary>
    where
        F: SinkFactory,
        P: FnMut(&FlushProgress) -> anyhow::Result<()> + Send,
    {
        let start = Instant::now();
        info!(
            table = %self.schema.name,
            files = inputs.len(),
            workers = self.options.worker_count(),
            batch_size = self.options.batch_size,
            "starting import"
        );
        let stats = runner::run(inputs, &self.options, &self.schema, sinks, progress, &self.cancel)?;
        let summary = ImportSummary::from_stats(stats, start.elapsed());
        info!(
            table = %self.schema.name,
            records = summary.records_read,
            rows = summary.rows_emitted,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "import finished"
        );
        Ok(summary)
    }

    /// Expand `patterns`, open the matching files and import them.
    ///
    /// # Errors
    /// Returns [`ImportError::Config`] for patterns matching nothing,
    /// [`ImportError::Io`] for files that cannot be opened, and otherwise
    /// whatever [`import`](Self::import) returns.
    pub fn import_paths<S, F, P>(&self, patterns: &[S], sinks: F, progress: P) -> ImportResult<ImportSummary>
    where
        S: AsRef<str>,
        F: SinkFactory,
        P: FnMut(&FlushProgress) -> anyhow::Result<()> + Send,
    {
        let inputs = open_inputs(patterns, self.options.compression, &self.codecs)?;
        self.import(inputs, sinks, progress)
    }
}
