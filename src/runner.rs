//! Execution of an import: one producer thread and a pool of converters.
//!
//! The producer reads every input in order, batches its validated records
//! and hands each batch through a zero-capacity channel, so at most one
//! batch per worker (plus the one being filled) is ever in memory. Workers
//! decode batches independently; rows carry the numbers assigned by the
//! producer, so the order in which workers finish does not matter.
//!
//! All threads are scoped and share a token derived from the caller's, so
//! one run can stop itself without touching the caller's token. The first
//! failure is kept in a [`FirstError`] slot and cancels the rest; every
//! thread is joined before the sink factory is closed.

use crate::batch::{Batcher, FlushProgress, RecordBatch};
use crate::cancel::{CancelOnPanic, CancelToken, FirstError};
use crate::convert::RowConverter;
use crate::error::{ImportError, ImportResult};
use crate::io::InputFile;
use crate::options::ImportOptions;
use crate::reader::Tokenizer;
use crate::schema::TableSchema;
use crate::sink::SinkFactory;
use crate::validation::RecordValidator;
use crossbeam_channel::{Receiver, Sender, bounded, select};
use std::thread;
use tracing::{debug, info_span, trace, warn};

/// Counters gathered while running an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub files: u64,
    pub records_read: u64,
    pub records_skipped: u64,
    pub records_flushed: u64,
    pub batches: u64,
    pub rows_emitted: u64,
    pub workers: usize,
}

/// Run the pipeline over `inputs` to completion, failure or cancellation.
///
/// # Errors
/// Returns the first error raised by the producer or any worker, or
/// [`ImportError::Cancelled`] if `cancel` was raised from outside. A
/// failure cancels only this run; `cancel` itself is never raised here.
pub fn run<F, P>(
    inputs: Vec<InputFile>,
    options: &ImportOptions,
    schema: &TableSchema,
    sinks: F,
    progress: P,
    cancel: &CancelToken,
) -> ImportResult<RunStats>
where
    F: SinkFactory,
    P: FnMut(&FlushProgress) -> anyhow::Result<()> + Send,
{
    let workers = options.worker_count();
    let cancel = &cancel.child();
    let first = FirstError::new(cancel.clone());
    let (tx, rx) = bounded::<RecordBatch>(0);
    // Spans do not cross threads on their own; each thread enters this one.
    let span = info_span!("convertcsv", workers, batch_size = options.batch_size);

    let (produced, emitted) = thread::scope(|s| {
        let producer = {
            let first = &first;
            let span = &span;
            s.spawn(move || {
                let _span = span.enter();
                let _producer = info_span!("producer").entered();
                let _guard = CancelOnPanic(cancel);
                produce(inputs, options, schema, &tx, cancel, progress)
                    .map_err(|e| first.record(e))
                    .ok()
            })
        };

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let rx = rx.clone();
                let sinks = &sinks;
                let first = &first;
                let span = &span;
                s.spawn(move || {
                    let _span = span.enter();
                    let _worker = info_span!("worker", worker).entered();
                    let _guard = CancelOnPanic(cancel);
                    convert_worker(worker, &rx, schema, options, sinks, cancel)
                        .map_err(|e| first.record(e))
                        .ok()
                })
            })
            .collect();
        drop(rx);

        let produced = join(producer, &first);
        let emitted: u64 = handles
            .into_iter()
            .filter_map(|h| join(h, &first))
            .sum();
        (produced, emitted)
    });

    sinks.close();

    if let Some(err) = first.into_inner() {
        if err.is_cancelled() {
            warn!("import cancelled");
        }
        return Err(err);
    }
    let mut stats = produced.unwrap_or_default();
    stats.rows_emitted = emitted;
    stats.workers = workers;
    Ok(stats)
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, Option<T>>, first: &FirstError) -> Option<T> {
    handle.join().unwrap_or_else(|_| {
        first.record(ImportError::WorkerPanicked);
        None
    })
}

fn produce<P>(
    inputs: Vec<InputFile>,
    options: &ImportOptions,
    schema: &TableSchema,
    queue: &Sender<RecordBatch>,
    cancel: &CancelToken,
    mut progress: P,
) -> ImportResult<RunStats>
where
    P: FnMut(&FlushProgress) -> anyhow::Result<()>,
{
    let expected = schema.expected_fields();
    let mut stats = RunStats::default();

    for input in inputs {
        let mut tokens = Tokenizer::new(input.name.clone(), input.reader, options);
        let validator = RecordValidator::new(input.name.clone(), expected, options.skip);
        let mut batcher = Batcher::new(input.name.clone(), input.index, options.batch_size);
        let mut skipped = 0;

        // A full batch goes out as soon as the next item is known to exist,
        // before that item is checked. End of input sends the last one.
        for next in tokens.by_ref() {
            if batcher.is_full() {
                batcher.flush(false, queue, cancel, &mut progress)?;
            }
            let (at, record) = next?;
            match validator.check(at, record)? {
                Some(record) => batcher.push(at.line, record),
                None => skipped += 1,
            }
        }
        batcher.flush(true, queue, cancel, &mut progress)?;

        debug!(
            file = %input.name,
            records = tokens.records_read(),
            skipped,
            batches = batcher.batches(),
            "finished reading input"
        );
        stats.files += 1;
        stats.records_read += tokens.records_read();
        stats.records_skipped += skipped;
        stats.records_flushed += batcher.records_flushed();
        stats.batches += batcher.batches();
    }
    Ok(stats)
}

fn convert_worker<F: SinkFactory>(
    worker: usize,
    queue: &Receiver<RecordBatch>,
    schema: &TableSchema,
    options: &ImportOptions,
    sinks: &F,
    cancel: &CancelToken,
) -> ImportResult<u64> {
    let sink = sinks
        .create(worker, cancel.clone())
        .map_err(|e| ImportError::config(format!("creating row sink for worker {worker}: {e:#}")))?;
    let mut converter = RowConverter::new(schema, options.null_encoding.clone(), sink)?;

    loop {
        select! {
            recv(queue) -> msg => match msg {
                Ok(batch) => {
                    converter.convert_batch(&batch)?;
                    trace!(
                        worker,
                        file = %batch.file,
                        first_row = batch.first_row(),
                        records = batch.len(),
                        "converted batch"
                    );
                }
                Err(_) => break,
            },
            recv(cancel.signal()) -> _ => return Err(ImportError::Cancelled),
        }
    }

    // The queue also closes when the producer fails; no final flush then.
    cancel.check()?;
    let rows = converter.finish()?;
    debug!(worker, rows, "converter finished");
    Ok(rows)
}
