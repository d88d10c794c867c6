//! End-to-end tests of the import pipeline: batching, row numbering and
//! failure handling.

use bulkload::testing::*;
use bulkload::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn pairs_importer(batch_size: usize, workers: usize) -> anyhow::Result<Importer> {
    let options = ImportOptions::default()
        .with_batch_size(batch_size)
        .with_workers(workers);
    Ok(Importer::new(options, pair_schema())?)
}

fn input(contents: impl Into<Vec<u8>>) -> Vec<InputFile> {
    vec![InputFile::from_bytes("input.csv", 0, contents)]
}

fn flushes(progress: &[FlushProgress]) -> Vec<(u64, bool)> {
    progress.iter().map(|p| (p.records_flushed, p.finished)).collect()
}

fn row_numbers(rows: &[EmittedRow]) -> Vec<u64> {
    rows.iter().map(|r| r.row).collect()
}

/// Shared state observed by [`Recorder`] sinks.
#[derive(Default)]
struct Recorded {
    rows: Mutex<Vec<(u32, u64)>>,
    flushes: AtomicUsize,
    closed: AtomicUsize,
    panic_on_emit: AtomicBool,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Recorded>);

struct RecorderSink(Arc<Recorded>);

impl SinkFactory for Recorder {
    type Sink = RecorderSink;

    fn create(&self, _worker: usize, _cancel: CancelToken) -> anyhow::Result<RecorderSink> {
        Ok(RecorderSink(Arc::clone(&self.0)))
    }

    fn close(self) {
        self.0.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl RowSink for RecorderSink {
    fn emit_row(&mut self, file_index: u32, row: u64, _datums: &[Datum]) -> anyhow::Result<()> {
        if self.0.panic_on_emit.load(Ordering::SeqCst) {
            panic!("sink exploded at row {row}");
        }
        self.0.rows.lock().unwrap().push((file_index, row));
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.0.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_flush_count_follows_batch_size() -> anyhow::Result<()> {
    let importer = pairs_importer(3, 2)?;

    let out = collect_import(&importer, input(pairs_csv(7)));
    let summary = out.result?;
    assert_eq!(flushes(&out.progress), [(3, false), (6, false), (7, true)]);
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.rows_emitted, 7);

    // An exact multiple hands off no empty final batch.
    let out = collect_import(&importer, input(pairs_csv(6)));
    let summary = out.result?;
    assert_eq!(flushes(&out.progress), [(3, false), (6, true)]);
    assert_eq!(summary.batches, 2);
    Ok(())
}

#[test]
fn test_empty_input_reports_one_final_flush() -> anyhow::Result<()> {
    let importer = pairs_importer(3, 2)?;
    let out = collect_import(&importer, input(""));
    let summary = out.result?;

    let expected = FlushProgress {
        file_index: 0,
        records_flushed: 0,
        finished: true,
    };
    assert_eq!(out.progress, [expected]);
    assert!(out.rows.is_empty());
    assert_eq!(summary.batches, 0);
    assert_eq!(summary.records_read, 0);
    Ok(())
}

#[test]
fn test_trailing_empty_field_is_dropped() -> anyhow::Result<()> {
    let importer = pairs_importer(10, 1)?;
    let out = collect_import(&importer, input("1,2,\n3,4\n"));
    out.result?;

    assert_eq!(out.rows.len(), 2);
    assert_eq!(out.rows[0].datums, [Datum::Int(1), Datum::Int(2)]);
    assert_eq!(out.rows[1].datums, [Datum::Int(3), Datum::Int(4)]);
    Ok(())
}

#[test]
fn test_extra_non_empty_field_is_rejected() -> anyhow::Result<()> {
    let importer = pairs_importer(10, 1)?;
    let out = collect_import(&importer, input("1,2\n1,2,3\n"));

    match out.result {
        Err(ImportError::FieldCount {
            row, expected, actual, ..
        }) => assert_eq!((row, expected, actual), (2, 2, 3)),
        other => panic!("expected a field count error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_row_numbers_do_not_depend_on_batching() -> anyhow::Result<()> {
    let mut contents = String::from("a,b\n");
    contents.push_str(&pairs_csv(40));

    for (batch_size, workers) in [(1, 1), (7, 3), (50, 8)] {
        let options = ImportOptions::default()
            .with_skip(1)
            .with_batch_size(batch_size)
            .with_workers(workers);
        let importer = Importer::new(options, pair_schema())?;
        let out = collect_import(&importer, input(contents.clone()));
        let summary = out.result?;

        assert_eq!(row_numbers(&out.rows), (2..=41).collect::<Vec<_>>());
        for row in &out.rows {
            let id = i64::try_from(row.row)? - 1;
            assert_eq!(row.datums, [Datum::Int(id), Datum::Int(id * 10)]);
        }
        assert_eq!(summary.records_read, 41);
        assert_eq!(summary.records_skipped, 1);
        assert_eq!(summary.records_flushed, 40);
    }
    Ok(())
}

#[test]
fn test_rows_are_numbered_by_physical_line() -> anyhow::Result<()> {
    let options = ImportOptions::default().with_comment('#').with_batch_size(2);
    let importer = Importer::new(options, pair_schema())?;

    let out = collect_import(&importer, input("# exported\n1,10\n\n# more\n2,20\n3,30\n"));
    out.result?;
    assert_eq!(row_numbers(&out.rows), [2, 5, 6]);
    assert_eq!(out.rows[1].datums, [Datum::Int(2), Datum::Int(20)]);

    let out = collect_import(&importer, input("# c\n# c\n1,10\n"));
    out.result?;
    assert_eq!(row_numbers(&out.rows), [3]);
    Ok(())
}

#[test]
fn test_errors_cite_the_line_a_record_starts_on() -> anyhow::Result<()> {
    let schema = TableSchema::new(
        "notes",
        vec![
            ColumnDescriptor::new("a", ColumnType::Int),
            ColumnDescriptor::new("b", ColumnType::String),
        ],
    );
    let importer = Importer::new(ImportOptions::default().with_workers(1), schema)?;
    let out = collect_import(&importer, input("1,\"2\n\"\nx,2\n"));
    match out.result {
        Err(ImportError::Decode { row, ref raw, .. }) => assert_eq!((row, raw.as_str()), (3, "x")),
        other => panic!("expected a decode error, got {other:?}"),
    }

    let importer = Importer::new(ImportOptions::default().with_comment('#'), pair_schema())?;
    let out = collect_import(&importer, input("# c\n1,10\n# c\nbad\n"));
    match out.result {
        Err(ImportError::FieldCount { row, actual, .. }) => assert_eq!((row, actual), (4, 1)),
        other => panic!("expected a field count error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_failed_import_does_not_affect_the_next_one() -> anyhow::Result<()> {
    let importer = pairs_importer(2, 2)?;

    let out = collect_import(&importer, input("1,2\nbad\n"));
    assert!(matches!(out.result, Err(ImportError::FieldCount { row: 2, .. })));
    assert!(!importer.cancel_token().is_cancelled());

    let out = collect_import(&importer, input("1,2\n3,4\n"));
    let summary = out.result?;
    assert_eq!(summary.rows_emitted, 2);
    assert_eq!(row_numbers(&out.rows), [1, 2]);
    Ok(())
}

#[test]
fn test_skipped_records_are_not_validated() -> anyhow::Result<()> {
    let options = ImportOptions::default().with_skip(2);
    let importer = Importer::new(options, pair_schema())?;
    let out = collect_import(&importer, input("title only\nx,y,z\n1,10\n"));
    let summary = out.result?;

    assert_eq!(row_numbers(&out.rows), [3]);
    assert_eq!(summary.records_skipped, 2);
    Ok(())
}

#[test]
fn test_structural_error_inside_skip_prefix_still_fails() -> anyhow::Result<()> {
    let options = ImportOptions::default().with_skip(1);
    let importer = Importer::new(options, pair_schema())?;
    let out = collect_import(&importer, input(&b"\xff\n1,2\n"[..]));

    assert!(matches!(out.result, Err(ImportError::Parse { row: 1, .. })));
    assert!(out.progress.is_empty());
    Ok(())
}

#[test]
fn test_full_batch_is_handed_off_before_parse_error() -> anyhow::Result<()> {
    let importer = pairs_importer(2, 1)?;
    let out = collect_import(&importer, input(&b"1,10\n2,20\n\xff,30\n4,40\n"[..]));

    let err = out.result.unwrap_err();
    assert_eq!(err.row(), Some(3));
    assert!(matches!(err, ImportError::Parse { .. }));
    assert_eq!(flushes(&out.progress), [(2, false)]);
    Ok(())
}

#[test]
fn test_null_encoding_overrides_column_type() -> anyhow::Result<()> {
    let schema = TableSchema::new(
        "notes",
        vec![
            ColumnDescriptor::new("id", ColumnType::Int),
            ColumnDescriptor::new("note", ColumnType::String),
        ],
    );
    let options = ImportOptions::default().with_null_encoding("\\N");
    let importer = Importer::new(options, schema)?;
    let out = collect_import(&importer, input("\\N,hello\n2,\\N\n3,\n"));
    out.result?;

    assert_eq!(out.rows[0].datums, [Datum::Null, Datum::String("hello".into())]);
    assert_eq!(out.rows[1].datums, [Datum::Int(2), Datum::Null]);
    // Empty text is a value, not NULL.
    assert_eq!(out.rows[2].datums, [Datum::Int(3), Datum::String(String::new())]);
    Ok(())
}

#[test]
fn test_output_does_not_depend_on_worker_count() -> anyhow::Result<()> {
    let contents = orders_csv(500, true);
    let run = |workers: usize| -> anyhow::Result<Vec<EmittedRow>> {
        let options = ImportOptions::default()
            .with_skip(1)
            .with_batch_size(7)
            .with_workers(workers);
        let importer = Importer::new(options, orders_schema())?;
        let out = collect_import_with_group_size(&importer, input(contents.clone()), 13);
        out.result?;
        Ok(out.rows)
    };

    let serial = run(1)?;
    let parallel = run(8)?;
    assert_eq!(serial.len(), 500);
    assert_eq!(serial, parallel);
    Ok(())
}

#[test]
fn test_decode_error_aborts_without_final_flush() -> anyhow::Result<()> {
    let importer = pairs_importer(2, 1)?;
    let sinks = Recorder::default();
    let seen = Arc::clone(&sinks.0);

    let result = importer.import(
        input("1,10\nx,20\n3,30\n4,40\n5,50\n"),
        sinks,
        |_: &FlushProgress| -> anyhow::Result<()> { Ok(()) },
    );

    match result {
        Err(ImportError::Decode {
            row, ref column, ref raw, ..
        }) => {
            assert_eq!(row, 2);
            assert_eq!(column, "a");
            assert_eq!(raw, "x");
        }
        other => panic!("expected a decode error, got {other:?}"),
    }
    assert_eq!(*seen.rows.lock().unwrap(), [(0, 1)]);
    assert_eq!(seen.flushes.load(Ordering::SeqCst), 0);
    assert_eq!(seen.closed.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_decode_error_is_reported_with_many_workers() -> anyhow::Result<()> {
    let mut contents = orders_csv(200, false);
    contents.push_str("201,customer-x,not-money,2024-01-01T00:00:00Z,t\n");
    contents.push_str(&orders_csv(50, false));

    let options = ImportOptions::default().with_batch_size(16).with_workers(4);
    let importer = Importer::new(options, orders_schema())?;
    let out = collect_import(&importer, input(contents));

    match out.result {
        Err(ImportError::Decode {
            row,
            column,
            column_type,
            ..
        }) => {
            assert_eq!(row, 201);
            assert_eq!(column, "amount");
            assert_eq!(column_type, ColumnType::Decimal);
        }
        other => panic!("expected a decode error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_batch_before_bad_record_is_flushed_first() -> anyhow::Result<()> {
    let importer = pairs_importer(2, 1)?;
    let sinks = Recorder::default();
    let seen = Arc::clone(&sinks.0);
    let mut progress = Vec::new();

    let result = importer.import(
        input("1,2\n3,4\nbad\n5,6\n"),
        sinks,
        |p: &FlushProgress| -> anyhow::Result<()> {
            progress.push(*p);
            Ok(())
        },
    );

    match result {
        Err(ImportError::FieldCount {
            row, expected, actual, ..
        }) => assert_eq!((row, expected, actual), (3, 2, 1)),
        other => panic!("expected a field count error, got {other:?}"),
    }
    assert_eq!(flushes(&progress), [(2, false)]);
    assert_eq!(*seen.rows.lock().unwrap(), [(0, 1), (0, 2)]);
    assert_eq!(seen.flushes.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_progress_callback_failure_aborts() -> anyhow::Result<()> {
    let importer = pairs_importer(2, 2)?;
    let mut calls = 0;
    let result = importer.import(
        input(pairs_csv(10)),
        Recorder::default(),
        |_: &FlushProgress| -> anyhow::Result<()> {
            calls += 1;
            anyhow::bail!("job record is gone")
        },
    );

    let err = result.unwrap_err();
    assert!(matches!(err, ImportError::Callback(_)));
    assert!(err.to_string().contains("job record is gone"));
    assert_eq!(calls, 1);
    Ok(())
}

#[test]
fn test_external_cancellation() -> anyhow::Result<()> {
    let importer = pairs_importer(10, 2)?;
    let token = importer.cancel_token();
    let sinks = Recorder::default();
    let seen = Arc::clone(&sinks.0);

    let result = importer.import(
        input(pairs_csv(200)),
        sinks,
        |_: &FlushProgress| -> anyhow::Result<()> {
            token.cancel();
            Ok(())
        },
    );

    assert!(matches!(result, Err(ImportError::Cancelled)));
    assert_eq!(seen.flushes.load(Ordering::SeqCst), 0);
    assert_eq!(seen.closed.load(Ordering::SeqCst), 1);

    // Cancellation from outside sticks to the importer.
    let out = collect_import(&importer, input(pairs_csv(3)));
    assert!(out.result.unwrap_err().is_cancelled());
    Ok(())
}

#[test]
fn test_cancelled_before_start() -> anyhow::Result<()> {
    let importer = pairs_importer(10, 2)?;
    importer.cancel_token().cancel();
    let out = collect_import(&importer, input(pairs_csv(5)));

    assert!(out.result.unwrap_err().is_cancelled());
    assert!(out.rows.is_empty());
    Ok(())
}

#[test]
fn test_panicking_sink_is_reported() -> anyhow::Result<()> {
    let importer = pairs_importer(4, 2)?;
    let sinks = Recorder::default();
    sinks.0.panic_on_emit.store(true, Ordering::SeqCst);
    let seen = Arc::clone(&sinks.0);

    let result = importer.import(
        input(pairs_csv(50)),
        sinks,
        |_: &FlushProgress| -> anyhow::Result<()> { Ok(()) },
    );

    assert!(matches!(result, Err(ImportError::WorkerPanicked)));
    assert_eq!(seen.closed.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_successful_import_flushes_every_sink() -> anyhow::Result<()> {
    let importer = pairs_importer(3, 4)?;
    let sinks = Recorder::default();
    let seen = Arc::clone(&sinks.0);

    let summary = importer.import(
        input(pairs_csv(25)),
        sinks,
        |_: &FlushProgress| -> anyhow::Result<()> { Ok(()) },
    )?;

    assert_eq!(summary.workers, 4);
    assert_eq!(summary.rows_emitted, 25);
    assert_eq!(seen.flushes.load(Ordering::SeqCst), 4);
    assert_eq!(seen.closed.load(Ordering::SeqCst), 1);
    let mut rows = seen.rows.lock().unwrap().clone();
    rows.sort_unstable();
    assert_eq!(rows, (1..=25).map(|r| (0, r)).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_multiple_files_keep_their_own_numbering() -> anyhow::Result<()> {
    let options = ImportOptions::default()
        .with_skip(1)
        .with_batch_size(4)
        .with_workers(3);
    let importer = Importer::new(options, orders_schema())?;
    let inputs = vec![
        InputFile::from_bytes("a.csv", 0, orders_csv(5, true)),
        InputFile::from_bytes("b.csv", 1, orders_csv(9, true)),
    ];

    let out = collect_import(&importer, inputs);
    let summary = out.result?;

    assert_eq!(summary.files, 2);
    assert_eq!(summary.rows_emitted, 14);
    let keys: Vec<(u32, u64)> = out.rows.iter().map(|r| (r.file_index, r.row)).collect();
    let mut expected: Vec<(u32, u64)> = (2..=6).map(|r| (0, r)).collect();
    expected.extend((2..=10).map(|r| (1, r)));
    assert_eq!(keys, expected);

    let finished: Vec<(u32, u64)> = out
        .progress
        .iter()
        .filter(|p| p.finished)
        .map(|p| (p.file_index, p.records_flushed))
        .collect();
    assert_eq!(finished, [(0, 5), (1, 9)]);
    Ok(())
}

#[test]
fn test_row_groups_respect_group_size() -> anyhow::Result<()> {
    let importer = pairs_importer(5, 1)?;
    let out = collect_import_with_group_size(&importer, input(pairs_csv(12)), 4);
    out.result?;

    // One worker: 4 + 4 + 4 rows.
    assert_eq!(out.groups, 3);
    assert_eq!(out.rows.len(), 12);
    Ok(())
}

#[test]
fn test_tsv_format() -> anyhow::Result<()> {
    let options = ImportOptions::default().with_format(InputFormat::Tsv);
    let importer = Importer::new(options, pair_schema())?;
    let out = collect_import(&importer, input("1\t10\n2\t20\t\n"));
    out.result?;

    assert_eq!(out.rows[1].datums, [Datum::Int(2), Datum::Int(20)]);
    Ok(())
}
