//! Per-worker conversion of raw records into typed rows.

use crate::batch::RecordBatch;
use crate::datum::Datum;
use crate::error::{ImportError, ImportResult};
use crate::schema::{ColumnDescriptor, TableSchema};
use crate::sink::RowSink;
use std::sync::Arc;

/// Decodes records against a schema and forwards them to a [`RowSink`].
///
/// The decoded row buffer is reused across rows; sinks must copy what they
/// keep.
pub struct RowConverter<S: RowSink> {
    columns: Vec<ColumnDescriptor>,
    null_encoding: Option<String>,
    datums: Vec<Datum>,
    sink: S,
    rows_emitted: u64,
}

impl<S: RowSink> RowConverter<S> {
    /// Bind a converter to the visible columns of `schema`.
    ///
    /// # Errors
    /// Returns [`ImportError::Config`] when the schema has no visible columns.
    pub fn new(schema: &TableSchema, null_encoding: Option<String>, sink: S) -> ImportResult<Self> {
        let columns: Vec<ColumnDescriptor> = schema.visible_columns().cloned().collect();
        if columns.is_empty() {
            return Err(ImportError::config(format!(
                "table {:?} has no visible columns to import",
                schema.name
            )));
        }
        Ok(Self {
            datums: vec![Datum::Null; columns.len()],
            columns,
            null_encoding,
            sink,
            rows_emitted: 0,
        })
    }

    /// Decode and emit every record of `batch`.
    ///
    /// A field equal to the null encoding becomes [`Datum::Null`] whatever
    /// the column type; every other field is parsed.
    ///
    /// # Errors
    /// Returns [`ImportError::Decode`] for the first field that does not
    /// parse, or [`ImportError::Emit`] if the sink rejects a row. A sink
    /// that stopped because the import was cancelled yields
    /// [`ImportError::Cancelled`].
    pub fn convert_batch(&mut self, batch: &RecordBatch) -> ImportResult<()> {
        for (row, record) in batch.rows() {
            for (i, (column, slot)) in self.columns.iter().zip(&mut self.datums).enumerate() {
                let raw = record.get(i).unwrap_or_default();
                *slot = if self.null_encoding.as_deref() == Some(raw) {
                    Datum::Null
                } else {
                    Datum::parse(column.ty, raw).map_err(|source| ImportError::Decode {
                        file: Arc::clone(&batch.file),
                        row,
                        column: column.name.clone(),
                        column_type: column.ty,
                        raw: raw.to_owned(),
                        source,
                    })?
                };
            }
            self.sink
                .emit_row(batch.file_index, row, &self.datums)
                .map_err(|source| {
                    sink_error(source, |source| ImportError::Emit {
                        file: Arc::clone(&batch.file),
                        row,
                        source,
                    })
                })?;
            self.rows_emitted += 1;
        }
        Ok(())
    }

    /// Final sink flush after a clean drain. Returns the rows emitted.
    ///
    /// # Errors
    /// Returns [`ImportError::Flush`] if the sink fails to flush.
    pub fn finish(mut self) -> ImportResult<u64> {
        self.sink
            .flush()
            .map_err(|source| sink_error(source, ImportError::Flush))?;
        Ok(self.rows_emitted)
    }

    #[must_use]
    pub const fn rows_emitted(&self) -> u64 {
        self.rows_emitted
    }
}

// Sinks report cancellation as an `ImportError::Cancelled` inside anyhow.
fn sink_error(source: anyhow::Error, wrap: impl FnOnce(anyhow::Error) -> ImportError) -> ImportError {
    match source.downcast::<ImportError>() {
        Ok(ImportError::Cancelled) => ImportError::Cancelled,
        Ok(other) => wrap(other.into()),
        Err(source) => wrap(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use crate::sink::EmittedRow;
    use csv::StringRecord;

    #[derive(Default)]
    struct VecSink {
        rows: Vec<EmittedRow>,
        fail_at: Option<u64>,
    }

    impl RowSink for VecSink {
        fn emit_row(&mut self, file_index: u32, row: u64, datums: &[Datum]) -> anyhow::Result<()> {
            if self.fail_at == Some(row) {
                anyhow::bail!("storage rejected row");
            }
            self.rows.push(EmittedRow {
                file_index,
                row,
                datums: datums.to_vec(),
            });
            Ok(())
        }

        fn flush(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn schema() -> TableSchema {
        TableSchema::new(
            "t",
            vec![
                ColumnDescriptor::new("id", ColumnType::Int),
                ColumnDescriptor::hidden("rowid", ColumnType::Int),
                ColumnDescriptor::new("name", ColumnType::String),
            ],
        )
    }

    fn batch(first_row: u64, records: &[&[&str]]) -> RecordBatch {
        let mut batch = RecordBatch::new(Arc::from("t.csv"), 1, records.len());
        for (row, r) in (first_row..).zip(records) {
            batch.push(row, StringRecord::from(r.to_vec()));
        }
        batch
    }

    #[test]
    fn decodes_rows_with_batch_row_numbers() {
        let mut conv = RowConverter::new(&schema(), None, VecSink::default()).unwrap();
        conv.convert_batch(&batch(5, &[&["1", "a"], &["2", "b"]])).unwrap();
        assert_eq!(conv.rows_emitted(), 2);
        let rows = &conv.sink.rows;
        assert_eq!(rows[0].row, 5);
        assert_eq!(rows[1].row, 6);
        assert_eq!(rows[1].file_index, 1);
        assert_eq!(rows[1].datums, [Datum::Int(2), Datum::String("b".into())]);
    }

    #[test]
    fn null_encoding_applies_to_any_type() {
        let mut conv =
            RowConverter::new(&schema(), Some("\\N".into()), VecSink::default()).unwrap();
        conv.convert_batch(&batch(1, &[&["\\N", "\\N"], &["3", ""]])).unwrap();
        let rows = &conv.sink.rows;
        assert_eq!(rows[0].datums, [Datum::Null, Datum::Null]);
        assert_eq!(rows[1].datums, [Datum::Int(3), Datum::String(String::new())]);
    }

    #[test]
    fn decode_error_names_row_and_column() {
        let mut conv = RowConverter::new(&schema(), None, VecSink::default()).unwrap();
        let err = conv
            .convert_batch(&batch(10, &[&["1", "a"], &["x", "b"]]))
            .unwrap_err();
        match err {
            ImportError::Decode {
                row,
                ref column,
                column_type,
                ref raw,
                ..
            } => {
                assert_eq!(row, 11);
                assert_eq!(column, "id");
                assert_eq!(column_type, ColumnType::Int);
                assert_eq!(raw, "x");
            }
            ref other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().starts_with("t.csv: row 11: parse \"id\" as INT8"));
    }

    #[test]
    fn sink_failure_becomes_emit_error() {
        let sink = VecSink {
            fail_at: Some(2),
            ..VecSink::default()
        };
        let mut conv = RowConverter::new(&schema(), None, sink).unwrap();
        let err = conv
            .convert_batch(&batch(1, &[&["1", "a"], &["2", "b"]]))
            .unwrap_err();
        assert!(matches!(err, ImportError::Emit { row: 2, .. }));
        assert!(err.to_string().starts_with("converting row: t.csv: row 2"));
    }

    #[test]
    fn finish_reports_flush_failure() {
        struct BrokenFlush;
        impl RowSink for BrokenFlush {
            fn emit_row(&mut self, _: u32, _: u64, _: &[Datum]) -> anyhow::Result<()> {
                Ok(())
            }
            fn flush(&mut self) -> anyhow::Result<()> {
                anyhow::bail!("disk full")
            }
        }
        let mut conv = RowConverter::new(&schema(), None, BrokenFlush).unwrap();
        conv.convert_batch(&batch(1, &[&["1", "a"]])).unwrap();
        assert!(matches!(conv.finish(), Err(ImportError::Flush(_))));

        let conv = RowConverter::new(&schema(), None, VecSink::default()).unwrap();
        assert_eq!(conv.finish().unwrap(), 0);
    }

    #[test]
    fn rejects_schema_without_visible_columns() {
        let schema = TableSchema::new("t", vec![ColumnDescriptor::hidden("rowid", ColumnType::Int)]);
        assert!(matches!(
            RowConverter::new(&schema, None, VecSink::default()),
            Err(ImportError::Config(_))
        ));
    }
}
