//! `bulkload`: convert delimited text files into typed JSON rows.
//!
//! ```text
//! bulkload --schema orders.json --skip 1 --nullif '\N' \
//!     --output rows.jsonl.zst --metrics metrics.json 'exports/orders-*.csv.gz'
//! ```

use anyhow::{Context, Result, bail};
use bulkload::io::{CodecRegistry, Compression, FinishWrite, OutputWriter, open_inputs};
use bulkload::{
    ChannelSinkFactory, FlushProgress, ImportOptions, Importer, InputFormat, RowGroup, TableSchema,
};
use clap::{ArgAction, Parser};
use crossbeam_channel::{Receiver, bounded};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "bulkload",
    version,
    about = "Convert CSV/TSV files into typed rows of a table",
    long_about = "Convert CSV/TSV files into typed rows of a table.\n\n\
                  Rows are written as JSON lines (one object per row, with the file\n\
                  index and 1-based record number). Inputs may be compressed."
)]
struct Cli {
    /// Input files or glob patterns, read in order.
    #[arg(value_name = "FILE", required = true)]
    inputs: Vec<String>,

    /// Table schema (JSON: {"name": ..., "columns": [{"name", "type", "hidden"}]}).
    #[arg(long, value_name = "PATH")]
    schema: PathBuf,

    /// Import options as JSON; flags below override it.
    #[arg(long, value_name = "PATH")]
    options: Option<PathBuf>,

    /// Input format (csv or tsv); picks the default separator.
    #[arg(long)]
    format: Option<InputFormat>,

    /// Field separator (a single ASCII character, or `\t`).
    #[arg(long, value_name = "CHAR", value_parser = parse_char)]
    delimiter: Option<char>,

    /// Lines starting with this character are ignored.
    #[arg(long, value_name = "CHAR", value_parser = parse_char)]
    comment: Option<char>,

    /// Number of leading records to discard (e.g. 1 for a header).
    #[arg(long)]
    skip: Option<u64>,

    /// Field text that means NULL.
    #[arg(long, value_name = "TEXT")]
    nullif: Option<String>,

    /// Records per batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Converter threads (default: number of CPUs).
    #[arg(long)]
    workers: Option<usize>,

    /// Input decompression: auto, none, gzip, zstd, bzip2, xz.
    #[arg(long)]
    compression: Option<Compression>,

    /// Write rows here (compressed by extension); stdout when omitted.
    #[arg(long, short, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Save import metrics as JSON.
    #[arg(long, value_name = "PATH")]
    metrics: Option<PathBuf>,

    /// Print import metrics to stderr when done.
    #[arg(long)]
    stats: bool,

    /// More logging (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Errors only.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn parse_char(s: &str) -> Result<char, String> {
    match s {
        "\\t" | "tab" => Ok('\t'),
        _ => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(format!("expected a single character, got {s:?}")),
            }
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_options(cli: &Cli) -> Result<ImportOptions> {
    let mut options = match &cli.options {
        Some(path) => ImportOptions::from_json_file(path)?,
        None => ImportOptions::default(),
    };
    if let Some(format) = cli.format {
        options.format = format;
    }
    if let Some(sep) = cli.delimiter {
        options.field_separator = Some(sep);
    }
    if let Some(comment) = cli.comment {
        options.comment = Some(comment);
    }
    if let Some(skip) = cli.skip {
        options.skip = skip;
    }
    if let Some(null) = &cli.nullif {
        options.null_encoding = Some(null.clone());
    }
    if let Some(batch_size) = cli.batch_size {
        options.batch_size = batch_size;
    }
    if let Some(workers) = cli.workers {
        options.workers = Some(workers);
    }
    if let Some(compression) = cli.compression {
        options.compression = compression;
    }
    Ok(options)
}

/// Drain row groups into JSON lines until every sink is gone.
fn write_rows(
    rx: Receiver<RowGroup>,
    output: Option<(PathBuf, File)>,
    columns: Vec<String>,
    files: Vec<Arc<str>>,
) -> Result<u64> {
    let mut out: OutputWriter = match output {
        Some((path, file)) => CodecRegistry::builtin()
            .auto_detect_writer(file, &path)
            .with_context(|| format!("open output {}", path.display()))?,
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut written = 0;
    for group in rx {
        for row in group.rows {
            let values: Map<String, Value> = columns
                .iter()
                .cloned()
                .zip(row.datums.iter().map(bulkload::Datum::to_json))
                .collect();
            let file = files
                .get(row.file_index as usize)
                .map_or(Value::Null, |name| Value::from(&**name));
            let line = serde_json::json!({
                "file": file,
                "row": row.row,
                "values": values,
            });
            serde_json::to_writer(&mut out, &line)?;
            out.write_all(b"\n")?;
            written += 1;
        }
    }
    out.finish().context("finish output")?;
    Ok(written)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let schema = TableSchema::from_json_file(&cli.schema)?;
    let options = build_options(&cli)?;
    let columns: Vec<String> = schema.visible_columns().map(|c| c.name.clone()).collect();
    let importer = Importer::new(options, schema)?;

    let inputs = open_inputs(&cli.inputs, importer.options().compression, &CodecRegistry::builtin())?;
    let files: Vec<Arc<str>> = inputs.iter().map(|i| Arc::clone(&i.name)).collect();

    let (tx, rx) = bounded::<RowGroup>(16);
    let output = match &cli.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
            Some((path.clone(), file))
        }
        None => None,
    };
    let writer_files = files.clone();
    let writer = thread::spawn(move || write_rows(rx, output, columns, writer_files));

    let result = importer.import(
        inputs,
        ChannelSinkFactory::new(tx),
        |p: &FlushProgress| -> Result<()> {
            if p.finished {
                let name = files.get(p.file_index as usize).map_or("?", |f| &**f);
                info!(file = name, records = p.records_flushed, "file converted");
            }
            Ok(())
        },
    );

    let written = match writer.join() {
        Ok(res) => res,
        Err(_) => bail!("output writer panicked"),
    };
    // Import errors take precedence over writer errors.
    let summary = result?;
    let written = written?;

    info!(
        files = summary.files,
        rows = summary.rows_emitted,
        written,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "done"
    );

    let metrics = summary.to_metrics();
    if let Some(path) = &cli.metrics {
        metrics.save_to_file(path)?;
    }
    if cli.stats {
        eprintln!("{:#}", metrics.to_json());
    }
    Ok(())
}
