//! Post-run metrics for imports.
//!
//! A [`MetricsCollector`] holds named counters and gauges plus the wall-clock
//! time of the run. [`ImportSummary::to_metrics`](crate::ImportSummary::to_metrics)
//! fills one from a finished import; callers can add their own readings next
//! to the built-in counters before printing or saving them.
//!
//! # Example
//!
//! ```no_run
//! use bulkload::metrics::MetricsCollector;
//!
//! # fn main() -> anyhow::Result<()> {
//! let metrics = MetricsCollector::new();
//! metrics.record_start();
//! metrics.increment_counter("rows_emitted", 1_000);
//! metrics.set_gauge("target_replicas", 3.0);
//! metrics.describe("target_replicas", "Replicas the rows are written to");
//! metrics.record_end();
//!
//! metrics.print();
//! metrics.save_to_file("import-metrics.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A single reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// A count that only grows during a run.
    Counter(u64),
    /// A point-in-time measurement.
    Gauge(f64),
}

impl MetricValue {
    #[must_use]
    pub fn to_json(self) -> Value {
        match self {
            Self::Counter(n) => json!(n),
            Self::Gauge(x) => json!(x),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: MetricValue,
    description: Option<String>,
}

#[derive(Debug, Default)]
struct Readings {
    entries: BTreeMap<String, Entry>,
    started: Option<Instant>,
    ended: Option<Instant>,
    elapsed: Option<Duration>,
}

/// Thread-safe set of named readings with the run's execution time.
///
/// Clones share the same readings.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    readings: Arc<Mutex<Readings>>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Readings> {
        self.readings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn put(&self, name: &str, value: MetricValue) {
        self.lock()
            .entries
            .entry(name.to_owned())
            .and_modify(|e| e.value = value)
            .or_insert(Entry {
                value,
                description: None,
            });
    }

    pub fn record_start(&self) {
        self.lock().started = Some(Instant::now());
    }

    pub fn record_end(&self) {
        self.lock().ended = Some(Instant::now());
    }

    /// Record a duration measured elsewhere; takes precedence over the
    /// start/end timestamps.
    pub fn set_elapsed(&self, elapsed: Duration) {
        self.lock().elapsed = Some(elapsed);
    }

    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let readings = self.lock();
        readings.elapsed.or_else(|| match (readings.started, readings.ended) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        })
    }

    /// Add `by` to a counter, starting it at zero if needed.
    ///
    /// A gauge registered under `name` is left untouched.
    pub fn increment_counter(&self, name: &str, by: u64) {
        let mut readings = self.lock();
        let entry = readings.entries.entry(name.to_owned()).or_insert(Entry {
            value: MetricValue::Counter(0),
            description: None,
        });
        if let MetricValue::Counter(n) = &mut entry.value {
            *n += by;
        }
    }

    /// Set a counter, replacing any reading of the same name.
    pub fn set_counter(&self, name: &str, value: u64) {
        self.put(name, MetricValue::Counter(value));
    }

    /// Set a gauge, replacing any reading of the same name.
    pub fn set_gauge(&self, name: &str, value: f64) {
        self.put(name, MetricValue::Gauge(value));
    }

    /// Attach a description to an existing reading.
    pub fn describe(&self, name: &str, description: impl Into<String>) {
        if let Some(entry) = self.lock().entries.get_mut(name) {
            entry.description = Some(description.into());
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<MetricValue> {
        self.lock().entries.get(name).map(|e| e.value)
    }

    /// All readings as a JSON object keyed by name, each holding `value` and,
    /// when set, `description`. The execution time appears as
    /// `execution_time_ms`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let elapsed = self.elapsed();
        let mut out = serde_json::Map::new();
        for (name, entry) in &self.lock().entries {
            let mut obj = serde_json::Map::new();
            obj.insert("value".to_owned(), entry.value.to_json());
            if let Some(desc) = &entry.description {
                obj.insert("description".to_owned(), json!(desc));
            }
            out.insert(name.clone(), Value::Object(obj));
        }
        if let Some(elapsed) = elapsed {
            out.insert(
                "execution_time_ms".to_owned(),
                json!({
                    "value": u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "description": "Total import time in milliseconds",
                }),
            );
        }
        Value::Object(out)
    }

    /// Print all readings to stdout, sorted by name.
    pub fn print(&self) {
        println!("\n=========== Import Metrics ===========");
        if let Some(elapsed) = self.elapsed() {
            println!(
                "Execution Time: {:.3}s ({} ms)",
                elapsed.as_secs_f64(),
                elapsed.as_millis()
            );
            println!("--------------------------------------");
        }
        for (name, entry) in &self.lock().entries {
            let value = entry.value.to_json();
            match &entry.description {
                Some(desc) => println!("{name}: {value} ({desc})"),
                None => println!("{name}: {value}"),
            }
        }
        println!("======================================\n");
    }

    /// Save all readings to a pretty-printed JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.to_json())
            .with_context(|| format!("write {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("write {}", path.display()))
    }

    /// Reading names and values, without the execution time.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.lock()
            .entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.value.to_json()))
            .collect()
    }
}
