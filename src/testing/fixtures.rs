//! Sample table and input data.

use crate::schema::{ColumnDescriptor, ColumnType, TableSchema};
use std::fmt::Write;

/// An `orders` table: five visible columns and a hidden row id.
///
/// ```
/// use bulkload::testing::orders_schema;
///
/// assert_eq!(orders_schema().expected_fields(), 5);
/// ```
#[must_use]
pub fn orders_schema() -> TableSchema {
    TableSchema::new(
        "orders",
        vec![
            ColumnDescriptor::new("id", ColumnType::Int),
            ColumnDescriptor::new("customer", ColumnType::String),
            ColumnDescriptor::new("amount", ColumnType::Decimal),
            ColumnDescriptor::hidden("rowid", ColumnType::Int),
            ColumnDescriptor::new("placed_at", ColumnType::Timestamptz),
            ColumnDescriptor::new("paid", ColumnType::Bool),
        ],
    )
}

/// A two-column integer table, handy for shape and numbering tests.
#[must_use]
pub fn pair_schema() -> TableSchema {
    TableSchema::new(
        "pairs",
        vec![
            ColumnDescriptor::new("a", ColumnType::Int),
            ColumnDescriptor::new("b", ColumnType::Int),
        ],
    )
}

/// One `orders` record for id `i` (no line terminator).
#[must_use]
pub fn order_line(i: u64) -> String {
    format!(
        "{i},customer-{},{}.{:02},2024-01-{:02}T{:02}:00:00Z,{}",
        i % 7,
        i * 3,
        i % 100,
        i % 28 + 1,
        i % 24,
        if i % 2 == 0 { "t" } else { "f" }
    )
}

/// `n` order records with ids `1..=n`, optionally preceded by a header.
#[must_use]
pub fn orders_csv(n: u64, with_header: bool) -> String {
    let mut out = String::new();
    if with_header {
        out.push_str("id,customer,amount,placed_at,paid\n");
    }
    for i in 1..=n {
        let _ = writeln!(out, "{}", order_line(i));
    }
    out
}

/// `n` records of `pair_schema`, where record `i` is `i,i*10`.
#[must_use]
pub fn pairs_csv(n: u64) -> String {
    let mut out = String::new();
    for i in 1..=n {
        let _ = writeln!(out, "{i},{}", i * 10);
    }
    out
}
