//! Table schema as seen by the import pipeline.
//!
//! The schema is owned by whatever catalog describes the target table; the
//! pipeline only reads it. Hidden columns (computed or system columns) do not
//! take part in text import, so everything here is phrased in terms of the
//! *visible* columns.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Declared type of a column; drives text decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[serde(alias = "boolean")]
    Bool,
    #[serde(alias = "int8", alias = "integer", alias = "bigint")]
    Int,
    #[serde(alias = "float8", alias = "double")]
    Float,
    #[serde(alias = "numeric")]
    Decimal,
    #[serde(alias = "text", alias = "varchar")]
    String,
    #[serde(alias = "bytea")]
    Bytes,
    Date,
    Time,
    Timestamp,
    Timestamptz,
    Uuid,
    #[serde(alias = "jsonb")]
    Json,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "BOOL",
            Self::Int => "INT8",
            Self::Float => "FLOAT8",
            Self::Decimal => "DECIMAL",
            Self::String => "STRING",
            Self::Bytes => "BYTES",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Timestamptz => "TIMESTAMPTZ",
            Self::Uuid => "UUID",
            Self::Json => "JSONB",
        };
        f.write_str(name)
    }
}

/// A single column of the target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    /// Hidden columns are skipped by text import.
    #[serde(default)]
    pub hidden: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            hidden: false,
        }
    }

    pub fn hidden(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            hidden: true,
            ..Self::new(name, ty)
        }
    }
}

/// Ordered column list of the table being imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Columns that take part in text import, in ordinal order.
    pub fn visible_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| !c.hidden)
    }

    /// Number of fields every input record must carry.
    #[must_use]
    pub fn expected_fields(&self) -> usize {
        self.visible_columns().count()
    }

    /// Load a schema from a JSON document such as
    /// `{"name": "t", "columns": [{"name": "id", "type": "int"}]}`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid schema.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse table schema {}", path.display()))
    }
}
