//! Declarative column lists of the six record types.
//!
//! Column order defines the CSV layout of staged files and the column list of external tables,
//! so the decomposer, the CSV writer and the loader all read it from a [`SchemaRegistry`].

mod registry;

pub use registry::*;

use serde::Deserialize;
use std::fmt;

use crate::types::RecordType;

/// Warehouse type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ColumnType {
    #[default]
    #[serde(rename = "STRING")]
    String,
    #[serde(rename = "INTEGER", alias = "INT64")]
    Integer,
    #[serde(rename = "FLOAT", alias = "FLOAT64")]
    Float,
    #[serde(rename = "BOOLEAN", alias = "BOOL")]
    Boolean,
    #[serde(rename = "TIMESTAMP")]
    Timestamp,
    #[serde(rename = "DATE")]
    Date,
    #[serde(rename = "NUMERIC")]
    Numeric,
}

impl ColumnType {
    /// Returns the GoogleSQL type name used in DDL statements.
    pub fn ddl_type(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "int64",
            ColumnType::Float => "float64",
            ColumnType::Boolean => "bool",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Date => "date",
            ColumnType::Numeric => "numeric",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

/// A single declared column.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type", default)]
    pub typ: ColumnType,
    #[serde(default)]
    pub mode: ColumnMode,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, typ: ColumnType, mode: ColumnMode) -> Self {
        Self {
            name: name.into(),
            typ,
            mode,
        }
    }

    /// Returns the DDL type of the column, wrapped in `array<>` for repeated columns.
    pub fn ddl_type(&self) -> String {
        match self.mode {
            ColumnMode::Repeated => format!("array<{}>", self.typ.ddl_type()),
            ColumnMode::Nullable | ColumnMode::Required => self.typ.ddl_type().to_string(),
        }
    }

    pub fn is_required(&self) -> bool {
        self.mode == ColumnMode::Required
    }
}

/// Ordered column list of one record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub record_type: RecordType,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(record_type: RecordType, columns: Vec<ColumnSchema>) -> Self {
        Self {
            record_type,
            columns,
        }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|column| column.name == name)
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} columns)", self.record_type, self.columns.len())
    }
}
