//! Core data models shared by the validator, the copy pipeline and the
//! HTTP surface.
//!
//! Wire names follow the JSON accepted by the obfuscation service
//! (`Name`, `Type`, `NeedToObfuscate`, ...), so plans produced by
//! `schema-info` can be edited and submitted back unchanged.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Table name → ordered columns. Ordered so validation reports are stable.
pub type ObfuscationPlan = BTreeMap<String, Vec<Column>>;

/// A column as it appears in an obfuscation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within its table
    #[serde(rename = "Name")]
    pub name: String,
    /// Declared SQL type, e.g. `varchar(20)` or `int unsigned`
    #[serde(rename = "Type")]
    pub sql_type: String,
    /// In a live-schema model: the column may be masked.
    /// In a submitted plan: the column must be masked.
    #[serde(rename = "NeedToObfuscate")]
    pub needs_obfuscation: bool,
    /// Whether the column is part of the primary key
    #[serde(rename = "IsPrimaryKey")]
    pub is_primary_key: bool,
}

impl Column {
    /// Creates a plain, unmasked, non-key column.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            needs_obfuscation: false,
            is_primary_key: false,
        }
    }

    /// Builder method to mark the column as part of the primary key.
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    /// Builder method to mark the column for masking.
    pub fn obfuscated(mut self) -> Self {
        self.needs_obfuscation = true;
        self
    }
}

/// Key participation of a column as reported by `SHOW COLUMNS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeyRole {
    /// Not part of any index
    #[default]
    None,
    /// `PRI`: part of the primary key
    Primary,
    /// `UNI`: first column of a unique index
    Unique,
    /// `MUL`: first column of a non-unique index (including foreign keys)
    Multiple,
}

impl KeyRole {
    /// Parses the `Key` column of `SHOW COLUMNS`.
    pub fn from_show_columns(key: &str) -> Self {
        match key.trim().to_uppercase().as_str() {
            "PRI" => Self::Primary,
            "UNI" => Self::Unique,
            "MUL" => Self::Multiple,
            _ => Self::None,
        }
    }

    /// Whether the column participates in any key or index.
    pub fn is_key(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// One row of `SHOW COLUMNS FROM <table>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawColumn {
    pub field: String,
    pub sql_type: String,
    pub nullable: bool,
    pub key: KeyRole,
    pub default: Option<String>,
    pub extra: Option<String>,
}

impl RawColumn {
    /// Creates a nullable, non-key raw column with no default.
    pub fn new(field: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            sql_type: sql_type.into(),
            nullable: true,
            key: KeyRole::None,
            default: None,
            extra: None,
        }
    }

    /// Builder method to set the key role.
    pub fn with_key(mut self, key: KeyRole) -> Self {
        self.key = key;
        if key == KeyRole::Primary {
            self.nullable = false;
        }
        self
    }
}

/// Progress of one obfuscation run, as reported to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProgress {
    #[serde(rename = "ProcessId")]
    pub run_id: String,
    #[serde(rename = "FinishedCount")]
    pub finished_count: usize,
    #[serde(rename = "TotalCount")]
    pub total_count: usize,
    /// Terminal error; an empty string on the wire while the run is healthy
    #[serde(
        rename = "Error",
        serialize_with = "serialize_last_error",
        deserialize_with = "deserialize_last_error"
    )]
    pub last_error: Option<String>,
}

fn serialize_last_error<S>(error: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(error.as_deref().unwrap_or_default())
}

fn deserialize_last_error<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let error = Option::<String>::deserialize(deserializer)?;
    Ok(error.filter(|e| !e.is_empty()))
}

/// Coarse run state derived from a progress entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl RunProgress {
    /// Creates a zeroed entry for a run over `total_count` tables.
    pub fn new(run_id: impl Into<String>, total_count: usize) -> Self {
        Self {
            run_id: run_id.into(),
            finished_count: 0,
            total_count,
            last_error: None,
        }
    }

    pub fn status(&self) -> RunStatus {
        if self.last_error.is_some() {
            RunStatus::Failed
        } else if self.finished_count >= self.total_count {
            RunStatus::Completed
        } else {
            RunStatus::Running
        }
    }
}

/// A single cell read from a source row.
///
/// Source drivers hand back loosely typed values; the copy pipeline narrows
/// them to this enum before masking and binds them back unchanged otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Bytes(Vec<u8>),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Canonical byte form used for hashing.
    ///
    /// Text and bytes are taken verbatim; numbers and booleans use their
    /// shortest decimal / `true`/`false` spelling. `Null` has no canonical form.
    pub fn canonical_bytes(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(Cow::Borrowed(s.as_bytes())),
            Self::Bytes(b) => Some(Cow::Borrowed(b.as_slice())),
            other => other
                .canonical_text()
                .map(|text| Cow::Owned(text.into_owned().into_bytes())),
        }
    }

    /// Canonical text form used for numeric parsing and log messages.
    pub fn canonical_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(Cow::Borrowed(s.as_str())),
            Self::Bytes(b) => Some(String::from_utf8_lossy(b)),
            Self::Int(v) => Some(Cow::Owned(v.to_string())),
            Self::UInt(v) => Some(Cow::Owned(v.to_string())),
            Self::Float(v) => Some(Cow::Owned(v.to_string())),
            Self::Bool(v) => Some(Cow::Owned(v.to_string())),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for CellValue {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A row as an ordered list of cells, aligned with the table's column list.
pub type Row = Vec<CellValue>;
