use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Maximum number of representative values kept per field.
pub const SAMPLE_SIZE: usize = 5;

/// A single cell as handed over by a loader.
///
/// Serializes untagged: missing cells become `null`, datetimes ISO-8601
/// strings, everything else its natural JSON form. Strings always read back
/// as `Text`, so values headed for JSON go through [`Value::to_sample`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    /// Missing markers and float NaN both count as missing.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Missing => true,
            Value::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// The form this value takes after a JSON round trip: datetimes become
    /// ISO text and non-finite floats their textual spelling.
    pub fn to_sample(&self) -> Value {
        match self {
            Value::DateTime(dt) => Value::Text(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Value::Float(v) if !v.is_finite() => Value::Text(v.to_string()),
            other => other.clone(),
        }
    }

    /// Identity used for distinct counts and frequency grouping. Whole floats
    /// share their key with the equal integer.
    pub(crate) fn key(&self) -> Option<ValueKey<'_>> {
        match self {
            _ if self.is_missing() => None,
            Value::Missing => None,
            Value::Bool(b) => Some(ValueKey::Bool(*b)),
            Value::Int(i) => Some(ValueKey::Int(*i)),
            Value::Float(v) => {
                if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v < i64::MAX as f64 {
                    Some(ValueKey::Int(*v as i64))
                } else {
                    Some(ValueKey::Float(v.to_bits()))
                }
            }
            Value::DateTime(dt) => Some(ValueKey::DateTime(*dt)),
            Value::Text(s) => Some(ValueKey::Text(s.as_str())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 => {
                write!(f, "{:.1}", v)
            }
            Value::Float(v) => write!(f, "{}", v),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Missing, Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ValueKey<'a> {
    Bool(bool),
    Int(i64),
    Float(u64),
    DateTime(NaiveDateTime),
    Text(&'a str),
}

/// Native representation of a column, as reported by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Boolean,
    Integer,
    Float,
    DateTime,
    /// Text or a mix of cell types.
    Text,
}

impl ColumnKind {
    pub fn infer<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let (mut bools, mut ints, mut floats, mut dates, mut other) = (0, 0, 0, 0, 0);
        for value in values.into_iter().filter(|v| !v.is_missing()) {
            match value {
                Value::Bool(_) => bools += 1,
                Value::Int(_) => ints += 1,
                Value::Float(_) => floats += 1,
                Value::DateTime(_) => dates += 1,
                _ => other += 1,
            }
        }

        let numeric = ints + floats;
        match () {
            _ if other > 0 => ColumnKind::Text,
            _ if bools > 0 && numeric + dates == 0 => ColumnKind::Boolean,
            _ if dates > 0 && numeric + bools == 0 => ColumnKind::DateTime,
            _ if floats > 0 && bools + dates == 0 => ColumnKind::Float,
            _ if ints > 0 && bools + dates == 0 => ColumnKind::Integer,
            _ => ColumnKind::Text,
        }
    }
}

/// A named, ordered sequence of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    kind: ColumnKind,
    values: Vec<Value>,
}

impl Column {
    /// Creates a column, inferring its native kind from the values.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        let kind = ColumnKind::infer(&values);
        Self::with_kind(name, kind, values)
    }

    /// Creates a column whose native kind is already known (e.g. from a
    /// typed file format).
    pub fn with_kind(name: impl Into<String>, kind: ColumnKind, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }

    pub fn from_values<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(name, values.into_iter().map(Into::into).collect())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn non_missing(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().filter(|v| !v.is_missing())
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_missing()).count()
    }

    pub fn non_missing_count(&self) -> usize {
        self.len() - self.missing_count()
    }

    pub fn distinct_count(&self) -> usize {
        self.values
            .iter()
            .filter_map(Value::key)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Distinct non-missing values in first-occurrence order.
    pub fn distinct_values(&self) -> Vec<&Value> {
        let mut seen = HashSet::new();
        self.values
            .iter()
            .filter(|&v| v.key().map_or(false, |key| seen.insert(key)))
            .collect()
    }
}

/// An in-memory table: equally long, uniquely named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    row_count: usize,
}

impl Dataset {
    pub fn new(columns: Vec<Column>) -> Result<Self, AppError> {
        let row_count = columns.first().map_or(0, Column::len);

        if let Some(ragged) = columns.iter().find(|c| c.len() != row_count) {
            return Err(AppError::InvalidInput(format!(
                "Column '{}' has {} rows, expected {}",
                ragged.name(),
                ragged.len(),
                row_count
            )));
        }

        let mut names = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !names.insert(c.name())) {
            return Err(AppError::InvalidInput(format!(
                "Duplicate column name '{}'",
                dup.name()
            )));
        }

        Ok(Self { columns, row_count })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row(&self, idx: usize) -> Option<Vec<Value>> {
        if idx >= self.row_count {
            return None;
        }
        Some(self.columns.iter().map(|c| c.values[idx].clone()).collect())
    }
}

/// How [`sample_rows`](super::analyzer::DatasetAnalyzer::sample_rows) picks rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleMode {
    #[default]
    Head,
    Random,
}

impl FromStr for SampleMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "head" => Ok(SampleMode::Head),
            "random" => Ok(SampleMode::Random),
            other => Err(AppError::InvalidInput(format!("Unknown sample mode: {}", other))),
        }
    }
}

/// A row-oriented excerpt of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}
