//! Analysis records produced by the profiler and their JSON encoding.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::services::dataset::types::{Value, SAMPLE_SIZE};

/// Semantic type assigned to a column by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Categorical,
    Id,
    Unknown,
}

impl FieldType {
    pub const ALL: [FieldType; 8] = [
        FieldType::String,
        FieldType::Integer,
        FieldType::Float,
        FieldType::Boolean,
        FieldType::DateTime,
        FieldType::Categorical,
        FieldType::Id,
        FieldType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::DateTime => "datetime",
            FieldType::Categorical => "categorical",
            FieldType::Id => "id",
            FieldType::Unknown => "unknown",
        }
    }

    /// Whether `stats` is the variant this field type is summarised with.
    pub fn accepts(&self, stats: &FieldStats) -> bool {
        matches!(
            (self, stats),
            (
                FieldType::Categorical | FieldType::Boolean | FieldType::Id,
                FieldStats::Categorical(_)
            ) | (FieldType::Integer | FieldType::Float, FieldStats::Numerical(_))
                | (FieldType::String, FieldStats::String(_))
                | (FieldType::DateTime, FieldStats::DateTime(_))
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopValue {
    pub value: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalStats {
    pub unique_count: usize,
    pub top_values: Vec<TopValue>,
    pub missing_count: usize,
    pub missing_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quartiles {
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericalStats {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std_dev: Option<f64>,
    pub quartiles: Option<Quartiles>,
    pub missing_count: usize,
    pub missing_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringStats {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub avg_length: Option<f64>,
    pub unique_count: usize,
    pub missing_count: usize,
    pub missing_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeStats {
    pub min_date: Option<NaiveDateTime>,
    pub max_date: Option<NaiveDateTime>,
    pub unique_count: usize,
    pub missing_count: usize,
    pub missing_percentage: f64,
}

/// The statistics computed for one field; which variant is present is
/// decided by the field's [`FieldType`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldStats {
    Categorical(CategoricalStats),
    Numerical(NumericalStats),
    String(StringStats),
    DateTime(DateTimeStats),
}

impl FieldStats {
    pub fn missing_count(&self) -> usize {
        match self {
            FieldStats::Categorical(s) => s.missing_count,
            FieldStats::Numerical(s) => s.missing_count,
            FieldStats::String(s) => s.missing_count,
            FieldStats::DateTime(s) => s.missing_count,
        }
    }

    pub fn missing_percentage(&self) -> f64 {
        match self {
            FieldStats::Categorical(s) => s.missing_percentage,
            FieldStats::Numerical(s) => s.missing_percentage,
            FieldStats::String(s) => s.missing_percentage,
            FieldStats::DateTime(s) => s.missing_percentage,
        }
    }
}

pub type SampleValues = SmallVec<[Value; SAMPLE_SIZE]>;

/// Analysis of a single column.
///
/// On the wire the statistics appear as four nullable keys
/// (`categorical_stats`, `numerical_stats`, `string_stats`,
/// `datetime_stats`), at most one of them non-null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FieldRecord", into = "FieldRecord")]
pub struct FieldAnalysis {
    pub name: String,
    pub field_type: FieldType,
    pub total_count: usize,
    pub stats: Option<FieldStats>,
    pub sample_values: SampleValues,
}

impl FieldAnalysis {
    pub fn categorical_stats(&self) -> Option<&CategoricalStats> {
        match &self.stats {
            Some(FieldStats::Categorical(s)) => Some(s),
            _ => None,
        }
    }

    pub fn numerical_stats(&self) -> Option<&NumericalStats> {
        match &self.stats {
            Some(FieldStats::Numerical(s)) => Some(s),
            _ => None,
        }
    }

    pub fn string_stats(&self) -> Option<&StringStats> {
        match &self.stats {
            Some(FieldStats::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn datetime_stats(&self) -> Option<&DateTimeStats> {
        match &self.stats {
            Some(FieldStats::DateTime(s)) => Some(s),
            _ => None,
        }
    }

    /// Missing count of the populated statistics variant, 0 without one.
    pub fn missing_count(&self) -> usize {
        self.stats.as_ref().map_or(0, FieldStats::missing_count)
    }
}

#[derive(Serialize, Deserialize)]
struct FieldRecord {
    name: String,
    field_type: FieldType,
    total_count: usize,
    categorical_stats: Option<CategoricalStats>,
    numerical_stats: Option<NumericalStats>,
    string_stats: Option<StringStats>,
    datetime_stats: Option<DateTimeStats>,
    sample_values: SampleValues,
}

impl From<FieldAnalysis> for FieldRecord {
    fn from(field: FieldAnalysis) -> Self {
        let mut record = FieldRecord {
            name: field.name,
            field_type: field.field_type,
            total_count: field.total_count,
            categorical_stats: None,
            numerical_stats: None,
            string_stats: None,
            datetime_stats: None,
            sample_values: field.sample_values,
        };
        match field.stats {
            Some(FieldStats::Categorical(s)) => record.categorical_stats = Some(s),
            Some(FieldStats::Numerical(s)) => record.numerical_stats = Some(s),
            Some(FieldStats::String(s)) => record.string_stats = Some(s),
            Some(FieldStats::DateTime(s)) => record.datetime_stats = Some(s),
            None => {}
        }
        record
    }
}

impl TryFrom<FieldRecord> for FieldAnalysis {
    type Error = String;

    fn try_from(record: FieldRecord) -> Result<Self, Self::Error> {
        let mut populated: Vec<FieldStats> = [
            record.categorical_stats.map(FieldStats::Categorical),
            record.numerical_stats.map(FieldStats::Numerical),
            record.string_stats.map(FieldStats::String),
            record.datetime_stats.map(FieldStats::DateTime),
        ]
        .into_iter()
        .flatten()
        .collect();

        if populated.len() > 1 {
            return Err(format!(
                "field '{}' has {} statistics variants, expected at most one",
                record.name,
                populated.len()
            ));
        }

        let stats = populated.pop();
        if let Some(stats) = &stats {
            if !record.field_type.accepts(stats) {
                return Err(format!(
                    "field '{}' of type {} carries mismatched statistics",
                    record.name, record.field_type
                ));
            }
        }

        Ok(FieldAnalysis {
            name: record.name,
            field_type: record.field_type,
            total_count: record.total_count,
            stats,
            sample_values: record.sample_values,
        })
    }
}

/// Complete analysis of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub file_path: String,
    pub file_type: String,
    pub total_rows: usize,
    pub total_columns: usize,
    pub fields: Vec<FieldAnalysis>,
    pub analysis_timestamp: DateTime<Utc>,
    pub processing_time_seconds: f64,
}

impl AnalysisResult {
    pub fn field(&self, name: &str) -> Option<&FieldAnalysis> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use smallvec::smallvec;

    fn numeric_field() -> FieldAnalysis {
        FieldAnalysis {
            name: "price".to_string(),
            field_type: FieldType::Float,
            total_count: 4,
            stats: Some(FieldStats::Numerical(NumericalStats {
                min_value: Some(1.5),
                max_value: Some(9.25),
                mean: Some(4.4167),
                median: Some(2.5),
                std_dev: Some(4.1658),
                quartiles: Some(Quartiles { q25: 2.0, q50: 2.5, q75: 5.875 }),
                missing_count: 1,
                missing_percentage: 25.0,
            })),
            sample_values: smallvec![Value::Float(1.5), Value::Float(2.5), Value::Float(9.25)],
        }
    }

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            file_path: "data/sales.csv".to_string(),
            file_type: "csv".to_string(),
            total_rows: 4,
            total_columns: 2,
            fields: vec![
                numeric_field(),
                FieldAnalysis {
                    name: "empty".to_string(),
                    field_type: FieldType::Unknown,
                    total_count: 4,
                    stats: None,
                    sample_values: SmallVec::new(),
                },
            ],
            analysis_timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            processing_time_seconds: 0.01,
        }
    }

    #[test]
    fn field_types_serialize_lowercase() {
        let json = serde_json::to_string(&FieldType::ALL).unwrap();
        assert_eq!(
            json,
            r#"["string","integer","float","boolean","datetime","categorical","id","unknown"]"#
        );
    }

    #[test]
    fn field_encodes_four_nullable_stat_keys() {
        let value = serde_json::to_value(numeric_field()).unwrap();
        assert!(value["categorical_stats"].is_null());
        assert!(value["string_stats"].is_null());
        assert!(value["datetime_stats"].is_null());
        assert_eq!(value["numerical_stats"]["quartiles"]["q75"], 5.875);
        assert_eq!(value["field_type"], "float");
    }

    #[test]
    fn analysis_result_round_trips() {
        let result = sample_result();
        let json = serde_json::to_string_pretty(&result).unwrap();
        assert!(json.contains("\"analysis_timestamp\": \"2024-03-01T12:00:00Z\""));
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn rejects_mismatched_statistics() {
        let mut value = serde_json::to_value(numeric_field()).unwrap();
        value["field_type"] = serde_json::json!("string");
        let err = serde_json::from_value::<FieldAnalysis>(value).unwrap_err();
        assert!(err.to_string().contains("mismatched statistics"));
    }

    #[test]
    fn rejects_multiple_statistics() {
        let mut value = serde_json::to_value(numeric_field()).unwrap();
        value["string_stats"] = serde_json::json!({
            "min_length": 1, "max_length": 2, "avg_length": 1.5,
            "unique_count": 2, "missing_count": 0, "missing_percentage": 0.0
        });
        assert!(serde_json::from_value::<FieldAnalysis>(value).is_err());
    }

    #[test]
    fn missing_count_comes_from_the_populated_variant() {
        assert_eq!(numeric_field().missing_count(), 1);
        assert_eq!(sample_result().fields[1].missing_count(), 0);
    }

    #[test]
    fn boolean_and_id_reuse_categorical_stats() {
        let stats = FieldStats::Categorical(CategoricalStats {
            unique_count: 2,
            top_values: vec![],
            missing_count: 0,
            missing_percentage: 0.0,
        });
        assert!(FieldType::Boolean.accepts(&stats));
        assert!(FieldType::Id.accepts(&stats));
        assert!(!FieldType::String.accepts(&stats));
        assert!(!FieldType::Unknown.accepts(&stats));
    }
}
