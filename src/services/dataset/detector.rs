//! Semantic type detection for a single column.
//!
//! Detection walks [`FieldTypeDetector::RULES`] in order and stops at the
//! first predicate that accepts the column. A column without any non-missing
//! value is `unknown` before any rule runs; a column no rule accepts is a
//! `string`.

use once_cell::sync::Lazy;
use regex::RegexSet;

use super::types::{Column, ColumnKind};
use super::utils::{coerce_datetime, coerce_numeric, is_whole, looks_like_uuid};
use crate::config::DEFAULT_CATEGORICAL_THRESHOLD;
use crate::models::FieldType;

const ID_UNIQUENESS_THRESHOLD: f64 = 0.9;
const UUID_SAMPLE_ROWS: usize = 10;
const DATETIME_SAMPLE_ROWS: usize = 100;
const DATETIME_HIT_RATIO: f64 = 0.8;
const TEXT_CATEGORICAL_THRESHOLD: f64 = 0.3;

const BOOLEAN_TOKENS: &[&str] = &[
    "true", "false", "yes", "no", "1", "0", "t", "f", "y", "n", "on", "off",
];

static ID_NAME_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"^id$",
        r"_id$",
        r"^id_",
        r"identifier",
        r"key$",
        r"code$",
        r"^uuid$",
        r"uuid",
        r"^pk$",
        r"pk$",
    ])
    .expect("identifier name patterns are valid regexes")
});

type Rule = fn(&FieldTypeDetector, &Column) -> bool;

#[derive(Debug, Clone)]
pub struct FieldTypeDetector {
    categorical_threshold: f64,
}

impl Default for FieldTypeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORICAL_THRESHOLD)
    }
}

impl FieldTypeDetector {
    /// Checks in priority order; the first acceptance decides the type.
    pub const RULES: [(FieldType, Rule); 6] = [
        (FieldType::Id, FieldTypeDetector::is_id_field),
        (FieldType::Boolean, FieldTypeDetector::is_boolean),
        (FieldType::DateTime, FieldTypeDetector::is_datetime),
        (FieldType::Integer, FieldTypeDetector::is_integer),
        (FieldType::Float, FieldTypeDetector::is_float),
        (FieldType::Categorical, FieldTypeDetector::is_categorical),
    ];

    /// `categorical_threshold` is the largest distinct/non-missing ratio
    /// at which any column still counts as categorical.
    pub fn new(categorical_threshold: f64) -> Self {
        Self { categorical_threshold }
    }

    pub fn categorical_threshold(&self) -> f64 {
        self.categorical_threshold
    }

    pub fn detect(&self, column: &Column) -> FieldType {
        if column.non_missing_count() == 0 {
            return FieldType::Unknown;
        }

        let field_type = Self::RULES
            .iter()
            .find(|(_, rule)| rule(self, column))
            .map_or(FieldType::String, |(field_type, _)| *field_type);

        tracing::debug!(
            "Column '{}' ({:?}) detected as {}",
            column.name(),
            column.kind(),
            field_type
        );
        field_type
    }

    /// Identifier-like name and at least 90% distinct values over all rows.
    pub fn is_id_field(&self, column: &Column) -> bool {
        let name = column.name().to_lowercase();
        if !ID_NAME_PATTERNS.is_match(&name) || column.is_empty() {
            return false;
        }

        let uniqueness = column.distinct_count() as f64 / column.len() as f64;
        if uniqueness < ID_UNIQUENESS_THRESHOLD {
            return false;
        }

        if column.kind() == ColumnKind::Text {
            let uuid_shaped = column
                .non_missing()
                .take(UUID_SAMPLE_ROWS)
                .any(|v| looks_like_uuid(&v.to_string()));
            tracing::trace!("Identifier column '{}' uuid-shaped: {}", column.name(), uuid_shaped);
        }
        true
    }

    pub fn is_boolean(&self, column: &Column) -> bool {
        match column.kind() {
            ColumnKind::Boolean => true,
            ColumnKind::Text => column.non_missing().all(|value| {
                let token = value.to_string().trim().to_lowercase();
                BOOLEAN_TOKENS.contains(&token.as_str())
            }),
            _ => false,
        }
    }

    /// More than 80% of the first 100 non-missing values parse as dates.
    pub fn is_datetime(&self, column: &Column) -> bool {
        match column.kind() {
            ColumnKind::DateTime => true,
            ColumnKind::Text => {
                let (sampled, hits) = column
                    .non_missing()
                    .take(DATETIME_SAMPLE_ROWS)
                    .fold((0usize, 0usize), |(sampled, hits), value| {
                        let hit = coerce_datetime(value).is_some();
                        (sampled + 1, hits + usize::from(hit))
                    });
                sampled > 0 && hits as f64 / sampled as f64 > DATETIME_HIT_RATIO
            }
            _ => false,
        }
    }

    pub fn is_integer(&self, column: &Column) -> bool {
        if column.kind() == ColumnKind::Integer {
            return true;
        }
        let numbers = coerced_numbers(column);
        !numbers.is_empty() && numbers.iter().all(|v| is_whole(*v))
    }

    pub fn is_float(&self, column: &Column) -> bool {
        if column.kind() == ColumnKind::Float {
            return true;
        }
        coerced_numbers(column).iter().any(|v| !is_whole(*v))
    }

    pub fn is_categorical(&self, column: &Column) -> bool {
        let non_missing = column.non_missing_count();
        if non_missing == 0 {
            return false;
        }

        let ratio = column.distinct_count() as f64 / non_missing as f64;
        ratio <= self.categorical_threshold
            || (column.kind() == ColumnKind::Text && ratio <= TEXT_CATEGORICAL_THRESHOLD)
    }
}

/// Non-missing values that survive numeric coercion; failures are dropped.
fn coerced_numbers(column: &Column) -> Vec<f64> {
    column.non_missing().filter_map(coerce_numeric).collect()
}
