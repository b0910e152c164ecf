//! Per-type descriptive statistics.
//!
//! Every calculation tolerates cells it cannot interpret: they are left out
//! of that calculation only, while `missing_count` always reflects the
//! column's own missing markers.

use std::collections::{HashMap, HashSet};

use super::types::{Column, Value, ValueKey};
use super::utils::{coerce_datetime, coerce_numeric, percentage, percentile, round_to};
use crate::models::{
    CategoricalStats, DateTimeStats, FieldStats, FieldType, NumericalStats, Quartiles,
    StringStats, TopValue,
};

const TOP_VALUES: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticsCalculator;

struct MissingSummary {
    count: usize,
    percentage: f64,
}

fn missing_summary(column: &Column) -> MissingSummary {
    let count = column.missing_count();
    MissingSummary {
        count,
        percentage: round_to(percentage(count, column.len()), 2),
    }
}

impl StatisticsCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Statistics variant for `field_type`; `unknown` fields get none.
    pub fn compute(&self, column: &Column, field_type: FieldType) -> Option<FieldStats> {
        match field_type {
            FieldType::Categorical | FieldType::Boolean | FieldType::Id => {
                Some(FieldStats::Categorical(self.calculate_categorical_stats(column)))
            }
            FieldType::Integer | FieldType::Float => {
                Some(FieldStats::Numerical(self.calculate_numerical_stats(column)))
            }
            FieldType::String => Some(FieldStats::String(self.calculate_string_stats(column))),
            FieldType::DateTime => {
                Some(FieldStats::DateTime(self.calculate_datetime_stats(column)))
            }
            FieldType::Unknown => None,
        }
    }

    pub fn calculate_categorical_stats(&self, column: &Column) -> CategoricalStats {
        let missing = missing_summary(column);
        let total = column.len();

        // key -> (first position, count, representative value)
        let mut counts: HashMap<ValueKey<'_>, (usize, usize, &Value)> = HashMap::new();
        for (position, value) in column.values().iter().enumerate() {
            if let Some(key) = value.key() {
                counts.entry(key).or_insert((position, 0, value)).1 += 1;
            }
        }

        let unique_count = counts.len();
        let mut ranked: Vec<(usize, usize, &Value)> = counts.into_values().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let top_values = ranked
            .into_iter()
            .take(TOP_VALUES)
            .map(|(_, count, value)| TopValue {
                value: value.to_string(),
                count,
                percentage: percentage(count, total),
            })
            .collect();

        CategoricalStats {
            unique_count,
            top_values,
            missing_count: missing.count,
            missing_percentage: missing.percentage,
        }
    }

    pub fn calculate_numerical_stats(&self, column: &Column) -> NumericalStats {
        let missing = missing_summary(column);

        let mut numbers: Vec<f64> = column.non_missing().filter_map(coerce_numeric).collect();
        let dropped = column.non_missing_count() - numbers.len();
        if dropped > 0 {
            tracing::debug!(
                "Column '{}': {} values could not be read as numbers",
                column.name(),
                dropped
            );
        }

        if numbers.is_empty() {
            return NumericalStats {
                min_value: None,
                max_value: None,
                mean: None,
                median: None,
                std_dev: None,
                quartiles: None,
                missing_count: missing.count,
                missing_percentage: missing.percentage,
            };
        }

        numbers.sort_by(f64::total_cmp);
        let n = numbers.len() as f64;
        let mean = numbers.iter().sum::<f64>() / n;
        let std_dev = (numbers.len() > 1).then(|| {
            let sum_sq: f64 = numbers.iter().map(|v| (v - mean).powi(2)).sum();
            (sum_sq / (n - 1.0)).sqrt()
        });

        let quartiles = match (
            percentile(&numbers, 0.25),
            percentile(&numbers, 0.5),
            percentile(&numbers, 0.75),
        ) {
            (Some(q25), Some(q50), Some(q75)) => Some(Quartiles { q25, q50, q75 }),
            _ => None,
        };

        NumericalStats {
            min_value: numbers.first().copied(),
            max_value: numbers.last().copied(),
            mean: Some(mean).filter(|m| m.is_finite()).map(|m| round_to(m, 4)),
            median: quartiles.map(|q| round_to(q.q50, 4)),
            std_dev: std_dev.filter(|s| s.is_finite()).map(|s| round_to(s, 4)),
            quartiles,
            missing_count: missing.count,
            missing_percentage: missing.percentage,
        }
    }

    pub fn calculate_string_stats(&self, column: &Column) -> StringStats {
        let missing = missing_summary(column);

        let texts: Vec<String> = column.non_missing().map(Value::to_string).collect();
        let lengths: Vec<usize> = texts.iter().map(|s| s.chars().count()).collect();
        let unique_count = texts.iter().collect::<HashSet<_>>().len();

        let avg_length = (!lengths.is_empty())
            .then(|| round_to(lengths.iter().sum::<usize>() as f64 / lengths.len() as f64, 2));

        StringStats {
            min_length: lengths.iter().copied().min(),
            max_length: lengths.iter().copied().max(),
            avg_length,
            unique_count,
            missing_count: missing.count,
            missing_percentage: missing.percentage,
        }
    }

    pub fn calculate_datetime_stats(&self, column: &Column) -> DateTimeStats {
        let missing = missing_summary(column);

        let dates: Vec<_> = column.non_missing().filter_map(coerce_datetime).collect();
        let unique_count = dates.iter().collect::<HashSet<_>>().len();

        DateTimeStats {
            min_date: dates.iter().min().copied(),
            max_date: dates.iter().max().copied(),
            unique_count,
            missing_count: missing.count,
            missing_percentage: missing.percentage,
        }
    }
}
