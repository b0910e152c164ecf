use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{AnalysisResult, FieldType};
use crate::services::dataset::utils::round_to;

/// Dataset-level roll-up of an [`AnalysisResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_fields: usize,
    pub total_missing: usize,
    pub type_counts: BTreeMap<FieldType, usize>,
    pub completeness_percentage: f64,
}

impl DatasetSummary {
    pub fn summarize(result: &AnalysisResult) -> Self {
        let total_missing = result.fields.iter().map(|f| f.missing_count()).sum();

        let mut type_counts = BTreeMap::new();
        for field in &result.fields {
            *type_counts.entry(field.field_type).or_insert(0) += 1;
        }

        let total_cells = result.total_rows * result.fields.len();
        let completeness_percentage = if total_cells == 0 {
            0.0
        } else {
            let present = total_cells.saturating_sub(total_missing);
            round_to(present as f64 / total_cells as f64 * 100.0, 2)
        };

        Self {
            total_fields: result.fields.len(),
            total_missing,
            type_counts,
            completeness_percentage,
        }
    }

    pub fn count_of(&self, field_type: FieldType) -> usize {
        self.type_counts.get(&field_type).copied().unwrap_or(0)
    }
}
