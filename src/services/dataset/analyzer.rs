use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use super::detector::FieldTypeDetector;
use super::statistics::StatisticsCalculator;
use super::types::{Column, Dataset, SampleMode, SampleRows, Value, SAMPLE_SIZE};
use super::utils::round_to;
use crate::config::Config;
use crate::error::AppError;
use crate::models::{AnalysisResult, FieldAnalysis, SampleValues};
use crate::services::file_processor;

/// Row sampling in `random` mode always uses this seed so repeated calls
/// return the same rows.
pub const RANDOM_SAMPLE_SEED: u64 = 42;

/// Ties detection, statistics and value sampling together.
#[derive(Debug, Clone)]
pub struct DatasetAnalyzer {
    detector: FieldTypeDetector,
    calculator: StatisticsCalculator,
    sample_seed: Option<u64>,
    max_file_size: usize,
}

impl Default for DatasetAnalyzer {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl DatasetAnalyzer {
    pub fn new(categorical_threshold: f64) -> Self {
        Self {
            detector: FieldTypeDetector::new(categorical_threshold),
            calculator: StatisticsCalculator::new(),
            sample_seed: None,
            max_file_size: Config::default().max_file_size,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            sample_seed: config.sample_seed,
            max_file_size: config.max_file_size,
            ..Self::new(config.categorical_threshold)
        }
    }

    /// Makes sample-value selection reproducible.
    pub fn with_sample_seed(mut self, seed: u64) -> Self {
        self.sample_seed = Some(seed);
        self
    }

    pub fn analyze_column(&self, column: &Column) -> FieldAnalysis {
        let field_type = self.detector.detect(column);
        let stats = self.calculator.compute(column, field_type);

        tracing::debug!(
            "Field '{}' detected as {} ({} rows, {} missing)",
            column.name(),
            field_type,
            column.len(),
            column.missing_count()
        );

        FieldAnalysis {
            name: column.name().to_string(),
            field_type,
            total_count: column.len(),
            stats,
            sample_values: self.sample_values(column),
        }
    }

    fn sample_values(&self, column: &Column) -> SampleValues {
        let distinct = column.distinct_values();
        if distinct.len() <= SAMPLE_SIZE {
            return distinct.into_iter().map(Value::to_sample).collect();
        }

        let mut rng = match self.sample_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut picked = index::sample(&mut rng, distinct.len(), SAMPLE_SIZE).into_vec();
        picked.sort_unstable();
        picked.into_iter().map(|i| distinct[i].to_sample()).collect()
    }

    pub fn analyze(&self, dataset: &Dataset, source_id: &str, file_type: &str) -> AnalysisResult {
        let start = Instant::now();
        tracing::info!(
            "Analyzing {} ({} rows x {} columns, categorical threshold {})",
            source_id,
            dataset.row_count(),
            dataset.column_count(),
            self.detector.categorical_threshold()
        );

        let fields: Vec<FieldAnalysis> = dataset
            .columns()
            .iter()
            .map(|column| self.analyze_column(column))
            .collect();

        let elapsed = start.elapsed();
        tracing::info!("Analysis of {} completed in {:?}", source_id, elapsed);

        AnalysisResult {
            file_path: source_id.to_string(),
            file_type: file_type.to_string(),
            total_rows: dataset.row_count(),
            total_columns: dataset.column_count(),
            fields,
            analysis_timestamp: Utc::now(),
            processing_time_seconds: round_to(elapsed.as_secs_f64(), 2),
        }
    }

    /// Reads a dataset from disk. A missing file stays `NotFound`; every
    /// other load failure becomes `AnalysisFailed`.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Dataset, AppError> {
        let path = path.as_ref();
        file_processor::load_dataset(path, self.max_file_size).map_err(|err| match err {
            not_found @ AppError::NotFound(_) => not_found,
            other => {
                tracing::error!("Failed to load {}: {}", path.display(), other);
                AppError::analysis_failed(path.display().to_string(), other)
            }
        })
    }

    pub fn analyze_file(&self, path: impl AsRef<Path>) -> Result<AnalysisResult, AppError> {
        let path = path.as_ref();
        let dataset = self.load(path)?;
        Ok(self.analyze(
            &dataset,
            &path.display().to_string(),
            &file_processor::file_type_of(path),
        ))
    }

    /// First `n` rows, or `n` rows drawn without replacement (kept in
    /// dataset order) when `mode` is random.
    pub fn sample_rows(&self, dataset: &Dataset, n: usize, mode: SampleMode) -> SampleRows {
        let n = n.min(dataset.row_count());
        let indices: Vec<usize> = match mode {
            SampleMode::Head => (0..n).collect(),
            SampleMode::Random => {
                let mut rng = StdRng::seed_from_u64(RANDOM_SAMPLE_SEED);
                let mut picked = index::sample(&mut rng, dataset.row_count(), n).into_vec();
                picked.sort_unstable();
                picked
            }
        };

        SampleRows {
            columns: dataset.column_names(),
            rows: indices.into_iter().filter_map(|i| dataset.row(i)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldType;
    use std::collections::HashSet;

    fn analyzer() -> DatasetAnalyzer {
        DatasetAnalyzer::new(0.1).with_sample_seed(7)
    }

    fn dataset() -> Dataset {
        Dataset::new(vec![
            Column::from_values("user_id", 1..=20i64),
            Column::from_values("score", (1..=20).map(|i| i as f64 * 1.5)),
            Column::from_values(
                "tier",
                (0..20).map(|i| ["gold", "silver", "bronze"][i % 3]),
            ),
            Column::new("notes", vec![Value::Missing; 20]),
        ])
        .unwrap()
    }

    #[test]
    fn analyzes_every_column_in_order() {
        let result = analyzer().analyze(&dataset(), "memory", "csv");
        assert_eq!(result.total_rows, 20);
        assert_eq!(result.total_columns, 4);
        let types: Vec<FieldType> = result.fields.iter().map(|f| f.field_type).collect();
        assert_eq!(
            types,
            vec![FieldType::Id, FieldType::Float, FieldType::Categorical, FieldType::Unknown]
        );
        assert!(result.processing_time_seconds >= 0.0);
        assert_eq!(result.file_path, "memory");
        assert_eq!(result.file_type, "csv");
    }

    #[test]
    fn missing_plus_present_equals_total() {
        let result = analyzer().analyze(&dataset(), "memory", "csv");
        let ds = dataset();
        for field in &result.fields {
            let column = ds.column(&field.name).unwrap();
            assert_eq!(field.total_count, column.len());
            if field.stats.is_some() {
                assert_eq!(field.missing_count() + column.non_missing_count(), field.total_count);
            }
        }
    }

    #[test]
    fn few_distinct_values_are_all_sampled() {
        let field = analyzer().analyze_column(&dataset().columns()[2]);
        let samples: Vec<String> = field.sample_values.iter().map(|v| v.to_string()).collect();
        assert_eq!(samples, vec!["gold", "silver", "bronze"]);
    }

    #[test]
    fn many_distinct_values_yield_five_distinct_samples() {
        let field = analyzer().analyze_column(&dataset().columns()[0]);
        assert_eq!(field.sample_values.len(), SAMPLE_SIZE);
        let seen: HashSet<String> = field.sample_values.iter().map(|v| v.to_string()).collect();
        assert_eq!(seen.len(), SAMPLE_SIZE);
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let column = &dataset().columns()[1].clone();
        let a = analyzer().analyze_column(column);
        let b = analyzer().analyze_column(column);
        assert_eq!(a, b);
    }

    #[test]
    fn all_missing_column_is_unknown_without_samples() {
        let field = analyzer().analyze_column(&Column::new("empty", vec![Value::Missing; 50]));
        assert_eq!(field.field_type, FieldType::Unknown);
        assert!(field.stats.is_none());
        assert!(field.sample_values.is_empty());
        assert_eq!(field.total_count, 50);
    }

    #[test]
    fn head_rows() {
        let sample = analyzer().sample_rows(&dataset(), 3, SampleMode::Head);
        assert_eq!(sample.columns, vec!["user_id", "score", "tier", "notes"]);
        assert_eq!(sample.rows.len(), 3);
        assert_eq!(sample.rows[0][0], Value::Int(1));
        assert_eq!(sample.rows[2][0], Value::Int(3));
    }

    #[test]
    fn random_rows_are_repeatable_and_distinct() {
        let a = analyzer().sample_rows(&dataset(), 5, SampleMode::Random);
        let b = DatasetAnalyzer::default().sample_rows(&dataset(), 5, SampleMode::Random);
        assert_eq!(a, b);
        assert_eq!(a.rows.len(), 5);
        let ids: HashSet<String> = a.rows.iter().map(|r| r[0].to_string()).collect();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn oversized_sample_returns_every_row() {
        let sample = analyzer().sample_rows(&dataset(), 100, SampleMode::Random);
        assert_eq!(sample.rows.len(), 20);
    }

    #[test]
    fn iso_text_datetimes_survive_a_json_round_trip() {
        let ds = Dataset::new(vec![Column::from_values(
            "ts",
            (1..=9).map(|d| format!("2023-01-{:02}T10:30:00", d)),
        )])
        .unwrap();
        let result = analyzer().analyze(&ds, "events.csv", "csv");
        assert_eq!(result.fields[0].field_type, FieldType::DateTime);

        let json = serde_json::to_string(&result).unwrap();
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn native_datetime_samples_are_iso_text() {
        let start = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let column = Column::from_values("at", (0..3).map(|d| start + chrono::Duration::days(d)));
        let field = analyzer().analyze_column(&column);
        assert_eq!(field.sample_values[0], Value::from("2024-03-01T00:00:00"));

        let json = serde_json::to_string(&field).unwrap();
        let back: FieldAnalysis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, field);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = analyzer().analyze_file("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn corrupt_file_is_analysis_failed() {
        let mut file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        std::io::Write::write_all(&mut file, b"definitely not parquet").unwrap();
        let err = analyzer().analyze_file(file.path()).unwrap_err();
        assert!(matches!(err, AppError::AnalysisFailed { .. }));
    }
}
