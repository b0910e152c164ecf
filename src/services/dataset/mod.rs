pub mod analyzer;
pub mod detector;
pub mod statistics;
pub mod types;
pub mod utils;

pub use analyzer::DatasetAnalyzer;
pub use detector::FieldTypeDetector;
pub use statistics::StatisticsCalculator;
pub use types::{Column, ColumnKind, Dataset, SampleMode, SampleRows, Value};
