//! Column profiling for tabular files: semantic type detection,
//! per-type statistics and HTML reports, served over HTTP.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

pub use error::AppError;
pub use models::{AnalysisResult, FieldAnalysis, FieldType};
pub use services::dataset::DatasetAnalyzer;

// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
}

impl AppState {
    pub fn new(config: config::Config) -> Self {
        Self { config }
    }

    pub fn shared(config: config::Config) -> Arc<Self> {
        Arc::new(Self::new(config))
    }
}
