use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::State,
    http::Method,
    response::Html,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    error::AppError,
    models::AnalysisResult,
    services::{
        dataset::{DatasetAnalyzer, SampleMode, SampleRows},
        file_processor,
        report::HtmlReporter,
        summary::DatasetSummary,
    },
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/datasets/analyze", post(analyze_dataset))
        .route("/datasets/report", post(dataset_report))
        .route("/reports/render", post(render_report))
        .layer(cors)
}

/// Exactly one of `file_path` and `signed_url` names the source. A
/// `file_path` is read relative to the configured data root.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    pub file_path: Option<String>,
    pub signed_url: Option<String>,
    #[serde(rename = "type")]
    pub file_type: Option<String>,
    pub categorical_threshold: Option<f64>,
    pub sample_mode: Option<SampleMode>,
    pub sample_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub analysis: AnalysisResult,
    pub summary: DatasetSummary,
    pub sample: SampleRows,
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub analysis: AnalysisResult,
}

async fn analyze_dataset(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let (analysis, sample) = run_analysis(&state, request).await?;
    let summary = DatasetSummary::summarize(&analysis);
    Ok(Json(AnalyzeResponse {
        analysis,
        summary,
        sample,
    }))
}

async fn dataset_report(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Html<String>, AppError> {
    let (analysis, sample) = run_analysis(&state, request).await?;
    let html = HtmlReporter::new().render(&analysis, Some(&sample))?;
    Ok(Html(html))
}

async fn render_report(Json(request): Json<RenderRequest>) -> Result<Html<String>, AppError> {
    tracing::info!("Rendering saved analysis of {}", request.analysis.file_path);
    let html = HtmlReporter::new().render(&request.analysis, None)?;
    Ok(Html(html))
}

enum Source {
    Path(String),
    Url { url: String, file_type: Option<String> },
}

impl Source {
    fn from_request(request: &AnalyzeRequest) -> Result<Self, AppError> {
        match (&request.file_path, &request.signed_url) {
            (Some(path), None) => Ok(Source::Path(path.clone())),
            (None, Some(url)) => Ok(Source::Url {
                url: url.clone(),
                file_type: request.file_type.clone(),
            }),
            (Some(_), Some(_)) => Err(AppError::InvalidInput(
                "Provide either file_path or signed_url, not both".to_string(),
            )),
            (None, None) => Err(AppError::InvalidInput(
                "No file provided: set file_path or signed_url".to_string(),
            )),
        }
    }
}

/// Confines a requested path to `root`, after resolving `..` and symlinks.
fn resolve_local_path(root: &Path, requested: &str) -> Result<PathBuf, AppError> {
    let outside = || {
        AppError::InvalidInput(format!("file_path must stay inside the data root: {}", requested))
    };

    let root = root.canonicalize().map_err(|e| {
        AppError::Internal(format!("Data root {} is unusable: {}", root.display(), e))
    })?;
    let candidate = root.join(requested);
    if !candidate.starts_with(&root) || candidate.components().any(|c| c == Component::ParentDir) {
        return Err(outside());
    }

    let resolved = candidate
        .canonicalize()
        .map_err(|_| AppError::NotFound(format!("File not found: {}", requested)))?;
    if !resolved.starts_with(&root) {
        return Err(outside());
    }
    Ok(resolved)
}

/// Signed URLs carry credentials in the query string; keep them out of
/// logs and results.
fn redact_url(url: &str) -> String {
    url.split(|c: char| c == '?' || c == '#').next().unwrap_or(url).to_string()
}

async fn run_analysis(
    state: &AppState,
    request: AnalyzeRequest,
) -> Result<(AnalysisResult, SampleRows), AppError> {
    let start = std::time::Instant::now();
    let source = Source::from_request(&request)?;

    let mut config = state.config.clone();
    if let Some(threshold) = request.categorical_threshold {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(AppError::InvalidInput(format!(
                "categorical_threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        config.categorical_threshold = threshold;
    }
    let sample_size = request.sample_size.unwrap_or(config.sample_rows);
    let sample_mode = request.sample_mode.unwrap_or_default();
    let analyzer = DatasetAnalyzer::from_config(&config);

    let (dataset, source_id, file_type) = match source {
        Source::Path(requested) => {
            let root = config.data_root.clone().ok_or_else(|| {
                AppError::InvalidInput(
                    "file_path is disabled: PROFILER_DATA_ROOT is not set".to_string(),
                )
            })?;
            tracing::info!("Analyzing local file {} under {}", requested, root.display());
            let file_type = file_processor::file_type_of(&requested);
            let loader = analyzer.clone();
            let source = requested.clone();
            let dataset = blocking(move || {
                let path = resolve_local_path(&root, &source)?;
                loader.load(path)
            })
            .await?;
            (dataset, requested, file_type)
        }
        Source::Url { url, file_type } => {
            let source_id = redact_url(&url);
            let format = file_processor::format_from_url(&url, file_type.as_deref())?;
            tracing::info!("Downloading {} ({})", source_id, format);

            let download_start = std::time::Instant::now();
            let bytes = file_processor::load_file_from_url(&url, config.max_file_size).await?;
            tracing::info!(
                "File downloaded, size: {}KB, took: {:?}",
                bytes.len() / 1024,
                download_start.elapsed()
            );

            let failed_source = source_id.clone();
            let dataset = blocking(move || {
                file_processor::load_dataset_from_bytes(bytes, format)
                    .map_err(|e| AppError::analysis_failed(failed_source, e))
            })
            .await?;
            (dataset, source_id, format.to_string())
        }
    };

    let result = blocking(move || {
        let analysis = analyzer.analyze(&dataset, &source_id, &file_type);
        let sample = analyzer.sample_rows(&dataset, sample_size, sample_mode);
        Ok((analysis, sample))
    })
    .await?;

    tracing::info!("Total processing completed in {:?}", start.elapsed());
    Ok(result)
}

/// Runs CPU-bound work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(format!("Analysis task failed: {}", e)))?
}
