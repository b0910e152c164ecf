use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use dotenvy::dotenv;

pub const DEFAULT_CATEGORICAL_THRESHOLD: f64 = 0.1;
pub const DEFAULT_SAMPLE_ROWS: usize = 5;

fn default_max_file_size() -> usize {
    // 50 MB in bytes
    50 * 1024 * 1024
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub categorical_threshold: f64,
    pub max_file_size: usize,
    pub sample_seed: Option<u64>,
    pub sample_rows: usize,
    /// Directory HTTP `file_path` requests are confined to. Unset means
    /// only signed URLs are accepted.
    pub data_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            categorical_threshold: DEFAULT_CATEGORICAL_THRESHOLD,
            max_file_size: default_max_file_size(),
            sample_seed: None,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            data_root: None,
        }
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, falling back to defaults
    /// for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let bind_addr = parse_var(&lookup, "PROFILER_ADDR")?.unwrap_or(defaults.bind_addr);
        let categorical_threshold = parse_var(&lookup, "PROFILER_CATEGORICAL_THRESHOLD")?
            .unwrap_or(defaults.categorical_threshold);
        let max_file_size =
            parse_var(&lookup, "PROFILER_MAX_FILE_SIZE")?.unwrap_or(defaults.max_file_size);
        let sample_seed = parse_var(&lookup, "PROFILER_SAMPLE_SEED")?;
        let sample_rows =
            parse_var(&lookup, "PROFILER_SAMPLE_ROWS")?.unwrap_or(defaults.sample_rows);
        let data_root = parse_var(&lookup, "PROFILER_DATA_ROOT")?;

        if !(categorical_threshold > 0.0 && categorical_threshold <= 1.0) {
            anyhow::bail!(
                "PROFILER_CATEGORICAL_THRESHOLD must be in (0, 1], got {}",
                categorical_threshold
            );
        }

        Ok(Config {
            bind_addr,
            categorical_threshold,
            max_file_size,
            sample_seed,
            sample_rows,
            data_root,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}={:?}: {}", key, raw, e)),
        _ => Ok(None),
    }
}

pub fn load_config() -> Result<Config> {
    let config = Config::new()?;
    tracing::info!(
        "Loaded configuration: addr={}, categorical_threshold={}, max_file_size={}, data_root={:?}",
        config.bind_addr,
        config.categorical_threshold,
        config.max_file_size,
        config.data_root
    );
    Ok(config)
}
