use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use bytes::Bytes;
use calamine::{open_workbook_from_rs, Data, Range, Reader, Xls, Xlsx};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use reqwest::{Client, Url};

use crate::error::AppError;
use crate::models::AnalysisResult;
use crate::services::dataset::types::{Column, ColumnKind, Dataset, Value};
use crate::services::dataset::utils::{parse_datetime, unique_column_name};

const INFER_SCHEMA_ROWS: usize = 1000;

/// Cell texts read as missing, whatever the column.
pub const NA_TOKENS: &[&str] = &["", "NA", "N/A", "NaN", "null", "NULL", "None", "nan", "#N/A", "-"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Tsv,
    /// Delimited text with an unknown separator.
    Text,
    Json,
    Xlsx,
    Xls,
    Parquet,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "csv" => Some(FileFormat::Csv),
            "tsv" => Some(FileFormat::Tsv),
            "txt" => Some(FileFormat::Text),
            "json" => Some(FileFormat::Json),
            "xlsx" => Some(FileFormat::Xlsx),
            "xls" => Some(FileFormat::Xls),
            "parquet" => Some(FileFormat::Parquet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Tsv => "tsv",
            FileFormat::Text => "txt",
            FileFormat::Json => "json",
            FileFormat::Xlsx => "xlsx",
            FileFormat::Xls => "xls",
            FileFormat::Parquet => "parquet",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileFormat::from_extension(s).ok_or_else(|| AppError::UnsupportedFormat(s.to_string()))
    }
}

/// Lower-case extension without the dot, empty when there is none.
pub fn file_type_of(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

pub fn load_dataset(path: impl AsRef<Path>, max_file_size: usize) -> Result<Dataset, AppError> {
    let path = path.as_ref();
    tracing::info!("Loading dataset from {}", path.display());

    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AppError::NotFound(format!("File not found: {}", path.display())),
        _ => AppError::IoError(e),
    })?;
    if metadata.len() > max_file_size as u64 {
        return Err(AppError::InvalidInput(format!(
            "File size {} exceeds maximum allowed size of {} bytes",
            metadata.len(),
            max_file_size
        )));
    }

    let bytes = Bytes::from(fs::read(path)?);
    match FileFormat::from_extension(&file_type_of(path)) {
        Some(format) => load_dataset_from_bytes(bytes, format),
        None => {
            tracing::warn!("Unrecognised extension on {}, trying CSV", path.display());
            load_dataset_from_bytes(bytes, FileFormat::Text).map_err(|e| {
                AppError::UnsupportedFormat(format!("{}: {}", path.display(), e))
            })
        }
    }
}

pub fn load_dataset_from_bytes(bytes: Bytes, format: FileFormat) -> Result<Dataset, AppError> {
    let start = std::time::Instant::now();
    let dataset = match format {
        FileFormat::Csv => dataframe_to_dataset(read_delimited(bytes, b',')?)?,
        FileFormat::Tsv => dataframe_to_dataset(read_delimited(bytes, b'\t')?)?,
        FileFormat::Text => {
            let separator = sniff_separator(&bytes);
            dataframe_to_dataset(read_delimited(bytes, separator)?)?
        }
        FileFormat::Json => dataframe_to_dataset(JsonReader::new(Cursor::new(bytes)).finish()?)?,
        FileFormat::Parquet => {
            dataframe_to_dataset(ParquetReader::new(Cursor::new(bytes)).finish()?)?
        }
        FileFormat::Xlsx => {
            let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).map_err(|e| {
                AppError::FileProcessingError(format!("Failed to open Excel file: {}", e))
            })?;
            let sheet = first_sheet_name(workbook.sheet_names())?;
            let range = workbook.worksheet_range(&sheet).map_err(|e| {
                AppError::FileProcessingError(format!("Failed to read worksheet {}: {}", sheet, e))
            })?;
            range_to_dataset(&range)?
        }
        FileFormat::Xls => {
            let mut workbook: Xls<_> = open_workbook_from_rs(Cursor::new(bytes)).map_err(|e| {
                AppError::FileProcessingError(format!("Failed to open Excel file: {}", e))
            })?;
            let sheet = first_sheet_name(workbook.sheet_names())?;
            let range = workbook.worksheet_range(&sheet).map_err(|e| {
                AppError::FileProcessingError(format!("Failed to read worksheet {}: {}", sheet, e))
            })?;
            range_to_dataset(&range)?
        }
    };

    tracing::info!(
        "Loaded {} dataset with {} rows and {} columns in {:?}",
        format,
        dataset.row_count(),
        dataset.column_count(),
        start.elapsed()
    );
    Ok(dataset)
}

fn read_delimited(bytes: Bytes, separator: u8) -> Result<DataFrame, AppError> {
    let null_values = NA_TOKENS.iter().map(|token| token.to_string()).collect();
    let df = CsvReader::new(Cursor::new(bytes))
        .has_header(true)
        .with_separator(separator)
        .infer_schema(Some(INFER_SCHEMA_ROWS))
        .with_null_values(Some(NullValues::AllColumns(null_values)))
        .finish()?;
    Ok(df)
}

/// Picks the most frequent of tab, semicolon and comma on the first line,
/// falling back to comma.
fn sniff_separator(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|&b| b == b'\n').next().unwrap_or_default();
    [b'\t', b';', b',']
        .into_iter()
        .map(|sep| (first_line.iter().filter(|&&b| b == sep).count(), sep))
        .max()
        .filter(|(count, _)| *count > 0)
        .map_or(b',', |(_, sep)| sep)
}

fn first_sheet_name(sheet_names: Vec<String>) -> Result<String, AppError> {
    tracing::debug!("Found {} sheets: {:?}", sheet_names.len(), sheet_names);
    sheet_names
        .into_iter()
        .next()
        .ok_or_else(|| AppError::FileProcessingError("No sheets found in workbook".to_string()))
}

fn dataframe_to_dataset(df: DataFrame) -> Result<Dataset, AppError> {
    let mut existing_names = HashSet::new();
    let columns = df
        .get_columns()
        .iter()
        .enumerate()
        .map(|(position, series)| {
            let name = unique_column_name(series.name(), position, &mut existing_names);
            let values = (0..series.len())
                .map(|idx| series.get(idx).map(any_value_to_value))
                .collect::<PolarsResult<Vec<_>>>()?;
            Ok(Column::with_kind(name, column_kind(series.dtype()), values))
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    Dataset::new(columns)
}

fn column_kind(dtype: &DataType) -> ColumnKind {
    match dtype {
        DataType::Boolean => ColumnKind::Boolean,
        DataType::Date | DataType::Datetime(_, _) => ColumnKind::DateTime,
        dt if dt.is_integer() => ColumnKind::Integer,
        dt if dt.is_float() => ColumnKind::Float,
        _ => ColumnKind::Text,
    }
}

fn any_value_to_value(value: AnyValue<'_>) -> Value {
    match value {
        AnyValue::Null => Value::Missing,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::Int8(v) => Value::Int(v.into()),
        AnyValue::Int16(v) => Value::Int(v.into()),
        AnyValue::Int32(v) => Value::Int(v.into()),
        AnyValue::Int64(v) => Value::Int(v),
        AnyValue::UInt8(v) => Value::Int(v.into()),
        AnyValue::UInt16(v) => Value::Int(v.into()),
        AnyValue::UInt32(v) => Value::Int(v.into()),
        AnyValue::UInt64(v) => i64::try_from(v).map_or(Value::Float(v as f64), Value::Int),
        AnyValue::Float32(v) => float_value(v.into()),
        AnyValue::Float64(v) => float_value(v),
        AnyValue::String(s) => text_value(s),
        AnyValue::Date(days) => DateTime::from_timestamp(i64::from(days) * 86_400, 0)
            .map_or(Value::Missing, |dt| Value::DateTime(dt.naive_utc())),
        AnyValue::Datetime(v, unit, _) => timestamp_value(v, unit),
        other => Value::Text(other.to_string()),
    }
}

/// NaN is a missing marker; infinities are kept as their text so they are
/// counted as present but never enter numeric statistics.
fn float_value(v: f64) -> Value {
    if v.is_nan() {
        Value::Missing
    } else if v.is_infinite() {
        Value::Text(v.to_string())
    } else {
        Value::Float(v)
    }
}

fn text_value(s: &str) -> Value {
    if NA_TOKENS.contains(&s.trim()) {
        Value::Missing
    } else {
        Value::Text(s.to_string())
    }
}

fn timestamp_value(v: i64, unit: TimeUnit) -> Value {
    let per_second: i64 = match unit {
        TimeUnit::Nanoseconds => 1_000_000_000,
        TimeUnit::Microseconds => 1_000_000,
        TimeUnit::Milliseconds => 1_000,
    };
    let nanos_per_unit = 1_000_000_000 / per_second;
    let secs = v.div_euclid(per_second);
    let nanos = (v.rem_euclid(per_second) * nanos_per_unit) as u32;
    DateTime::from_timestamp(secs, nanos).map_or(Value::Missing, |dt| Value::DateTime(dt.naive_utc()))
}

/// First row is the header; every following row is data.
fn range_to_dataset(range: &Range<Data>) -> Result<Dataset, AppError> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Dataset::new(Vec::new());
    };

    let mut existing_names = HashSet::new();
    let names: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(position, cell)| unique_column_name(&cell.to_string(), position, &mut existing_names))
        .collect();

    let mut values: Vec<Vec<Value>> = vec![Vec::new(); names.len()];
    for row in rows {
        for (idx, column) in values.iter_mut().enumerate() {
            column.push(row.get(idx).map_or(Value::Missing, cell_to_value));
        }
    }

    let columns = names
        .into_iter()
        .zip(values)
        .map(|(name, values)| Column::new(name, values))
        .collect();
    Dataset::new(columns)
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Missing,
        Data::Bool(b) => Value::Bool(*b),
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) => float_value(*f),
        Data::String(s) => text_value(s),
        Data::DateTime(dt) => {
            excel_serial_to_datetime(dt.as_f64()).map_or(Value::Missing, Value::DateTime)
        }
        Data::DateTimeIso(s) => parse_datetime(s).map_or_else(|| text_value(s), Value::DateTime),
        Data::DurationIso(s) => text_value(s),
    }
}

/// Excel serial dates count days from 1899-12-30.
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(chrono::Duration::milliseconds(millis))
}

pub async fn load_file_from_url(url: &str, max_file_size: usize) -> Result<Bytes, AppError> {
    let client = Client::new();
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::FileProcessingError(format!("Failed to fetch file: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::FileProcessingError(format!(
            "Failed to fetch file. Status: {}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::FileProcessingError(format!("Failed to read response bytes: {}", e)))?;

    if bytes.len() > max_file_size {
        return Err(AppError::InvalidInput(format!(
            "File size {} exceeds maximum allowed size of {} bytes",
            bytes.len(),
            max_file_size
        )));
    }
    tracing::info!("Downloaded {} bytes", bytes.len());
    Ok(bytes)
}

/// An explicit type wins; otherwise the extension of the URL path decides.
pub fn format_from_url(url: &str, explicit: Option<&str>) -> Result<FileFormat, AppError> {
    if let Some(kind) = explicit {
        return kind.parse();
    }

    let parsed = Url::parse(url).map_err(|e| AppError::InvalidInput(format!("Invalid URL {}: {}", url, e)))?;
    let ext = file_type_of(parsed.path());
    FileFormat::from_extension(&ext).ok_or_else(|| {
        AppError::UnsupportedFormat(format!("Cannot tell the file type of {}", url))
    })
}

pub fn save_analysis_to_json(result: &AnalysisResult, path: impl AsRef<Path>) -> Result<(), AppError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(result)?;
    fs::write(path, json)?;
    tracing::info!("Saved analysis of {} to {}", result.file_path, path.display());
    Ok(())
}

pub fn load_analysis_from_json(path: impl AsRef<Path>) -> Result<AnalysisResult, AppError> {
    let path = path.as_ref();
    let json = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            AppError::NotFound(format!("Analysis file not found: {}", path.display()))
        }
        _ => AppError::IoError(e),
    })?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MAX: usize = 1024 * 1024;

    fn temp_file(suffix: &str, contents: &[u8]) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn formats_from_extensions() {
        assert_eq!(FileFormat::from_extension("CSV"), Some(FileFormat::Csv));
        assert_eq!(FileFormat::from_extension(".parquet"), Some(FileFormat::Parquet));
        assert_eq!(FileFormat::from_extension("docx"), None);
        assert!(matches!("pdf".parse::<FileFormat>(), Err(AppError::UnsupportedFormat(_))));
        assert_eq!(file_type_of("/data/Sales.XLSX"), "xlsx");
        assert_eq!(file_type_of("/data/noext"), "");
    }

    #[test]
    fn reads_csv_with_na_tokens() {
        let file = temp_file(".csv", b"id,name,score\n1,alice,3.5\n2,NA,\n3,bob,N/A\n4,-,1.25\n");
        let ds = load_dataset(file.path(), MAX).unwrap();
        assert_eq!(ds.row_count(), 4);
        assert_eq!(ds.column_names(), vec!["id", "name", "score"]);

        let id = ds.column("id").unwrap();
        assert_eq!(id.kind(), ColumnKind::Integer);
        assert_eq!(id.values()[0], Value::Int(1));

        assert_eq!(ds.column("name").unwrap().missing_count(), 2);
        let score = ds.column("score").unwrap();
        assert_eq!(score.kind(), ColumnKind::Float);
        assert_eq!(score.missing_count(), 2);
    }

    #[test]
    fn reads_tsv_and_sniffs_txt() {
        let tsv = temp_file(".tsv", b"a\tb\n1\tx\n2\ty\n");
        assert_eq!(load_dataset(tsv.path(), MAX).unwrap().column_count(), 2);

        let txt = temp_file(".txt", b"a;b;c\n1;2;3\n");
        let ds = load_dataset(txt.path(), MAX).unwrap();
        assert_eq!(ds.column_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn reads_json_records() {
        let file = temp_file(
            ".json",
            br#"[{"city":"Oslo","active":true},{"city":null,"active":false}]"#,
        );
        let ds = load_dataset(file.path(), MAX).unwrap();
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.column("active").unwrap().kind(), ColumnKind::Boolean);
        assert_eq!(ds.column("city").unwrap().missing_count(), 1);
    }

    #[test]
    fn reads_parquet() {
        let mut df = df!("qty" => &[1i64, 2, 3], "label" => &["a", "b", "c"]).unwrap();
        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        ParquetWriter::new(file.reopen().unwrap()).finish(&mut df).unwrap();

        let ds = load_dataset(file.path(), MAX).unwrap();
        assert_eq!(ds.row_count(), 3);
        assert_eq!(ds.column("qty").unwrap().kind(), ColumnKind::Integer);
    }

    #[test]
    fn small_parquet_integers_stay_integers() {
        let mut df = df!(
            "qty" => &[1i16, -2, 300],
            "flags" => &[1u8, 0, 7],
            "ratio" => &[0.5f64, f64::INFINITY, f64::NAN]
        )
        .unwrap();
        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        ParquetWriter::new(file.reopen().unwrap()).finish(&mut df).unwrap();

        let ds = load_dataset(file.path(), MAX).unwrap();
        let qty = ds.column("qty").unwrap();
        assert_eq!(qty.kind(), ColumnKind::Integer);
        assert_eq!(qty.values(), &[Value::Int(1), Value::Int(-2), Value::Int(300)]);
        assert_eq!(ds.column("flags").unwrap().values()[2], Value::Int(7));

        let ratio = ds.column("ratio").unwrap();
        assert_eq!(ratio.values()[1], Value::from("inf"));
        assert_eq!(ratio.missing_count(), 1);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load_dataset("/no/such/file.csv", MAX).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn oversized_file_is_rejected() {
        let file = temp_file(".csv", b"a,b\n1,2\n3,4\n");
        let err = load_dataset(file.path(), 4).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn unreadable_unknown_extension_is_unsupported() {
        let file = temp_file(".bin", b"");
        let err = load_dataset(file.path(), MAX).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat(_)));
    }

    #[test]
    fn spreadsheet_cells() {
        assert_eq!(cell_to_value(&Data::Empty), Value::Missing);
        assert_eq!(cell_to_value(&Data::String("N/A".into())), Value::Missing);
        assert_eq!(cell_to_value(&Data::String("x".into())), Value::from("x"));
        assert_eq!(cell_to_value(&Data::Int(3)), Value::Int(3));
        assert_eq!(cell_to_value(&Data::Bool(true)), Value::Bool(true));

        let expected = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(excel_serial_to_datetime(45292.5), Some(expected));
    }

    #[test]
    fn spreadsheet_range_uses_first_row_as_header() {
        let mut range = Range::new((0, 0), (2, 2));
        range.set_value((0, 0), Data::String("name".into()));
        range.set_value((0, 1), Data::String("name".into()));
        range.set_value((1, 0), Data::String("a".into()));
        range.set_value((1, 1), Data::Int(1));
        range.set_value((2, 0), Data::String("b".into()));
        range.set_value((2, 1), Data::Float(2.5));

        let ds = range_to_dataset(&range).unwrap();
        assert_eq!(ds.column_names(), vec!["name", "name_1", "column_3"]);
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.column("name_1").unwrap().kind(), ColumnKind::Float);
        assert_eq!(ds.column("column_3").unwrap().missing_count(), 2);
    }

    #[test]
    fn url_format_resolution() {
        assert_eq!(
            format_from_url("https://bucket.example.com/data/file.xlsx?sig=abc", None).unwrap(),
            FileFormat::Xlsx
        );
        assert_eq!(
            format_from_url("https://bucket.example.com/blob", Some("json")).unwrap(),
            FileFormat::Json
        );
        assert!(format_from_url("https://bucket.example.com/blob", None).is_err());
    }

    #[test]
    fn missing_saved_analysis_is_not_found() {
        let err = load_analysis_from_json("/no/such/analysis.json").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn malformed_saved_analysis_is_a_parse_error() {
        let file = temp_file(".json", b"{\"file_path\": 3}");
        let err = load_analysis_from_json(file.path()).unwrap_err();
        assert!(matches!(err, AppError::ParseError(_)));
    }
}
