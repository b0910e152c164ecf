//! Self-contained HTML rendering of an analysis.

use std::fmt::{self, Write};
use std::fs;
use std::path::Path;

use crate::error::AppError;
use crate::models::{AnalysisResult, DateTimeStats, FieldAnalysis, FieldStats, FieldType, NumericalStats};
use crate::services::dataset::types::SampleRows;
use crate::services::file_processor::load_analysis_from_json;
use crate::services::summary::DatasetSummary;

const STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; background: #f4f6fb; color: #1f2933; margin: 0; }
.container { max-width: 1200px; margin: 0 auto; padding: 24px; }
.header { background: linear-gradient(135deg, #4c6ef5, #7048e8); color: #fff; border-radius: 12px; padding: 24px; margin-bottom: 24px; }
.header h1 { margin: 0 0 8px 0; }
.meta { opacity: 0.85; font-size: 14px; }
.summary-cards { display: grid; grid-template-columns: repeat(auto-fit, minmax(220px, 1fr)); gap: 16px; margin-bottom: 24px; }
.card, .field-card, .panel { background: #fff; border-radius: 12px; padding: 16px; box-shadow: 0 2px 6px rgba(0,0,0,0.06); }
.card h3 { margin: 0; font-size: 14px; color: #52606d; }
.stat { font-size: 28px; font-weight: 700; margin-top: 8px; }
.stat-label { font-size: 12px; color: #7b8794; text-transform: uppercase; }
.section-header h2 { margin: 24px 0 12px 0; }
.type-bar { display: flex; height: 28px; border-radius: 6px; overflow: hidden; }
.type-bar div { color: #fff; font-size: 12px; line-height: 28px; text-align: center; white-space: nowrap; overflow: hidden; }
.legend span { display: inline-block; margin: 8px 12px 0 0; font-size: 13px; }
.bar-row { display: flex; align-items: center; margin: 6px 0; font-size: 13px; }
.bar-label { width: 200px; overflow: hidden; text-overflow: ellipsis; white-space: nowrap; }
.bar-track { flex: 1; background: #e4e7eb; border-radius: 4px; height: 12px; margin: 0 8px; }
.bar-fill { background: #f03e3e; height: 12px; border-radius: 4px; }
.bar-fill.top { background: #4c6ef5; }
.field-grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(340px, 1fr)); gap: 16px; }
.field-header { display: flex; justify-content: space-between; align-items: center; margin-bottom: 12px; }
.field-name { font-weight: 700; word-break: break-all; }
.field-type-badge { background: #edf2ff; color: #364fc7; border-radius: 999px; padding: 2px 10px; font-size: 12px; }
.stats-grid { display: grid; grid-template-columns: repeat(3, 1fr); gap: 8px; }
.stat-item { background: #f8f9fa; border-radius: 8px; padding: 8px; text-align: center; }
.stat-value { font-weight: 600; }
.missing-data { color: #e03131; }
.warning-data { color: #f08c00; }
.good-data { color: #2f9e44; }
.sample-values { margin-top: 12px; font-size: 13px; color: #52606d; word-break: break-word; }
table { border-collapse: collapse; width: 100%; font-size: 13px; background: #fff; }
th, td { border: 1px solid #e4e7eb; padding: 6px 8px; text-align: left; }
th { background: #f1f3f5; }
.table-wrap { overflow-x: auto; }
.range-track { position: relative; height: 16px; background: #e4e7eb; border-radius: 4px; margin: 14px 0 4px 0; }
.range-box { position: absolute; top: 0; height: 16px; background: #15aabf; opacity: 0.7; border-radius: 4px; }
.range-box.dates { background: #7950f2; }
.range-median { position: absolute; top: -3px; width: 2px; height: 22px; background: #1f2933; }
.range-labels { display: flex; justify-content: space-between; font-size: 12px; color: #7b8794; }
"#;

fn type_color(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "#4c6ef5",
        FieldType::Integer => "#12b886",
        FieldType::Float => "#15aabf",
        FieldType::Boolean => "#fab005",
        FieldType::DateTime => "#7950f2",
        FieldType::Categorical => "#fd7e14",
        FieldType::Id => "#868e96",
        FieldType::Unknown => "#adb5bd",
    }
}

fn type_title(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "String",
        FieldType::Integer => "Integer",
        FieldType::Float => "Float",
        FieldType::Boolean => "Boolean",
        FieldType::DateTime => "Datetime",
        FieldType::Categorical => "Categorical",
        FieldType::Id => "Id",
        FieldType::Unknown => "Unknown",
    }
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Integer with thousands separators, e.g. `12,345`.
pub fn format_number(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn missing_class(percentage: f64) -> &'static str {
    if percentage > 10.0 {
        "missing-data"
    } else if percentage > 5.0 {
        "warning-data"
    } else {
        "good-data"
    }
}

fn opt_num(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{:.2}", v))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlReporter;

impl HtmlReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, result: &AnalysisResult, sample: Option<&SampleRows>) -> Result<String, AppError> {
        let mut html = String::new();
        self.write_page(&mut html, result, sample)
            .map_err(|e| AppError::Internal(format!("Failed to render report: {}", e)))?;
        Ok(html)
    }

    pub fn generate_report(
        &self,
        result: &AnalysisResult,
        output_path: impl AsRef<Path>,
        sample: Option<&SampleRows>,
    ) -> Result<(), AppError> {
        let output_path = output_path.as_ref();
        fs::write(output_path, self.render(result, sample)?)?;
        tracing::info!("Wrote HTML report to {}", output_path.display());
        Ok(())
    }

    pub fn generate_from_json(
        &self,
        json_path: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
    ) -> Result<(), AppError> {
        let result = load_analysis_from_json(json_path)?;
        self.generate_report(&result, output_path, None)
    }

    fn write_page(&self, out: &mut String, result: &AnalysisResult, sample: Option<&SampleRows>) -> fmt::Result {
        let summary = DatasetSummary::summarize(result);
        let title = escape_html(&result.file_path);

        writeln!(out, "<!DOCTYPE html>")?;
        writeln!(out, "<html lang=\"en\">")?;
        writeln!(out, "<head>")?;
        writeln!(out, "<meta charset=\"utf-8\">")?;
        writeln!(out, "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">")?;
        writeln!(out, "<title>Data Analysis Report: {}</title>", title)?;
        writeln!(out, "<style>{}</style>", STYLE)?;
        writeln!(out, "</head>")?;
        writeln!(out, "<body>")?;
        writeln!(out, "<div class=\"container\">")?;

        writeln!(out, "<div class=\"header\">")?;
        writeln!(out, "<h1>Data Analysis Report</h1>")?;
        writeln!(
            out,
            "<div class=\"meta\">{} &middot; {} &middot; analyzed {}</div>",
            title,
            escape_html(&result.file_type),
            result.analysis_timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(out, "</div>")?;

        self.write_summary_cards(out, result, &summary)?;
        self.write_type_distribution(out, &summary)?;
        self.write_missing_overview(out, result)?;

        for field_type in FieldType::ALL {
            let fields: Vec<&FieldAnalysis> =
                result.fields.iter().filter(|f| f.field_type == field_type).collect();
            if !fields.is_empty() {
                self.write_field_section(out, field_type, &fields)?;
            }
        }

        if let Some(sample) = sample {
            self.write_sample_table(out, sample)?;
        }

        writeln!(out, "</div>")?;
        writeln!(out, "</body>")?;
        writeln!(out, "</html>")
    }

    fn write_summary_cards(&self, out: &mut String, result: &AnalysisResult, summary: &DatasetSummary) -> fmt::Result {
        let cards = [
            ("Dataset Overview", format_number(result.total_rows), "Total Rows"),
            ("Fields", format_number(result.total_columns), "Total Columns"),
            ("Data Quality", format!("{}%", summary.completeness_percentage), "Completeness"),
            ("Performance", format!("{}s", result.processing_time_seconds), "Processing Time"),
        ];

        writeln!(out, "<div class=\"summary-cards\">")?;
        for (heading, value, label) in cards {
            writeln!(
                out,
                "<div class=\"card\"><h3>{}</h3><div class=\"stat\">{}</div><div class=\"stat-label\">{}</div></div>",
                heading, value, label
            )?;
        }
        writeln!(out, "</div>")
    }

    fn write_type_distribution(&self, out: &mut String, summary: &DatasetSummary) -> fmt::Result {
        writeln!(out, "<div class=\"section-header\"><h2>Field Type Distribution</h2></div>")?;
        writeln!(out, "<div class=\"panel\">")?;
        if summary.total_fields == 0 {
            writeln!(out, "<p>No fields.</p>")?;
            return writeln!(out, "</div>");
        }

        writeln!(out, "<div class=\"type-bar\">")?;
        for (field_type, count) in &summary.type_counts {
            let width = *count as f64 / summary.total_fields as f64 * 100.0;
            writeln!(
                out,
                "<div style=\"width:{:.2}%;background:{}\" title=\"{}: {}\">{}</div>",
                width,
                type_color(*field_type),
                field_type,
                count,
                count
            )?;
        }
        writeln!(out, "</div>")?;

        write!(out, "<div class=\"legend\">")?;
        for (field_type, count) in &summary.type_counts {
            write!(
                out,
                "<span><span style=\"color:{}\">&#9632;</span> {} ({})</span>",
                type_color(*field_type),
                field_type,
                count
            )?;
        }
        writeln!(out, "</div>")?;
        writeln!(out, "</div>")
    }

    fn write_missing_overview(&self, out: &mut String, result: &AnalysisResult) -> fmt::Result {
        writeln!(out, "<div class=\"section-header\"><h2>Missing Data Overview</h2></div>")?;
        writeln!(out, "<div class=\"panel\">")?;

        let mut with_missing: Vec<(&str, f64, usize)> = result
            .fields
            .iter()
            .filter_map(|f| {
                let stats = f.stats.as_ref()?;
                (stats.missing_count() > 0).then(|| (f.name.as_str(), stats.missing_percentage(), stats.missing_count()))
            })
            .collect();
        with_missing.sort_by(|a, b| b.1.total_cmp(&a.1));

        if with_missing.is_empty() {
            writeln!(out, "<p class=\"good-data\">No missing values detected.</p>")?;
        }
        for (name, pct, count) in with_missing {
            writeln!(
                out,
                "<div class=\"bar-row\"><div class=\"bar-label\">{}</div><div class=\"bar-track\"><div class=\"bar-fill\" style=\"width:{:.2}%\"></div></div><div>{}% ({})</div></div>",
                escape_html(name),
                pct,
                pct,
                format_number(count)
            )?;
        }
        writeln!(out, "</div>")
    }

    fn write_field_section(&self, out: &mut String, field_type: FieldType, fields: &[&FieldAnalysis]) -> fmt::Result {
        writeln!(out, "<div class=\"field-type-section\">")?;
        writeln!(
            out,
            "<div class=\"section-header\"><h2>{} Fields ({})</h2></div>",
            type_title(field_type),
            fields.len()
        )?;
        writeln!(out, "<div class=\"field-grid\">")?;
        for field in fields {
            self.write_field_card(out, field)?;
        }
        writeln!(out, "</div>")?;
        writeln!(out, "</div>")
    }

    fn write_field_card(&self, out: &mut String, field: &FieldAnalysis) -> fmt::Result {
        writeln!(out, "<div class=\"field-card\">")?;
        writeln!(
            out,
            "<div class=\"field-header\"><div class=\"field-name\">{}</div><div class=\"field-type-badge\">{}</div></div>",
            escape_html(&field.name),
            field.field_type
        )?;

        let mut items: Vec<(String, &str, &str)> =
            vec![(format_number(field.total_count), "Total Values", "")];
        match &field.stats {
            Some(FieldStats::Categorical(s)) => {
                items.push((format_number(s.unique_count), "Unique Values", ""));
            }
            Some(FieldStats::Numerical(s)) => {
                items.push((opt_num(s.mean), "Mean", ""));
                items.push((opt_num(s.std_dev), "Std Dev", ""));
                items.push((opt_num(s.min_value), "Min", ""));
                items.push((opt_num(s.median), "Median", ""));
                items.push((opt_num(s.max_value), "Max", ""));
            }
            Some(FieldStats::String(s)) => {
                let avg = s.avg_length.map_or_else(|| "N/A".to_string(), |v| format!("{:.1}", v));
                items.push((avg, "Avg Length", ""));
                items.push((format_number(s.unique_count), "Unique Values", ""));
            }
            Some(FieldStats::DateTime(s)) => {
                let day = |d: Option<chrono::NaiveDateTime>| {
                    d.map_or_else(|| "N/A".to_string(), |d| d.format("%Y-%m-%d").to_string())
                };
                items.push((day(s.min_date), "Earliest Date", ""));
                items.push((day(s.max_date), "Latest Date", ""));
            }
            None => {}
        }
        if let Some(stats) = &field.stats {
            let pct = stats.missing_percentage();
            items.push((format!("{}%", pct), "Missing Data", missing_class(pct)));
        }

        writeln!(out, "<div class=\"stats-grid\">")?;
        for (value, label, class) in items {
            writeln!(
                out,
                "<div class=\"stat-item\"><div class=\"stat-value {}\">{}</div><div class=\"stat-label\">{}</div></div>",
                class, value, label
            )?;
        }
        writeln!(out, "</div>")?;

        match &field.stats {
            Some(FieldStats::Numerical(s)) => self.write_numeric_range(out, s)?,
            Some(FieldStats::DateTime(s)) => self.write_date_span(out, s)?,
            _ => {}
        }

        if let Some(stats) = field.categorical_stats() {
            writeln!(out, "<div class=\"top-values\">")?;
            for top in &stats.top_values {
                writeln!(
                    out,
                    "<div class=\"bar-row\"><div class=\"bar-label\">{}</div><div class=\"bar-track\"><div class=\"bar-fill top\" style=\"width:{:.2}%\"></div></div><div>{}</div></div>",
                    escape_html(&top.value),
                    top.percentage,
                    format_number(top.count)
                )?;
            }
            writeln!(out, "</div>")?;
        }

        if !field.sample_values.is_empty() {
            let samples: Vec<String> = field
                .sample_values
                .iter()
                .map(|v| escape_html(&v.to_string()))
                .collect();
            writeln!(
                out,
                "<div class=\"sample-values\"><strong>Sample Values:</strong> {}</div>",
                samples.join(", ")
            )?;
        }

        writeln!(out, "</div>")
    }

    /// Min to max strip with the interquartile box and a median marker.
    fn write_numeric_range(&self, out: &mut String, stats: &NumericalStats) -> fmt::Result {
        let (Some(min), Some(max), Some(q)) = (stats.min_value, stats.max_value, stats.quartiles) else {
            return Ok(());
        };
        let span = max - min;
        let position = |v: f64| {
            if span > 0.0 && span.is_finite() {
                ((v - min) / span * 100.0).clamp(0.0, 100.0)
            } else {
                50.0
            }
        };
        let (left, right) = (position(q.q25), position(q.q75));

        writeln!(out, "<div class=\"range-track\" title=\"min, quartiles and max\">")?;
        writeln!(
            out,
            "<div class=\"range-box\" style=\"left:{:.2}%;width:{:.2}%\"></div>",
            left,
            right - left
        )?;
        writeln!(out, "<div class=\"range-median\" style=\"left:{:.2}%\"></div>", position(q.q50))?;
        writeln!(out, "</div>")?;
        writeln!(
            out,
            "<div class=\"range-labels\"><span>{:.2}</span><span>Q1 {:.2}</span><span>Median {:.2}</span><span>Q3 {:.2}</span><span>{:.2}</span></div>",
            min, q.q25, q.q50, q.q75, max
        )
    }

    fn write_date_span(&self, out: &mut String, stats: &DateTimeStats) -> fmt::Result {
        let (Some(first), Some(last)) = (stats.min_date, stats.max_date) else {
            return Ok(());
        };
        writeln!(out, "<div class=\"range-track\"><div class=\"range-box dates\" style=\"left:0%;width:100%\"></div></div>")?;
        writeln!(
            out,
            "<div class=\"range-labels\"><span>{}</span><span>{} days</span><span>{}</span></div>",
            first.format("%Y-%m-%d"),
            format_number((last - first).num_days().max(0) as usize),
            last.format("%Y-%m-%d")
        )
    }

    fn write_sample_table(&self, out: &mut String, sample: &SampleRows) -> fmt::Result {
        writeln!(out, "<div class=\"section-header\"><h2>Sample Rows</h2></div>")?;
        writeln!(out, "<div class=\"table-wrap\"><table>")?;
        write!(out, "<thead><tr>")?;
        for column in &sample.columns {
            write!(out, "<th>{}</th>", escape_html(column))?;
        }
        writeln!(out, "</tr></thead>")?;
        writeln!(out, "<tbody>")?;
        for row in &sample.rows {
            write!(out, "<tr>")?;
            for cell in row {
                write!(out, "<td>{}</td>", escape_html(&cell.to_string()))?;
            }
            writeln!(out, "</tr>")?;
        }
        writeln!(out, "</tbody>")?;
        writeln!(out, "</table></div>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dataset::analyzer::DatasetAnalyzer;
    use crate::services::dataset::types::{Column, Dataset, SampleMode};
    use crate::services::file_processor::save_analysis_to_json;

    fn dataset() -> Dataset {
        Dataset::new(vec![
            Column::from_values("order_id", 1..=12i64),
            Column::from_values(
                "status",
                (0..12).map(|i| if i % 4 == 0 { None } else { Some(["open", "closed"][i % 2]) }),
            ),
            Column::from_values("note", (0..12).map(|i| format!("<b>note {}</b>", i))),
            Column::from_values("amount", (0..12).map(|i| i as f64 + 0.5)),
        ])
        .unwrap()
    }

    fn analysis() -> AnalysisResult {
        DatasetAnalyzer::new(0.1)
            .with_sample_seed(3)
            .analyze(&dataset(), "data/orders & <items>.csv", "csv")
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("<a href=\"x\">&'</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;");
    }

    #[test]
    fn formats_thousands() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn renders_sections_and_escapes_user_text() {
        let html = HtmlReporter::new().render(&analysis(), None).unwrap();
        assert!(html.to_lowercase().contains("<html"));
        assert!(html.contains("data/orders &amp; &lt;items&gt;.csv"));
        assert!(!html.contains("<b>note"));
        assert!(html.contains("&lt;b&gt;note"));
        assert!(html.contains("Field Type Distribution"));
        assert!(html.contains("Missing Data Overview"));
        assert!(html.contains("Id Fields (1)"));
        assert!(html.contains("Float Fields (1)"));
        assert!(html.contains("Sample Values:"));
        assert!(!html.contains("Sample Rows"));
    }

    #[test]
    fn renders_sample_rows_when_given() {
        let ds = dataset();
        let sample = DatasetAnalyzer::default().sample_rows(&ds, 3, SampleMode::Head);
        let html = HtmlReporter::new().render(&analysis(), Some(&sample)).unwrap();
        assert!(html.contains("Sample Rows"));
        assert!(html.contains("<th>order_id</th>"));
        // header row plus three data rows
        assert_eq!(html.matches("<tr>").count(), 4);
    }

    #[test]
    fn numeric_fields_get_a_quartile_strip() {
        let html = HtmlReporter::new().render(&analysis(), None).unwrap();
        // amount is 0.5..=11.5: Q1 3.25, median 6.0, Q3 8.75
        assert!(html.contains("<div class=\"range-box\" style=\"left:25.00%;width:50.00%\"></div>"));
        assert!(html.contains("<div class=\"range-median\" style=\"left:50.00%\"></div>"));
        assert!(html.contains("<span>Q1 3.25</span>"));
        assert!(html.contains("<span>11.50</span>"));
    }

    #[test]
    fn constant_numbers_center_the_marker() {
        let ds = Dataset::new(vec![Column::from_values("level", vec![2.5; 30])]).unwrap();
        let result = DatasetAnalyzer::new(0.01).analyze(&ds, "levels.csv", "csv");
        assert_eq!(result.fields[0].field_type, FieldType::Float);
        let html = HtmlReporter::new().render(&result, None).unwrap();
        assert!(html.contains("<div class=\"range-median\" style=\"left:50.00%\"></div>"));
        assert!(html.contains("width:0.00%"));
    }

    #[test]
    fn datetime_fields_show_their_span() {
        let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let ds = Dataset::new(vec![Column::from_values(
            "shipped",
            (0..20).map(|d| start + chrono::Duration::days(d * 10)),
        )])
        .unwrap();
        let result = DatasetAnalyzer::new(0.1).analyze(&ds, "shipments.csv", "csv");
        let html = HtmlReporter::new().render(&result, None).unwrap();
        assert!(html.contains("<span>2024-01-01</span><span>190 days</span><span>2024-07-09</span>"));
    }

    #[test]
    fn writes_report_from_saved_json() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("analysis.json");
        let html_path = dir.path().join("report.html");
        let result = analysis();

        save_analysis_to_json(&result, &json_path).unwrap();
        HtmlReporter::new().generate_from_json(&json_path, &html_path).unwrap();

        let content = fs::read_to_string(&html_path).unwrap();
        assert!(content.contains("<html"));
        assert!(content.contains(&escape_html(&result.file_path)));
    }
}
