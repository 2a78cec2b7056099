//! JSON and CSV export helpers.
//!
//! JSON exports keep full fidelity. CSV exports flatten each record into a
//! fixed column set declared by its [`CsvRecord`] implementation.

use engine_core::{AnalyticsEvent, Error, HeatmapPoint, Result};
use serde::Serialize;

/// A record that can be written as one CSV row.
pub trait CsvRecord {
    /// Column names, in order.
    fn headers() -> &'static [&'static str];

    /// Field values, in header order.
    fn row(&self) -> Vec<String>;
}

/// Export format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Pretty-printed JSON of any serializable value.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Error::Serialization)
}

/// CSV with a header row followed by one row per record.
pub fn to_csv<R: CsvRecord>(records: &[R]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(R::headers())
        .map_err(|e| Error::export(e.to_string()))?;
    for record in records {
        writer
            .write_record(record.row())
            .map_err(|e| Error::export(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::export(e.to_string()))
}

/// Exports `records` in the requested format.
pub fn export<R>(records: &[R], format: ExportFormat) -> Result<String>
where
    R: CsvRecord + Serialize,
{
    match format {
        ExportFormat::Json => to_json(records),
        ExportFormat::Csv => to_csv(records),
    }
}

/// Formats an optional number for a CSV cell.
pub fn opt_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl CsvRecord for AnalyticsEvent {
    fn headers() -> &'static [&'static str] {
        &["id", "name", "category", "page", "session_id", "timestamp", "properties"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.category.as_str().to_string(),
            self.page.clone(),
            self.session_id.clone(),
            self.timestamp.to_string(),
            self.properties.to_string(),
        ]
    }
}

impl CsvRecord for HeatmapPoint {
    fn headers() -> &'static [&'static str] {
        &[
            "page",
            "cell_x",
            "cell_y",
            "element",
            "element_type",
            "interaction",
            "count",
            "intensity",
            "first_seen",
            "last_seen",
        ]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.page.clone(),
            self.cell_x.to_string(),
            self.cell_y.to_string(),
            self.element.clone(),
            self.element_type.clone(),
            self.interaction.as_str().to_string(),
            self.count.to_string(),
            format!("{:.2}", self.intensity),
            self.first_seen.to_string(),
            self.last_seen.to_string(),
        ]
    }
}
