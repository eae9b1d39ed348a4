//! Output formatting utilities.

use emberdb::backup::{BackupReport, CaptureSummary, RestoreReport};
use emberdb::Document;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::error::Result;
use crate::OutputFormat;

/// A simple key-value row for displaying info.
#[derive(Tabled)]
pub struct InfoRow {
    #[tabled(rename = "Property")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl InfoRow {
    fn new(key: &str, value: impl ToString) -> Self {
        Self { key: key.to_string(), value: value.to_string() }
    }
}

/// Format an info table with key-value pairs.
pub fn format_info_table(rows: Vec<InfoRow>) -> String {
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}

/// Format a completed backup run.
pub fn format_backup_report(report: &BackupReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(format_info_table(vec![
            InfoRow::new("Location", report.location.display()),
            InfoRow::new("Capture", report.capture_dir.display()),
            InfoRow::new("Kind", report.kind),
            InfoRow::new("Ordinal", report.ordinal),
            InfoRow::new("Covers", report.covers),
            InfoRow::new("Segments", report.segments_copied),
            InfoRow::new("Bytes", report.bytes_copied),
            InfoRow::new("Elapsed", format!("{:.2?}", report.elapsed)),
        ])),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
            "location": report.location,
            "capture_dir": report.capture_dir,
            "kind": report.kind,
            "ordinal": report.ordinal,
            "covers": report.covers,
            "segments_copied": report.segments_copied,
            "bytes_copied": report.bytes_copied,
            "elapsed_ms": report.elapsed.as_secs_f64() * 1000.0,
        }))?),
    }
}

/// Format a completed restore.
pub fn format_restore_report(report: &RestoreReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(format_info_table(vec![
            InfoRow::new("Captures", report.captures_applied),
            InfoRow::new("Replayed Through", report.replayed_through),
            InfoRow::new("Records Applied", report.records_applied),
            InfoRow::new("Documents", report.documents),
            InfoRow::new("Compacted", report.compacted),
            InfoRow::new("Elapsed", format!("{:.2?}", report.elapsed)),
        ])),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
            "captures_applied": report.captures_applied,
            "replayed_through": report.replayed_through,
            "records_applied": report.records_applied,
            "documents": report.documents,
            "compacted": report.compacted,
            "elapsed_ms": report.elapsed.as_secs_f64() * 1000.0,
        }))?),
    }
}

/// A capture row of a verified chain.
#[derive(Tabled)]
pub struct CaptureRow {
    #[tabled(rename = "Ordinal")]
    pub ordinal: u64,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Covers")]
    pub covers: String,
    #[tabled(rename = "Segments")]
    pub segments: usize,
    #[tabled(rename = "Bytes")]
    pub bytes: u64,
    #[tabled(rename = "Directory")]
    pub dir: String,
}

/// Format the captures of a verified chain.
pub fn format_captures(captures: &[CaptureSummary], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => {
            let rows: Vec<CaptureRow> = captures
                .iter()
                .map(|c| CaptureRow {
                    ordinal: c.ordinal,
                    kind: c.kind.to_string(),
                    covers: c.covers.to_string(),
                    segments: c.segments,
                    bytes: c.bytes,
                    dir: c.dir.display().to_string(),
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            Ok(format!("{table}\n({} captures)", captures.len()))
        }
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = captures
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "ordinal": c.ordinal,
                        "kind": c.kind,
                        "covers": c.covers,
                        "segments": c.segments,
                        "bytes": c.bytes,
                        "dir": c.dir,
                    })
                })
                .collect();
            Ok(serde_json::to_string_pretty(&rows)?)
        }
    }
}

/// A document row.
#[derive(Tabled)]
pub struct DocumentRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Etag")]
    pub etag: u64,
    #[tabled(rename = "Body")]
    pub body: String,
}

/// Format documents.
pub fn format_documents(documents: &[Document], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => {
            if documents.is_empty() {
                return Ok("(no documents)".to_string());
            }
            let rows: Vec<DocumentRow> = documents
                .iter()
                .map(|d| DocumentRow { key: d.key.clone(), etag: d.etag, body: d.body.to_string() })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            Ok(format!("{table}\n({} documents)", documents.len()))
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(documents)?),
    }
}
