//! CSV report documents. Every document is UTF-8 with a byte-order mark so
//! spreadsheet tools pick the right encoding.

use crate::application::use_cases::analytics::mean;
use crate::application::use_cases::managers::{ManagerZone, Zone};
use crate::domain::deal::ScoredDeal;
use crate::domain::error::{AppError, Result};
use chrono::NaiveDateTime;
use csv::WriterBuilder;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
pub const BUNDLE_NAME: &str = "dealpulse_reports.zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDocument {
    Summary,
    Managers,
    Deals,
}

impl ReportDocument {
    pub const ALL: [ReportDocument; 3] = [
        ReportDocument::Summary,
        ReportDocument::Managers,
        ReportDocument::Deals,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            ReportDocument::Summary => "01_summary.csv",
            ReportDocument::Managers => "02_managers.csv",
            ReportDocument::Deals => "03_deals.csv",
        }
    }

    /// Accepts the file name with or without extension and numeric prefix.
    pub fn from_name(name: &str) -> Option<Self> {
        let stem = name.trim().trim_end_matches(".csv");
        Self::ALL.into_iter().find(|doc| {
            let file_stem = doc.file_name().trim_end_matches(".csv");
            stem.eq_ignore_ascii_case(file_stem) || stem.eq_ignore_ascii_case(&file_stem[3..])
        })
    }
}

fn to_csv(header: &[&str], rows: Vec<Vec<String>>) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().from_writer(UTF8_BOM.to_vec());
    writer
        .write_record(header)
        .map_err(|e| AppError::Internal(format!("Failed to write CSV header: {}", e)))?;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|e| AppError::Internal(format!("Failed to write CSV row: {}", e)))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to flush CSV: {}", e)))
}

fn ts(value: Option<NaiveDateTime>) -> String {
    value
        .map(|v| v.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

pub fn summary_csv(deals: &[ScoredDeal]) -> Result<Vec<u8>> {
    let count = |pred: fn(&ScoredDeal) -> bool| deals.iter().filter(|d| pred(d)).count().to_string();
    let rows = vec![
        vec!["Total deals".to_string(), deals.len().to_string()],
        vec![
            "Volume".to_string(),
            format!("{:.0}", deals.iter().map(|d| d.amount).sum::<f64>()),
        ],
        vec![
            "Average health".to_string(),
            format!("{:.0}%", mean(deals.iter().map(|d| d.health as f64))),
        ],
        vec!["Stuck".to_string(), count(|d| d.flags.stuck)],
        vec!["Without tasks".to_string(), count(|d| d.flags.no_tasks)],
        vec!["Without contacts".to_string(), count(|d| d.flags.no_contact)],
        vec!["Without companies".to_string(), count(|d| d.flags.no_company)],
        vec!["Lost".to_string(), count(|d| d.flags.lost)],
    ];
    to_csv(&["metric", "value"], rows)
}

pub fn managers_csv(zones: &[ManagerZone]) -> Result<Vec<u8>> {
    let rows = zones
        .iter()
        .map(|z| {
            vec![
                z.manager.clone(),
                z.deals.to_string(),
                format!("{:.2}", z.amount_sum),
                format!("{:.1}", z.health_avg),
                z.no_tasks.to_string(),
                z.stuck.to_string(),
                z.lost.to_string(),
                match z.zone {
                    Zone::Green => "green".to_string(),
                    Zone::Red => "red".to_string(),
                },
            ]
        })
        .collect();
    to_csv(
        &["manager", "deals", "amount_sum", "health_avg", "no_tasks", "stuck", "lost", "zone"],
        rows,
    )
}

pub fn deals_csv(deals: &[ScoredDeal]) -> Result<Vec<u8>> {
    let rows = deals
        .iter()
        .map(|d| {
            vec![
                d.id.to_string(),
                d.title.clone(),
                d.manager.clone(),
                d.funnel.clone(),
                d.stage_id.clone(),
                d.stage_name.clone(),
                format!("{:.2}", d.amount),
                format!("{}", d.probability),
                d.health.to_string(),
                d.potential.to_string(),
                d.days_in_work.to_string(),
                d.days_no_activity.to_string(),
                d.days_in_stage.to_string(),
                d.flags.no_tasks.to_string(),
                d.flags.no_contact.to_string(),
                d.flags.no_company.to_string(),
                d.flags.stuck.to_string(),
                d.flags.lost.to_string(),
                d.success.to_string(),
                d.failure.to_string(),
                ts(d.created_at),
                ts(d.modified_at),
                ts(d.last_activity_at),
            ]
        })
        .collect();
    to_csv(
        &[
            "id",
            "title",
            "manager",
            "funnel",
            "stage_id",
            "stage_name",
            "amount",
            "probability",
            "health",
            "potential",
            "days_in_work",
            "days_no_activity",
            "days_in_stage",
            "no_tasks",
            "no_contact",
            "no_company",
            "stuck",
            "lost",
            "success",
            "failure",
            "date_create",
            "date_modify",
            "last_activity_time",
        ],
        rows,
    )
}

pub fn render(doc: ReportDocument, deals: &[ScoredDeal], zones: &[ManagerZone]) -> Result<Vec<u8>> {
    match doc {
        ReportDocument::Summary => summary_csv(deals),
        ReportDocument::Managers => managers_csv(zones),
        ReportDocument::Deals => deals_csv(deals),
    }
}

/// Writes all three documents into `dir`, creating it when missing.
pub fn write_reports(dir: &Path, deals: &[ScoredDeal], zones: &[ManagerZone]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::IoError(format!("Failed to create export dir: {}", e)))?;
    let mut written = Vec::new();
    for doc in ReportDocument::ALL {
        let path = dir.join(doc.file_name());
        std::fs::write(&path, render(doc, deals, zones)?)
            .map_err(|e| AppError::IoError(format!("Failed to write {}: {}", path.display(), e)))?;
        written.push(path);
    }
    info!(dir = %dir.display(), files = written.len(), "Exported CSV reports");
    Ok(written)
}

/// All three documents packed into one deflated ZIP archive.
pub fn bundle_zip(deals: &[ScoredDeal], zones: &[ManagerZone]) -> Result<Vec<u8>> {
    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for doc in ReportDocument::ALL {
        archive.start_file(doc.file_name(), options)
            .map_err(|e| AppError::Internal(format!("Failed to start {}: {}", doc.file_name(), e)))?;
        archive.write_all(&render(doc, deals, zones)?)?;
    }
    let cursor = archive
        .finish()
        .map_err(|e| AppError::Internal(format!("Failed to finish archive: {}", e)))?;
    Ok(cursor.into_inner())
}
