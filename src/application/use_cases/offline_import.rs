//! Offline deal tables (CSV or XLSX) used when no webhook is configured.

use crate::domain::deal::{parse_int, RawDeal};
use crate::domain::error::{AppError, Result};
use calamine::{Data, Reader, Xlsx};
use chrono::{Duration, NaiveDate};
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use tracing::{debug, info};

pub const REQUIRED_COLUMNS: [&str; 11] = [
    "ID",
    "TITLE",
    "STAGE_ID",
    "OPPORTUNITY",
    "ASSIGNED_BY_ID",
    "COMPANY_ID",
    "CONTACT_ID",
    "PROBABILITY",
    "DATE_CREATE",
    "DATE_MODIFY",
    "LAST_ACTIVITY_TIME",
];

pub const MANAGER_COLUMN: &str = "manager";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    Csv,
    Xlsx,
}

#[derive(Debug, Clone, Default)]
pub struct OfflineDataset {
    pub deals: Vec<RawDeal>,
    /// Manager id -> display name; ids without a `manager` column are named by id.
    pub managers: HashMap<i64, String>,
}

/// Plain table: trimmed header row plus string cells.
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

pub fn import_bytes(bytes: &[u8], format: TableFormat) -> Result<OfflineDataset> {
    let table = match format {
        TableFormat::Csv => read_csv(&decode_text(bytes))?,
        TableFormat::Xlsx => read_xlsx(bytes)?,
    };
    let dataset = to_dataset(table)?;
    info!(
        deals = dataset.deals.len(),
        managers = dataset.managers.len(),
        "Imported offline deal table"
    );
    Ok(dataset)
}

/// UTF-8 (with or without BOM) when valid, Windows-1251 otherwise.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some(stripped) = bytes.strip_prefix(b"\xEF\xBB\xBF") {
        return String::from_utf8_lossy(stripped).into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            debug!("Offline CSV is not UTF-8, decoding as Windows-1251");
            let (text, _, _) = encoding_rs::WINDOWS_1251.decode(bytes);
            text.into_owned()
        }
    }
}

/// Picks the most consistent delimiter among comma, semicolon, tab and pipe.
pub fn detect_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content.lines().take(10).collect();
    if sample.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0.0f32;
    for delimiter in [b',', b';', b'\t', b'|'] {
        let counts: Vec<f32> = sample
            .iter()
            .map(|line| line.bytes().filter(|b| *b == delimiter).count() as f32)
            .collect();
        let avg = counts.iter().sum::<f32>() / counts.len() as f32;
        let variance = counts.iter().map(|c| (c - avg).powi(2)).sum::<f32>() / counts.len() as f32;
        let score = avg / (1.0 + variance.sqrt());
        if score > best_score {
            best_score = score;
            best = delimiter;
        }
    }
    best
}

fn read_csv(content: &str) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .delimiter(detect_delimiter(content))
        .trim(Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AppError::ValidationError(format!("Failed to read CSV headers: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| AppError::ValidationError(format!("Failed to parse CSV row {}: {}", index + 1, e)))?;
        rows.push(record.iter().map(|v| v.to_string()).collect());
    }
    Ok(Table { headers, rows })
}

fn read_xlsx(bytes: &[u8]) -> Result<Table> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))
        .map_err(|e| AppError::ValidationError(format!("Failed to open Excel file: {}", e)))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::ValidationError("No worksheet found".to_string()))?
        .map_err(|e| AppError::ValidationError(format!("Failed to read Excel range: {}", e)))?;

    let mut rows = range.rows().map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    let headers = rows
        .next()
        .ok_or_else(|| AppError::ValidationError("Worksheet is empty".to_string()))?
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    Ok(Table { headers, rows: rows.collect() })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::DateTime(dt) => excel_serial_to_text(dt.as_f64()),
        other => other.to_string(),
    }
}

/// Excel serial day numbers count from 1899-12-30.
fn excel_serial_to_text(serial: f64) -> String {
    let Some(base) = NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0)) else {
        return String::new();
    };
    let seconds = (serial * 86_400.0).round() as i64;
    (base + Duration::seconds(seconds))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn to_dataset(table: Table) -> Result<OfflineDataset> {
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !table.headers.iter().any(|h| h == col))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::ValidationError(format!(
            "Missing columns: {}",
            missing.join(", ")
        )));
    }

    let index: HashMap<&str, usize> = table
        .headers
        .iter()
        .enumerate()
        .map(|(idx, h)| (h.as_str(), idx))
        .collect();

    let mut dataset = OfflineDataset::default();
    for row in &table.rows {
        let get = |column: &str| -> Option<String> {
            index
                .get(column)
                .and_then(|idx| row.get(*idx))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
        };

        let deal = RawDeal {
            id: get("ID"),
            title: get("TITLE"),
            stage_id: get("STAGE_ID"),
            opportunity: get("OPPORTUNITY"),
            assigned_by_id: get("ASSIGNED_BY_ID"),
            company_id: get("COMPANY_ID"),
            contact_id: get("CONTACT_ID"),
            probability: get("PROBABILITY"),
            date_create: get("DATE_CREATE"),
            date_modify: get("DATE_MODIFY"),
            last_activity_time: get("LAST_ACTIVITY_TIME"),
            category_id: get("CATEGORY_ID"),
            begindate: get("BEGINDATE"),
            closedate: get("CLOSEDATE"),
            closed: get("CLOSED"),
        };

        let manager_id = parse_int(deal.assigned_by_id.as_deref()).unwrap_or(0);
        match get(MANAGER_COLUMN) {
            Some(name) => {
                dataset.managers.insert(manager_id, name);
            }
            None => {
                dataset
                    .managers
                    .entry(manager_id)
                    .or_insert_with(|| manager_id.to_string());
            }
        }
        dataset.deals.push(deal);
    }
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "ID,TITLE,STAGE_ID,OPPORTUNITY,ASSIGNED_BY_ID,COMPANY_ID,CONTACT_ID,PROBABILITY,DATE_CREATE,DATE_MODIFY,LAST_ACTIVITY_TIME";

    #[test]
    fn test_import_csv_with_bom_and_manager_column() {
        let content = format!(
            "\u{FEFF}{},manager\n1,Boiler,NEW,1500,7,3,,50,2025-01-10,2025-01-12,,Anna\n2,Pump,WON,200,8,,,100,2025-01-11,,,\n",
            HEADER
        );
        let dataset = import_bytes(content.as_bytes(), TableFormat::Csv).unwrap();
        assert_eq!(dataset.deals.len(), 2);
        assert_eq!(dataset.deals[0].title.as_deref(), Some("Boiler"));
        assert_eq!(dataset.deals[0].amount(), 1500.0);
        assert!(dataset.deals[0].contact_id.is_none());
        assert_eq!(dataset.managers.get(&7).map(String::as_str), Some("Anna"));
        assert_eq!(dataset.managers.get(&8).map(String::as_str), Some("8"));
    }

    #[test]
    fn test_import_semicolon_windows_1251() {
        let text = format!(
            "{}\n5;Котёл;NEW;10;1;;;0;2025-02-01;;\n",
            HEADER.replace(',', ";")
        );
        let (encoded, _, _) = encoding_rs::WINDOWS_1251.encode(&text);
        let dataset = import_bytes(&encoded, TableFormat::Csv).unwrap();
        assert_eq!(dataset.deals[0].title.as_deref(), Some("Котёл"));
        assert_eq!(dataset.deals[0].deal_id(), Some(5));
    }

    #[test]
    fn test_missing_columns_are_named() {
        let err = import_bytes(b"ID,TITLE\n1,x\n", TableFormat::Csv).unwrap_err();
        match err {
            AppError::ValidationError(msg) => {
                assert!(msg.contains("STAGE_ID"));
                assert!(msg.contains("LAST_ACTIVITY_TIME"));
                assert!(!msg.contains("TITLE,"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), b';');
        assert_eq!(detect_delimiter("a\tb\n1\t2"), b'\t');
        assert_eq!(detect_delimiter("a,b\n1,2"), b',');
    }

    #[test]
    fn test_excel_serial_conversion() {
        assert_eq!(excel_serial_to_text(45658.5), "2025-01-01 12:00:00");
    }

    #[test]
    fn test_unreadable_upload_is_rejected_as_invalid_input() {
        assert!(matches!(
            import_bytes(b"not a zip", TableFormat::Xlsx),
            Err(AppError::ValidationError(_))
        ));
    }
}
