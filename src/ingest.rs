//! Spreadsheet upload adapter.
//!
//! Reads the first worksheet of an `.xlsx`/`.xls` upload into rows keyed by
//! the header row. Everything that can go wrong here is reported as an
//! [`IngestError`] and never reaches the allocation pass.

use std::{collections::HashSet, io::Cursor, path::Path};

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::{CellValue, Row, MAX_UPLOAD_BYTES, MIN_SHEET_ROWS};

const ACCEPTED_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("Unsupported file type for {0}; upload an .xlsx or .xls spreadsheet.")]
    UnsupportedExtension(String),
    #[error("File is {size} bytes; uploads are limited to {limit} bytes.")]
    TooLarge { size: usize, limit: usize },
    #[error("Could not read spreadsheet: {0}")]
    Unreadable(String),
    #[error("Spreadsheet contains no worksheets.")]
    NoWorksheet,
    #[error("Spreadsheet needs a header row and at least one data row.")]
    TooFewRows,
    #[error("Spreadsheet has a header row but every data row is empty.")]
    EmptyDataset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSheet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

pub fn is_spreadsheet_name(file_name: &str) -> bool {
    Path::new(file_name.trim())
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ACCEPTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

pub fn parse_spreadsheet(file_name: &str, bytes: &[u8]) -> Result<ParsedSheet, IngestError> {
    if !is_spreadsheet_name(file_name) {
        return Err(IngestError::UnsupportedExtension(file_name.trim().to_string()));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(IngestError::TooLarge {
            size: bytes.len(),
            limit: MAX_UPLOAD_BYTES,
        });
    }

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| IngestError::Unreadable(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(IngestError::NoWorksheet)?
        .map_err(|e| IngestError::Unreadable(e.to_string()))?;

    let sheet = sheet_from_rows(range.rows())?;
    info!(
        file = file_name,
        columns = sheet.columns.len(),
        rows = sheet.rows.len(),
        "spreadsheet parsed"
    );
    Ok(sheet)
}

/// Header row first, then one row per non-empty line. Short lines are padded
/// with empty text.
pub fn sheet_from_rows<'a, I>(lines: I) -> Result<ParsedSheet, IngestError>
where
    I: IntoIterator<Item = &'a [Data]>,
{
    let lines: Vec<&[Data]> = lines.into_iter().collect();
    if lines.len() < MIN_SHEET_ROWS {
        return Err(IngestError::TooFewRows);
    }

    let columns = header_names(lines[0]);
    let mut rows = Vec::new();
    for (line_no, line) in lines.iter().enumerate().skip(1) {
        if line.iter().all(is_empty_cell) {
            debug!(line = line_no + 1, "skipping empty spreadsheet row");
            continue;
        }
        let row: Row = columns
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let value = line.get(index).map(cell_value).unwrap_or_else(CellValue::empty);
                (column.clone(), value)
            })
            .collect();
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(IngestError::EmptyDataset);
    }
    Ok(ParsedSheet { columns, rows })
}

fn header_names(line: &[Data]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(line.len());
    for (index, cell) in line.iter().enumerate() {
        let raw = cell_value(cell).to_string();
        let base = match raw.trim() {
            "" => format!("Column {}", index + 1),
            trimmed => trimmed.to_string(),
        };
        let mut name = base.clone();
        let mut suffix = 2;
        while !seen.insert(name.clone()) {
            name = format!("{base} ({suffix})");
            suffix += 1;
        }
        out.push(name);
    }
    out
}

fn is_empty_cell(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

pub fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Int(n) => CellValue::from(*n),
        Data::Float(n) => CellValue::Number(*n),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => CellValue::Text(text.clone()),
        Data::Bool(flag) => CellValue::Text(flag.to_string()),
        Data::Error(_) | Data::Empty => CellValue::empty(),
    }
}
