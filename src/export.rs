use std::collections::HashSet;

use chrono::Local;
use rust_xlsxwriter::Workbook;
use tracing::info;

use crate::types::{AllocatedCategory, CellValue};

const SHEET_NAME_MAX_CHARS: usize = 31;
const SHEET_NAME_FORBIDDEN: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// Write one worksheet per category, header row first, players below in
/// allocation order.
pub fn export_categories_xlsx(columns: &[String], categories: &[AllocatedCategory]) -> Result<Vec<u8>, String> {
    let mut workbook = Workbook::new();
    let mut used_names: HashSet<String> = HashSet::new();

    if categories.is_empty() {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Categories").map_err(|e| e.to_string())?;
        for (col, column) in columns.iter().enumerate() {
            worksheet.write_string(0, col as u16, column).map_err(|e| e.to_string())?;
        }
    }

    for category in categories {
        let sheet_name = unique_sheet_name(&category.definition.name, &mut used_names);
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet_name).map_err(|e| e.to_string())?;
        for (col, column) in columns.iter().enumerate() {
            worksheet.write_string(0, col as u16, column).map_err(|e| e.to_string())?;
        }
        for (i, player) in category.players.iter().enumerate() {
            let row = (i + 1) as u32;
            for (col, column) in columns.iter().enumerate() {
                match player.get(column) {
                    Some(CellValue::Number(n)) => {
                        worksheet.write_number(row, col as u16, *n).map_err(|e| e.to_string())?;
                    }
                    Some(CellValue::Text(text)) if !text.is_empty() => {
                        worksheet.write_string(row, col as u16, text).map_err(|e| e.to_string())?;
                    }
                    _ => {}
                }
            }
        }
    }

    let bytes = workbook.save_to_buffer().map_err(|e| e.to_string())?;
    info!(categories = categories.len(), bytes = bytes.len(), "categories exported");
    Ok(bytes)
}

pub fn export_file_name() -> String {
    format!("categories_{}.xlsx", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Excel sheet names: at most 31 chars, none of `[]:*?/\`, no leading or
/// trailing apostrophe, unique ignoring case.
pub fn unique_sheet_name(raw: &str, used: &mut HashSet<String>) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if SHEET_NAME_FORBIDDEN.contains(&c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches('\'').trim();
    let base: String = if cleaned.is_empty() {
        "Category".to_string()
    } else {
        cleaned.chars().take(SHEET_NAME_MAX_CHARS).collect()
    };

    let mut name = base.clone();
    let mut suffix = 2;
    while used.contains(&name.to_lowercase()) || name.eq_ignore_ascii_case("history") {
        let tail = format!(" ({suffix})");
        let keep = SHEET_NAME_MAX_CHARS.saturating_sub(tail.chars().count());
        name = format!("{}{tail}", base.chars().take(keep).collect::<String>());
        suffix += 1;
    }
    used.insert(name.to_lowercase());
    name
}
