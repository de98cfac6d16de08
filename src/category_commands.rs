use tracing::warn;

use crate::config::{load_config_inner, save_config_inner};
use crate::export::export_categories_xlsx;
use crate::ingest::parse_spreadsheet;
use crate::types::{
    AllocatedCategory, AppConfig, CategoriesSnapshot, CategoryPatch, NewCategory, SharedCategoryStore,
    UploadSummary,
};

/// Current columns, row count and allocated categories
pub fn get_categories_state(store: &SharedCategoryStore) -> Result<CategoriesSnapshot, String> {
    let guard = store.lock().map_err(|e| e.to_string())?;
    Ok(guard.snapshot())
}

/// Parse an uploaded workbook and replace the row store with it.
/// A failed upload leaves the previous rows in place.
pub fn upload_spreadsheet(
    file_name: &str,
    bytes: &[u8],
    store: &SharedCategoryStore,
) -> Result<UploadSummary, String> {
    let sheet = parse_spreadsheet(file_name, bytes).map_err(|e| {
        warn!(file = file_name, error = %e, "upload rejected");
        e.to_string()
    })?;

    let mut guard = store.lock().map_err(|e| e.to_string())?;
    let row_count = sheet.rows.len();
    let columns = sheet.columns.clone();
    let categories = guard.replace_rows(sheet.rows, sheet.columns).to_vec();
    Ok(UploadSummary {
        file_name: file_name.trim().to_string(),
        columns,
        row_count,
        categories,
    })
}

/// Add a category and return the re-allocated list
pub fn add_category(new: NewCategory, store: &SharedCategoryStore) -> Result<Vec<AllocatedCategory>, String> {
    let mut guard = store.lock().map_err(|e| e.to_string())?;
    guard.add_category(new)?;
    Ok(guard.categories().to_vec())
}

pub fn update_category(
    id: &str,
    patch: CategoryPatch,
    store: &SharedCategoryStore,
) -> Result<Vec<AllocatedCategory>, String> {
    let mut guard = store.lock().map_err(|e| e.to_string())?;
    guard.update_category(id, patch)?;
    Ok(guard.categories().to_vec())
}

pub fn delete_category(id: &str, store: &SharedCategoryStore) -> Result<Vec<AllocatedCategory>, String> {
    let mut guard = store.lock().map_err(|e| e.to_string())?;
    guard.delete_category(id)?;
    Ok(guard.categories().to_vec())
}

/// Apply a full new order given as category ids
pub fn reorder_categories(
    order: &[String],
    store: &SharedCategoryStore,
) -> Result<Vec<AllocatedCategory>, String> {
    let mut guard = store.lock().map_err(|e| e.to_string())?;
    Ok(guard.reorder_categories(order)?.to_vec())
}

pub fn move_category(from: usize, to: usize, store: &SharedCategoryStore) -> Result<Vec<AllocatedCategory>, String> {
    let mut guard = store.lock().map_err(|e| e.to_string())?;
    Ok(guard.move_category(from, to)?.to_vec())
}

/// Workbook bytes with one sheet per category
pub fn export_categories(store: &SharedCategoryStore) -> Result<Vec<u8>, String> {
    let (columns, categories) = {
        let guard = store.lock().map_err(|e| e.to_string())?;
        (guard.columns().to_vec(), guard.categories().to_vec())
    };
    export_categories_xlsx(&columns, &categories)
}

/// Drop rows and categories
pub fn reset_session(store: &SharedCategoryStore) -> Result<CategoriesSnapshot, String> {
    let mut guard = store.lock().map_err(|e| e.to_string())?;
    guard.clear();
    Ok(guard.snapshot())
}

pub fn load_config() -> Result<AppConfig, String> {
    load_config_inner()
}

/// Persist config and apply the identity column to the live store
pub fn save_config(config: AppConfig, store: &SharedCategoryStore) -> Result<AppConfig, String> {
    let saved = save_config_inner(config)?;
    apply_config(&saved, store)?;
    Ok(saved)
}

pub fn apply_config(config: &AppConfig, store: &SharedCategoryStore) -> Result<(), String> {
    let mut guard = store.lock().map_err(|e| e.to_string())?;
    guard.set_identity_column(config.identity_column());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::CategoryStore;
    use crate::types::{CategoryType, CellValue, Filter, FilterType};
    use rust_xlsxwriter::Workbook;
    use std::sync::{Arc, Mutex};

    fn shared() -> SharedCategoryStore {
        Arc::new(Mutex::new(CategoryStore::new()))
    }

    fn standings_xlsx() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.write_string(0, 0, "Name").unwrap();
        worksheet.write_string(0, 1, "Age").unwrap();
        worksheet.write_string(0, 2, "Gender").unwrap();
        let players = [("Ana", 15.0, "F"), ("Ben", 16.0, "M"), ("Cleo", 22.0, "F")];
        for (i, (name, age, gender)) in players.iter().enumerate() {
            let row = (i + 1) as u32;
            worksheet.write_string(row, 0, *name).unwrap();
            worksheet.write_number(row, 1, *age).unwrap();
            worksheet.write_string(row, 2, *gender).unwrap();
        }
        workbook.save_to_buffer().unwrap()
    }

    fn new_category(name: &str, category_type: CategoryType, filters: Vec<Filter>) -> NewCategory {
        NewCategory {
            name: name.to_string(),
            category_type,
            filters,
            allow_repetition: false,
            limit: None,
        }
    }

    #[test]
    fn upload_then_categorize_then_reorder() {
        let store = shared();
        let summary = upload_spreadsheet("standings.xlsx", &standings_xlsx(), &store).unwrap();
        assert_eq!(summary.row_count, 3);
        assert_eq!(summary.columns, vec!["Name", "Age", "Gender"]);

        add_category(
            new_category("Juniors", CategoryType::Custom, vec![Filter::new("Age", FilterType::Less, 18.0)]),
            &store,
        )
        .unwrap();
        let categories = add_category(
            new_category("Girls", CategoryType::U18Girl, vec![Filter::new("Gender", FilterType::Equal, "f")]),
            &store,
        )
        .unwrap();
        assert_eq!(categories[0].players.len(), 2);
        assert_eq!(categories[1].players.len(), 1);

        let order: Vec<String> = categories.iter().rev().map(|c| c.definition.id.clone()).collect();
        let reordered = reorder_categories(&order, &store).unwrap();
        assert_eq!(reordered[0].definition.name, "Girls");
        assert_eq!(reordered[0].players.len(), 2);
        assert_eq!(reordered[1].players.len(), 1);
        assert_eq!(reordered[1].players[0]["Name"], CellValue::from("Ben"));

        let snapshot = get_categories_state(&store).unwrap();
        assert_eq!(snapshot.categories, reordered);
    }

    #[test]
    fn failed_upload_keeps_previous_rows() {
        let store = shared();
        upload_spreadsheet("standings.xlsx", &standings_xlsx(), &store).unwrap();
        let err = upload_spreadsheet("notes.txt", b"hello", &store).unwrap_err();
        assert!(err.contains("notes.txt"));
        assert_eq!(get_categories_state(&store).unwrap().row_count, 3);
    }

    #[test]
    fn update_and_delete_return_reallocated_lists() {
        let store = shared();
        upload_spreadsheet("standings.xlsx", &standings_xlsx(), &store).unwrap();
        let added = add_category(new_category("Open", CategoryType::Open, vec![]), &store).unwrap();
        let id = added[0].definition.id.clone();

        let patch = CategoryPatch {
            limit: Some(Some(1)),
            ..CategoryPatch::default()
        };
        let updated = update_category(&id, patch, &store).unwrap();
        assert_eq!(updated[0].players.len(), 1);

        let remaining = delete_category(&id, &store).unwrap();
        assert!(remaining.is_empty());
        assert!(delete_category(&id, &store).is_err());
    }

    #[test]
    fn move_and_export() {
        let store = shared();
        upload_spreadsheet("standings.xlsx", &standings_xlsx(), &store).unwrap();
        add_category(new_category("First", CategoryType::Open, vec![]), &store).unwrap();
        add_category(
            new_category("Second", CategoryType::Custom, vec![Filter::new("Name", FilterType::Contains, "e")]),
            &store,
        )
        .unwrap();
        let moved = move_category(1, 0, &store).unwrap();
        assert_eq!(moved[0].definition.name, "Second");
        assert_eq!(moved[0].players.len(), 2);
        assert_eq!(moved[1].players.len(), 1);

        let bytes = export_categories(&store).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn apply_config_sets_identity_column() {
        let store = shared();
        let config = AppConfig {
            identity_column: "Name".into(),
            ..AppConfig::default()
        };
        apply_config(&config, &store).unwrap();
        assert_eq!(get_categories_state(&store).unwrap().identity_column.as_deref(), Some("Name"));
    }

    #[test]
    fn reset_clears_everything() {
        let store = shared();
        upload_spreadsheet("standings.xlsx", &standings_xlsx(), &store).unwrap();
        add_category(new_category("Open", CategoryType::Open, vec![]), &store).unwrap();
        let snapshot = reset_session(&store).unwrap();
        assert_eq!(snapshot.row_count, 0);
        assert!(snapshot.categories.is_empty());
    }
}
