use std::collections::HashSet;

use tracing::{info, warn};

use crate::allocation::{allocate_with, AllocationOptions};
use crate::types::{
    AllocatedCategory, CategoriesSnapshot, CategoryDefinition, CategoryPatch, NewCategory, Row,
    CATEGORY_ID_PREFIX,
};

/// CategoryStore owns one session's state:
/// - the row store from the last successful upload
/// - the ordered category definitions
/// - the allocation derived from both
///
/// Every mutation ends in a full re-allocation, so `allocated` always
/// matches the current rows and definitions.
#[derive(Default)]
pub struct CategoryStore {
    rows: Vec<Row>,
    columns: Vec<String>,
    definitions: Vec<CategoryDefinition>,
    allocated: Vec<AllocatedCategory>,
    options: AllocationOptions,
    /// Last id handed out; ids are never reused within a session.
    last_id: u64,
}

impl CategoryStore {
    pub fn new() -> Self {
        CategoryStore::default()
    }

    pub fn with_identity_column(column: Option<String>) -> Self {
        CategoryStore {
            options: AllocationOptions::with_identity_column(column),
            ..CategoryStore::default()
        }
    }

    /// Replace the row store wholesale. Categories survive an upload.
    pub fn replace_rows(&mut self, rows: Vec<Row>, columns: Vec<String>) -> &[AllocatedCategory] {
        info!(rows = rows.len(), columns = columns.len(), "row store replaced");
        self.rows = rows;
        self.columns = columns;
        self.reallocate()
    }

    pub fn add_category(&mut self, new: NewCategory) -> Result<AllocatedCategory, String> {
        let name = normalize_name(&new.name)?;
        self.last_id += 1;
        let id = format!("{CATEGORY_ID_PREFIX}-{}", self.last_id);
        let mut definition = CategoryDefinition {
            id: id.clone(),
            name,
            category_type: new.category_type,
            filters: new.filters,
            allow_repetition: new.allow_repetition,
            priority: self.definitions.len(),
            limit: new.limit,
        };
        normalize_definition(&mut definition);
        info!(id = %id, name = %definition.name, "category added");
        self.definitions.push(definition);
        self.reallocate();
        self.find_allocated(&id)
    }

    pub fn update_category(&mut self, id: &str, patch: CategoryPatch) -> Result<AllocatedCategory, String> {
        let index = self.index_of(id)?;
        let definition = &mut self.definitions[index];
        if let Some(name) = patch.name {
            definition.name = normalize_name(&name)?;
        }
        if let Some(category_type) = patch.category_type {
            definition.category_type = category_type;
        }
        if let Some(filters) = patch.filters {
            definition.filters = filters;
        }
        if let Some(allow_repetition) = patch.allow_repetition {
            definition.allow_repetition = allow_repetition;
        }
        if let Some(limit) = patch.limit {
            definition.limit = limit;
        }
        normalize_definition(definition);
        info!(id = %id, "category updated");
        self.reallocate();
        self.find_allocated(id)
    }

    pub fn delete_category(&mut self, id: &str) -> Result<(), String> {
        let index = self.index_of(id)?;
        let removed = self.definitions.remove(index);
        info!(id = %removed.id, name = %removed.name, "category deleted");
        self.renumber();
        self.reallocate();
        Ok(())
    }

    /// Put the categories in the order given. `order` must name every
    /// current category exactly once.
    pub fn reorder_categories(&mut self, order: &[String]) -> Result<&[AllocatedCategory], String> {
        if order.len() != self.definitions.len() {
            return Err(format!(
                "Reorder lists {} categories but {} exist.",
                order.len(),
                self.definitions.len()
            ));
        }
        let mut seen = HashSet::new();
        for id in order {
            if !seen.insert(id.as_str()) {
                return Err(format!("Category {id} appears more than once in the new order."));
            }
        }
        let mut reordered = Vec::with_capacity(order.len());
        for id in order {
            let index = self.index_of(id)?;
            reordered.push(self.definitions[index].clone());
        }
        self.definitions = reordered;
        self.renumber();
        info!(order = ?order, "categories reordered");
        Ok(self.reallocate())
    }

    /// Drag-and-drop helper: move the category at `from` to position `to`.
    pub fn move_category(&mut self, from: usize, to: usize) -> Result<&[AllocatedCategory], String> {
        let len = self.definitions.len();
        if from >= len || to >= len {
            return Err(format!("Cannot move category {from} to {to}; only {len} categories exist."));
        }
        let definition = self.definitions.remove(from);
        self.definitions.insert(to, definition);
        self.renumber();
        Ok(self.reallocate())
    }

    pub fn set_identity_column(&mut self, column: Option<String>) -> &[AllocatedCategory] {
        self.options = AllocationOptions::with_identity_column(column);
        if let Some(column) = self.options.identity_column.as_deref() {
            if !self.columns.is_empty() && !self.columns.iter().any(|c| c == column) {
                warn!(column, "identity column is not present in the uploaded sheet");
            }
        }
        self.reallocate()
    }

    pub fn snapshot(&self) -> CategoriesSnapshot {
        CategoriesSnapshot {
            columns: self.columns.clone(),
            row_count: self.rows.len(),
            identity_column: self.options.identity_column.clone(),
            categories: self.allocated.clone(),
        }
    }

    pub fn categories(&self) -> &[AllocatedCategory] {
        &self.allocated
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Start a fresh session. Ids keep counting so none is handed out twice.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.columns.clear();
        self.definitions.clear();
        self.allocated.clear();
    }

    fn reallocate(&mut self) -> &[AllocatedCategory] {
        self.allocated = allocate_with(&self.rows, &self.definitions, &self.options);
        &self.allocated
    }

    fn renumber(&mut self) {
        for (position, definition) in self.definitions.iter_mut().enumerate() {
            definition.priority = position;
        }
    }

    fn index_of(&self, id: &str) -> Result<usize, String> {
        self.definitions
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| format!("Category {id} not found"))
    }

    fn find_allocated(&self, id: &str) -> Result<AllocatedCategory, String> {
        self.allocated
            .iter()
            .find(|c| c.definition.id == id)
            .cloned()
            .ok_or_else(|| format!("Category {id} not found"))
    }
}

fn normalize_name(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("Category name cannot be empty.".to_string());
    }
    Ok(trimmed.to_string())
}

fn normalize_definition(definition: &mut CategoryDefinition) {
    if definition.category_type.is_open() {
        definition.filters.clear();
    } else if !definition.has_real_filters() {
        warn!(
            id = %definition.id,
            name = %definition.name,
            "category has no filter values; it will not receive players"
        );
    }
    for filter in &mut definition.filters {
        filter.filter_column = filter.filter_column.trim().to_string();
    }
}
