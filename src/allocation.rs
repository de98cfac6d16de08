//! Category allocation.
//!
//! Categories are processed in list order. Each one picks its players from
//! the row store, and categories that do not allow repetition claim the
//! players they pick so that later categories cannot take them again. The
//! claimed set lives for exactly one call of [`allocate_with`].

use std::collections::HashSet;

use tracing::debug;

use crate::types::{AllocatedCategory, CategoryDefinition, CellValue, Filter, FilterType, Row};

/// Knobs for one allocation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationOptions {
    /// When set, a player is identified by this column alone instead of by
    /// every value in the row.
    pub identity_column: Option<String>,
}

impl AllocationOptions {
    pub fn with_identity_column(column: Option<String>) -> Self {
        AllocationOptions {
            identity_column: column.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        }
    }
}

/// Allocate with full-row player identity.
pub fn allocate(rows: &[Row], categories: &[CategoryDefinition]) -> Vec<AllocatedCategory> {
    allocate_with(rows, categories, &AllocationOptions::default())
}

pub fn allocate_with(
    rows: &[Row],
    categories: &[CategoryDefinition],
    options: &AllocationOptions,
) -> Vec<AllocatedCategory> {
    let fingerprints: Vec<String> = rows
        .iter()
        .map(|row| player_key(row, options))
        .collect();
    let mut used: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(categories.len());

    for category in categories {
        let selected = if category.category_type.is_open() {
            select_open(category, &fingerprints, &used)
        } else {
            select_filtered(category, rows, &fingerprints, &used)
        };

        if !category.allow_repetition {
            for &index in &selected {
                used.insert(fingerprints[index].as_str());
            }
        }

        debug!(
            category = %category.name,
            priority = category.priority,
            players = selected.len(),
            claimed = used.len(),
            "allocated category"
        );

        out.push(AllocatedCategory {
            definition: category.clone(),
            players: selected.into_iter().map(|index| rows[index].clone()).collect(),
        });
    }

    out
}

/// Open categories ignore filters and take from whatever is still free.
fn select_open(category: &CategoryDefinition, fingerprints: &[String], used: &HashSet<&str>) -> Vec<usize> {
    let remaining = (0..fingerprints.len())
        .filter(|&index| category.allow_repetition || !used.contains(fingerprints[index].as_str()));
    match category.effective_limit() {
        Some(limit) => remaining.take(limit).collect(),
        None => remaining.collect(),
    }
}

fn select_filtered(
    category: &CategoryDefinition,
    rows: &[Row],
    fingerprints: &[String],
    used: &HashSet<&str>,
) -> Vec<usize> {
    if !category.has_real_filters() {
        debug!(category = %category.name, "category has no usable filters; no players will match");
        return Vec::new();
    }

    let matching = (0..rows.len()).filter(|&index| row_matches_any(&rows[index], &category.filters));

    // Repeating filtered categories keep every match; the limit is not
    // applied on this path.
    if category.allow_repetition {
        return matching.collect();
    }

    let free = matching.filter(|&index| !used.contains(fingerprints[index].as_str()));
    match category.effective_limit() {
        Some(limit) => free.take(limit).collect(),
        None => free.collect(),
    }
}

/// OR across filters; wildcard filters never fire.
pub fn row_matches_any(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().any(|filter| filter_matches(row, filter))
}

pub fn filter_matches(row: &Row, filter: &Filter) -> bool {
    let expected = match filter.filter_value.as_ref() {
        Some(value) if !value.is_blank() => value,
        _ => return false,
    };
    let empty = CellValue::empty();
    let actual = row.get(&filter.filter_column).unwrap_or(&empty);

    match filter.filter_type {
        FilterType::Equal => actual.to_string().to_lowercase() == expected.to_string().to_lowercase(),
        FilterType::Contains => actual
            .to_string()
            .to_lowercase()
            .contains(&expected.to_string().to_lowercase()),
        FilterType::Greater => compare_numbers(actual, expected, |a, b| a > b),
        FilterType::Less => compare_numbers(actual, expected, |a, b| a < b),
    }
}

fn compare_numbers(actual: &CellValue, expected: &CellValue, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.as_number(), expected.as_number()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// Canonical serialization of every column/value pair. Rows with identical
/// values everywhere are the same player.
pub fn row_fingerprint(row: &Row) -> String {
    let mut out = String::new();
    for (column, value) in row {
        let tagged = match value {
            CellValue::Number(n) => format!("n:{n}"),
            CellValue::Text(text) => format!("s:{text:?}"),
        };
        out.push_str(&format!("{column:?}={tagged};"));
    }
    out
}

fn player_key(row: &Row, options: &AllocationOptions) -> String {
    if let Some(column) = options.identity_column.as_deref() {
        if let Some(value) = row.get(column).filter(|value| !value.is_blank()) {
            return format!("id:{}", value.to_string().trim().to_lowercase());
        }
    }
    row_fingerprint(row)
}
