use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex},
};

use crate::categories::CategoryStore;

// ── Constants ──────────────────────────────────────────────────────────

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const MIN_SHEET_ROWS: usize = 2;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:17880";
pub const DEFAULT_STATIC_DIR: &str = "web";
pub const CATEGORY_ID_PREFIX: &str = "category";
/// Headroom over the upload ceiling so oversized files still reach the
/// ingest check and get a readable error.
pub const UPLOAD_BODY_SLACK: usize = 64 * 1024;

// ── Shared state type aliases ──────────────────────────────────────────

pub type SharedCategoryStore = Arc<Mutex<CategoryStore>>;

#[derive(Clone)]
pub struct ServerState {
    pub store: SharedCategoryStore,
}

// ── Row store types ────────────────────────────────────────────────────

/// A single spreadsheet cell. Numbers stay numbers so `greater`/`less`
/// filters can compare them without re-parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn empty() -> Self {
        CellValue::Text(String::new())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Number(_) => false,
            CellValue::Text(text) => text.trim().is_empty(),
        }
    }

    /// Numeric coercion. Blank or unparseable text is not a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Number(_) => None,
            CellValue::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
            }
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

/// One tournament row keyed by header name.
pub type Row = BTreeMap<String, CellValue>;

// ── Category definition types ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Equal,
    Greater,
    Less,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub filter_column: String,
    pub filter_type: FilterType,
    #[serde(default)]
    pub filter_value: Option<CellValue>,
}

impl Filter {
    pub fn new(column: &str, filter_type: FilterType, value: impl Into<CellValue>) -> Self {
        Filter {
            filter_column: column.to_string(),
            filter_type,
            filter_value: Some(value.into()),
        }
    }

    /// A filter with no value never excludes and never matches on its own.
    pub fn is_wildcard(&self) -> bool {
        self.filter_value.as_ref().map_or(true, CellValue::is_blank)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryType {
    Open,
    #[serde(rename = "U18 Boy")]
    U18Boy,
    #[serde(rename = "U18 Girl")]
    U18Girl,
    Custom,
}

impl CategoryType {
    pub fn is_open(self) -> bool {
        self == CategoryType::Open
    }
}

/// The authoritative part of a category. Player assignments are never
/// stored here; they come out of the allocation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub category_type: CategoryType,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub allow_repetition: bool,
    #[serde(default)]
    pub priority: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl CategoryDefinition {
    /// `Some(0)` is treated the same as no limit.
    pub fn effective_limit(&self) -> Option<usize> {
        self.limit.filter(|limit| *limit > 0)
    }

    pub fn has_real_filters(&self) -> bool {
        self.filters.iter().any(|filter| !filter.is_wildcard())
    }
}

/// Read-only view produced by the allocation engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocatedCategory {
    #[serde(flatten)]
    pub definition: CategoryDefinition,
    pub players: Vec<Row>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    #[serde(rename = "type")]
    pub category_type: CategoryType,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub allow_repetition: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub category_type: Option<CategoryType>,
    pub filters: Option<Vec<Filter>>,
    pub allow_repetition: Option<bool>,
    /// Absent leaves the limit alone, `null` clears it.
    #[serde(default, deserialize_with = "double_option")]
    pub limit: Option<Option<usize>>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ── Command payloads ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoriesSnapshot {
    pub columns: Vec<String>,
    pub row_count: usize,
    pub identity_column: Option<String>,
    pub categories: Vec<AllocatedCategory>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub file_name: String,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub categories: Vec<AllocatedCategory>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    pub order: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQuery {
    pub file_name: String,
}

// ── Config types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub static_dir: String,
    /// Column that identifies a player for repetition checks. Empty means
    /// the whole row is the identity.
    pub identity_column: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            static_dir: DEFAULT_STATIC_DIR.to_string(),
            identity_column: String::new(),
        }
    }
}

impl AppConfig {
    pub fn identity_column(&self) -> Option<String> {
        let trimmed = self.identity_column.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_definition_reads_camel_case_json() {
        let raw = r#"{
            "id": "category-1",
            "name": "Junior girls",
            "type": "U18 Girl",
            "filters": [
                { "filterColumn": "Age", "filterType": "less", "filterValue": 18 },
                { "filterColumn": "Gender", "filterType": "equal", "filterValue": "F" }
            ],
            "allowRepetition": false,
            "priority": 2,
            "limit": 3
        }"#;
        let def: CategoryDefinition = serde_json::from_str(raw).unwrap();
        assert_eq!(def.category_type, CategoryType::U18Girl);
        assert_eq!(def.filters[0].filter_type, FilterType::Less);
        assert_eq!(def.filters[0].filter_value, Some(CellValue::Number(18.0)));
        assert_eq!(def.filters[1].filter_value, Some(CellValue::from("F")));
        assert_eq!(def.effective_limit(), Some(3));
    }

    #[test]
    fn missing_or_blank_filter_value_is_wildcard() {
        let raw = r#"{ "filterColumn": "Club", "filterType": "contains" }"#;
        let filter: Filter = serde_json::from_str(raw).unwrap();
        assert!(filter.is_wildcard());

        let blank = Filter::new("Club", FilterType::Contains, "  ");
        assert!(blank.is_wildcard());

        let zero = Filter::new("Score", FilterType::Greater, 0.0);
        assert!(!zero.is_wildcard());
    }

    #[test]
    fn patch_distinguishes_absent_and_null_limit() {
        let absent: CategoryPatch = serde_json::from_str(r#"{ "name": "X" }"#).unwrap();
        assert_eq!(absent.limit, None);

        let cleared: CategoryPatch = serde_json::from_str(r#"{ "limit": null }"#).unwrap();
        assert_eq!(cleared.limit, Some(None));

        let set: CategoryPatch = serde_json::from_str(r#"{ "limit": 4 }"#).unwrap();
        assert_eq!(set.limit, Some(Some(4)));
    }

    #[test]
    fn cell_value_coercion() {
        assert_eq!(CellValue::from(" 17 ").as_number(), Some(17.0));
        assert_eq!(CellValue::from("").as_number(), None);
        assert_eq!(CellValue::from("abc").as_number(), None);
        assert_eq!(CellValue::from("NaN").as_number(), None);
        assert_eq!(CellValue::Number(12.5).to_string(), "12.5");
        assert_eq!(CellValue::Number(17.0).to_string(), "17");
    }

    #[test]
    fn allocated_category_flattens_definition() {
        let allocated = AllocatedCategory {
            definition: CategoryDefinition {
                id: "category-1".into(),
                name: "Open".into(),
                category_type: CategoryType::Open,
                filters: vec![],
                allow_repetition: true,
                priority: 0,
                limit: None,
            },
            players: vec![],
        };
        let value = serde_json::to_value(&allocated).unwrap();
        assert_eq!(value["type"], "Open");
        assert_eq!(value["allowRepetition"], true);
        assert!(value["players"].as_array().unwrap().is_empty());
    }
}
