//! Category Registry - Load category definitions from JSON
//!
//! This module loads all resource category definitions from embedded JSON
//! files and provides lookup functions for the rest of the crate.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Embedded category JSON files (compiled into the binary)
const CATEGORY_FILES: &[&str] = &[
    include_str!("../categories/core.json"),
    include_str!("../categories/network.json"),
    include_str!("../categories/platform.json"),
];

/// Attribute extracted from each listed item
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeDef {
    pub key: String,
    pub json_path: String,
}

/// Category definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryDef {
    pub display_name: String,
    /// Service host label substituted into the endpoint template
    pub service: String,
    /// List path, e.g. `/20160918/instances`
    pub path: String,
    pub id_field: String,
    pub name_field: String,
    /// The listing requires an `availabilityDomain` parameter
    #[serde(default)]
    pub per_availability_domain: bool,
    /// Lifecycle states whose items are dropped (e.g. TERMINATED)
    #[serde(default)]
    pub skip_states: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
}

/// Root structure of categories/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryConfig {
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryDef>,
}

/// Registry loaded from the embedded JSON; immutable once built
static REGISTRY: OnceLock<CategoryConfig> = OnceLock::new();

/// Get the category registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static CategoryConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = CategoryConfig {
            categories: BTreeMap::new(),
        };

        for content in CATEGORY_FILES {
            let partial: CategoryConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded category JSON: {}", e));
            final_config.categories.extend(partial.categories);
        }

        final_config
    })
}

/// Get a category definition by tag
pub fn get_category(tag: &str) -> Option<&'static CategoryDef> {
    get_registry().categories.get(&normalize_tag(tag))
}

/// Get all category tags, sorted
pub fn get_all_category_tags() -> Vec<&'static str> {
    get_registry()
        .categories
        .keys()
        .map(|s| s.as_str())
        .collect()
}

/// Normalize a user-supplied category tag: `Boot_Volumes ` -> `boot-volumes`
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase().replace('_', "-")
}
