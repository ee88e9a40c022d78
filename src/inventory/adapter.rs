//! Category adapters
//!
//! A [`CategoryAdapter`] lists one resource category in one compartment.
//! [`RestCategoryAdapter`] implements it for every category defined in the
//! embedded JSON registry; anything else (test doubles, hand-written
//! adapters) can be registered alongside.

use super::record::{AttrValue, ResourceRecord};
use super::registry::{get_registry, CategoryDef};
use crate::api::client::ApiClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Discovery capability for one resource category
#[async_trait]
pub trait CategoryAdapter: Send + Sync {
    /// Normalized category tag
    fn tag(&self) -> &str;

    /// List every resource of this category in a compartment
    async fn discover(&self, compartment_id: &str) -> Result<Vec<ResourceRecord>>;
}

/// Ordered set of registered adapters
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn CategoryAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One REST adapter per embedded category definition, in tag order
    pub fn from_definitions(client: Arc<ApiClient>, tenancy_id: &str) -> Self {
        let mut registry = Self::new();
        for (tag, def) in &get_registry().categories {
            registry.register(Arc::new(RestCategoryAdapter::new(
                tag,
                def,
                Arc::clone(&client),
                tenancy_id,
            )));
        }
        registry
    }

    /// Register an adapter. A later adapter with the same tag replaces the
    /// earlier one in place, keeping iteration order.
    pub fn register(&mut self, adapter: Arc<dyn CategoryAdapter>) {
        if let Some(existing) = self.adapters.iter_mut().find(|a| a.tag() == adapter.tag()) {
            *existing = adapter;
        } else {
            self.adapters.push(adapter);
        }
    }

    pub fn tags(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.tag().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn CategoryAdapter>> {
        self.adapters.iter()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Adapter driven by a [`CategoryDef`]
pub struct RestCategoryAdapter {
    tag: String,
    def: &'static CategoryDef,
    client: Arc<ApiClient>,
    tenancy_id: String,
}

impl RestCategoryAdapter {
    pub fn new(tag: &str, def: &'static CategoryDef, client: Arc<ApiClient>, tenancy_id: &str) -> Self {
        Self {
            tag: tag.to_string(),
            def,
            client,
            tenancy_id: tenancy_id.to_string(),
        }
    }

    /// Availability domain names, required by AD-scoped listings
    async fn availability_domains(&self) -> Result<Vec<String>> {
        let items = self
            .client
            .list_all(
                "identity",
                "/20160918/availabilityDomains",
                &[("compartmentId", self.tenancy_id.as_str())],
            )
            .await
            .context("Failed to list availability domains")?;

        Ok(items
            .iter()
            .filter_map(|ad| ad.get("name").and_then(|v| v.as_str()))
            .map(|s| s.to_string())
            .collect())
    }
}

#[async_trait]
impl CategoryAdapter for RestCategoryAdapter {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn discover(&self, compartment_id: &str) -> Result<Vec<ResourceRecord>> {
        let mut items = Vec::new();

        if self.def.per_availability_domain {
            for ad in self.availability_domains().await? {
                let listed = self
                    .client
                    .list_all(
                        &self.def.service,
                        &self.def.path,
                        &[("compartmentId", compartment_id), ("availabilityDomain", ad.as_str())],
                    )
                    .await?;
                items.extend(listed);
            }
        } else {
            items = self
                .client
                .list_all(&self.def.service, &self.def.path, &[("compartmentId", compartment_id)])
                .await?;
        }

        Ok(items
            .iter()
            .filter(|item| !is_skipped_state(item, self.def))
            .map(|item| record_from_item(&self.tag, compartment_id, item, self.def))
            .collect())
    }
}

fn is_skipped_state(item: &Value, def: &CategoryDef) -> bool {
    item.get("lifecycleState")
        .and_then(|v| v.as_str())
        .map(|state| def.skip_states.iter().any(|s| s == state))
        .unwrap_or(false)
}

/// Build a record from one listed item
fn record_from_item(tag: &str, compartment_id: &str, item: &Value, def: &CategoryDef) -> ResourceRecord {
    let name = extract_json_value(item, &def.name_field)
        .and_then(|v| v.as_str())
        .unwrap_or("-");
    let id = extract_json_value(item, &def.id_field)
        .and_then(|v| v.as_str())
        .unwrap_or("");
    // Items report their own compartment; fall back to the queried one
    let owner = item
        .get("compartmentId")
        .and_then(|v| v.as_str())
        .unwrap_or(compartment_id);

    let mut record = ResourceRecord::new(tag, owner, name, id);
    for attr in &def.attributes {
        if let Some(value) = extract_json_value(item, &attr.json_path).and_then(AttrValue::from_json) {
            record.attributes.insert(attr.key.clone(), value);
        }
    }
    record
}

/// Extract a value from JSON using a dot-notation path
pub fn extract_json_value<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = item;

    for part in path.split('.') {
        current = if let Ok(idx) = part.parse::<usize>() {
            current.get(idx)?
        } else {
            current.get(part)?
        };
    }

    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::registry::get_category;
    use serde_json::json;

    struct Named(&'static str);

    #[async_trait]
    impl CategoryAdapter for Named {
        fn tag(&self) -> &str {
            self.0
        }

        async fn discover(&self, _compartment_id: &str) -> Result<Vec<ResourceRecord>> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_extract_json_value_paths() {
        let item = json!({"a": {"b": [10, {"c": "x"}]}});
        assert_eq!(extract_json_value(&item, "a.b.0"), Some(&json!(10)));
        assert_eq!(extract_json_value(&item, "a.b.1.c"), Some(&json!("x")));
        assert_eq!(extract_json_value(&item, "a.missing"), None);
    }

    #[test]
    fn test_record_from_item_extracts_attributes() {
        let def = get_category("instances").unwrap();
        let item = json!({
            "id": "ocid1.instance.oc1..vm1",
            "displayName": "web-1",
            "compartmentId": "ocid1.compartment.oc1..owner",
            "shape": "VM.Standard.E4.Flex",
            "shapeConfig": {"ocpus": 2, "memoryInGBs": 16.5},
            "lifecycleState": "RUNNING"
        });

        let record = record_from_item("instances", "queried", &item, def);
        assert_eq!(record.name, "web-1");
        assert_eq!(record.compartment_id, "ocid1.compartment.oc1..owner");
        assert_eq!(record.attributes.get("ocpus"), Some(&AttrValue::Int(2)));
        assert_eq!(record.attributes.get("memoryInGBs"), Some(&AttrValue::Float(16.5)));
        assert!(!record.attributes.contains_key("timeCreated"));
    }

    #[test]
    fn test_skipped_states() {
        let def = get_category("instances").unwrap();
        assert!(is_skipped_state(&json!({"lifecycleState": "TERMINATED"}), def));
        assert!(!is_skipped_state(&json!({"lifecycleState": "RUNNING"}), def));
        assert!(!is_skipped_state(&json!({}), def));
    }

    #[test]
    fn test_register_replaces_same_tag_in_place() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(Named("x")));
        registry.register(Arc::new(Named("y")));
        registry.register(Arc::new(Named("x")));
        assert_eq!(registry.tags(), vec!["x", "y"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_from_definitions_covers_registry() {
        let client = Arc::new(ApiClient::new("us-ashburn-1", None, None).unwrap());
        let registry = AdapterRegistry::from_definitions(client, "ocid1.tenancy.oc1..t");
        assert_eq!(registry.len(), get_registry().categories.len());
    }
}
