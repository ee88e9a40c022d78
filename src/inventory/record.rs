//! Normalized resource records

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A schema-less attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl AttrValue {
    /// Convert a JSON scalar or scalar array. Objects and nulls have no
    /// attribute form and yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Int(i)),
                None => n.as_f64().map(Self::Float),
            },
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Array(items) => Some(Self::List(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        Value::Null | Value::Object(_) | Value::Array(_) => None,
                        other => Some(other.to_string()),
                    })
                    .collect(),
            )),
            Value::Null | Value::Object(_) => None,
        }
    }
}

/// Attribute map; sorted keys keep serialization deterministic
pub type Attributes = BTreeMap<String, AttrValue>;

/// One discovered resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub category: String,
    pub compartment_id: String,
    /// Display name resolved at discovery time; not authoritative
    pub compartment_name: String,
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl ResourceRecord {
    /// Create a record. An empty `id` is replaced by a synthesized one
    /// for kinds that carry no identifier of their own.
    pub fn new(category: &str, compartment_id: &str, name: &str, id: &str) -> Self {
        let id = if id.is_empty() {
            synthesize_id(category, compartment_id, name)
        } else {
            id.to_string()
        };

        Self {
            category: category.to_string(),
            compartment_id: compartment_id.to_string(),
            compartment_name: String::new(),
            name: name.to_string(),
            id,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: AttrValue) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }
}

fn synthesize_id(category: &str, compartment_id: &str, name: &str) -> String {
    format!("{}:{}:{}", category, compartment_id, name)
}
