//! Filter Engine
//!
//! Include/exclude rules over compartments, categories and resource names.
//! Compartment and category rules are evaluated before any network call;
//! name rules can only run once records have been fetched.

use crate::api::compartments::Compartment;
use crate::inventory::registry::normalize_tag;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// User-facing filter settings (config file and CLI flags)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Compartment ids to keep; empty keeps all
    pub include_compartments: Vec<String>,
    pub exclude_compartments: Vec<String>,
    /// Category tags to keep; empty keeps all
    pub include_categories: Vec<String>,
    pub exclude_categories: Vec<String>,
    /// Regex a resource name must match
    pub name_pattern: Option<String>,
    /// Regex a resource name must not match
    pub exclude_name_pattern: Option<String>,
}

/// Filter validation failure
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid {field} '{pattern}': {source}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown category '{tag}' (known: {known})")]
    UnknownCategory { tag: String, known: String },
}

/// Validated, ready-to-evaluate filters
#[derive(Debug, Clone, Default)]
pub struct CompiledFilters {
    include_compartments: HashSet<String>,
    exclude_compartments: HashSet<String>,
    include_categories: HashSet<String>,
    exclude_categories: HashSet<String>,
    name_pattern: Option<Regex>,
    exclude_name_pattern: Option<Regex>,
}

impl CompiledFilters {
    /// Compile a [`FilterConfig`] against the set of known category tags.
    ///
    /// Fails on a malformed regex or on a category tag no adapter serves.
    pub fn compile(config: &FilterConfig, known_categories: &[String]) -> Result<Self, FilterError> {
        let known: HashSet<String> = known_categories.iter().map(|t| normalize_tag(t)).collect();

        Ok(Self {
            include_compartments: id_set(&config.include_compartments),
            exclude_compartments: id_set(&config.exclude_compartments),
            include_categories: category_set(&config.include_categories, &known)?,
            exclude_categories: category_set(&config.exclude_categories, &known)?,
            name_pattern: compile_pattern("name pattern", config.name_pattern.as_deref())?,
            exclude_name_pattern: compile_pattern(
                "exclude name pattern",
                config.exclude_name_pattern.as_deref(),
            )?,
        })
    }

    /// Keep compartments passing the include whitelist and not excluded.
    /// Input order is preserved.
    pub fn filter_compartments(&self, compartments: &[Compartment]) -> Vec<Compartment> {
        compartments
            .iter()
            .filter(|c| self.compartment_allowed(&c.id))
            .cloned()
            .collect()
    }

    pub fn compartment_allowed(&self, id: &str) -> bool {
        (self.include_compartments.is_empty() || self.include_compartments.contains(id))
            && !self.exclude_compartments.contains(id)
    }

    /// Exclude wins when a tag is both included and excluded
    pub fn filter_category(&self, tag: &str) -> bool {
        let tag = normalize_tag(tag);
        if self.exclude_categories.contains(&tag) {
            return false;
        }
        self.include_categories.is_empty() || self.include_categories.contains(&tag)
    }

    pub fn filter_by_name(&self, name: &str) -> bool {
        let included = self
            .name_pattern
            .as_ref()
            .map(|re| re.is_match(name))
            .unwrap_or(true);
        let excluded = self
            .exclude_name_pattern
            .as_ref()
            .map(|re| re.is_match(name))
            .unwrap_or(false);
        included && !excluded
    }
}

fn id_set(ids: &[String]) -> HashSet<String> {
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
        .collect()
}

fn category_set(tags: &[String], known: &HashSet<String>) -> Result<HashSet<String>, FilterError> {
    let mut set = HashSet::new();
    for tag in tags {
        let normalized = normalize_tag(tag);
        if normalized.is_empty() {
            continue;
        }
        if !known.contains(&normalized) {
            let mut known: Vec<&str> = known.iter().map(|s| s.as_str()).collect();
            known.sort_unstable();
            return Err(FilterError::UnknownCategory {
                tag: tag.clone(),
                known: known.join(", "),
            });
        }
        set.insert(normalized);
    }
    Ok(set)
}

fn compile_pattern(field: &'static str, pattern: Option<&str>) -> Result<Option<Regex>, FilterError> {
    match pattern.filter(|p| !p.is_empty()) {
        None => Ok(None),
        Some(pattern) => Regex::new(pattern)
            .map(Some)
            .map_err(|source| FilterError::InvalidPattern {
                field,
                pattern: pattern.to_string(),
                source,
            }),
    }
}
