//! Compartments
//!
//! Listing compartments of a tenancy and resolving their display names.

use super::client::ApiClient;
use crate::discovery::cache::NameResolver;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Identity service name used in endpoint construction
const IDENTITY_SERVICE: &str = "identity";

/// Display name of the synthesized tenancy compartment
pub const ROOT_COMPARTMENT_NAME: &str = "root";

/// Lifecycle state of a usable compartment
pub const ACTIVE: &str = "ACTIVE";

/// Compartment information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Compartment {
    pub id: String,
    pub name: String,
    pub lifecycle_state: String,
}

impl Compartment {
    pub fn new(id: &str, name: &str, lifecycle_state: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            lifecycle_state: lifecycle_state.to_string(),
        }
    }

    /// The pseudo-compartment standing for the tenancy itself
    pub fn root(tenancy_id: &str) -> Self {
        Self::new(tenancy_id, ROOT_COMPARTMENT_NAME, ACTIVE)
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle_state == ACTIVE
    }
}

impl From<&Value> for Compartment {
    fn from(value: &Value) -> Self {
        Self {
            id: value
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or("-")
                .to_string(),
            name: value
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("-")
                .to_string(),
            lifecycle_state: value
                .get("lifecycleState")
                .and_then(|v| v.as_str())
                .unwrap_or("UNKNOWN")
                .to_string(),
        }
    }
}

/// Source of the compartment hierarchy of a tenancy
#[async_trait]
pub trait CompartmentSource: Send + Sync {
    /// List every compartment beneath the tenancy, fully paginated
    async fn list_compartments(&self, tenancy_id: &str) -> Result<Vec<Compartment>>;
}

/// List all active compartments, with the synthesized root first.
///
/// Any listing failure is returned as is: a partial compartment list is
/// never acceptable.
pub async fn list_all(source: &dyn CompartmentSource, tenancy_id: &str) -> Result<Vec<Compartment>> {
    let listed = source
        .list_compartments(tenancy_id)
        .await
        .with_context(|| format!("Failed to list compartments of tenancy {}", tenancy_id))?;

    let mut compartments = Vec::with_capacity(listed.len() + 1);
    compartments.push(Compartment::root(tenancy_id));
    compartments.extend(
        listed
            .into_iter()
            .filter(|c| c.is_active() && c.id != tenancy_id),
    );

    tracing::info!("Enumerated {} compartments", compartments.len());
    Ok(compartments)
}

#[async_trait]
impl CompartmentSource for ApiClient {
    async fn list_compartments(&self, tenancy_id: &str) -> Result<Vec<Compartment>> {
        let items = self
            .list_all(
                IDENTITY_SERVICE,
                "/20160918/compartments",
                &[
                    ("compartmentId", tenancy_id),
                    ("compartmentIdInSubtree", "true"),
                    ("accessLevel", "ACCESSIBLE"),
                    ("limit", "1000"),
                ],
            )
            .await?;

        Ok(items.iter().map(Compartment::from).collect())
    }
}

#[async_trait]
impl NameResolver for ApiClient {
    async fn resolve_name(&self, compartment_id: &str) -> Result<String> {
        let path = format!(
            "/20160918/compartments/{}",
            urlencoding::encode(compartment_id)
        );
        let url = self.build_url(IDENTITY_SERVICE, &path, &[], None)?;
        let body = self.get(&url).await?;

        body.get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .context("Compartment response has no name")
    }
}
