//! Cloud API interaction module
//!
//! This module provides the REST plumbing the discovery engine runs on.
//!
//! # Module Structure
//!
//! - [`client`] - Main API client (endpoints, pagination)
//! - [`http`] - HTTP utilities for REST API calls
//! - [`compartments`] - Compartment listing and name resolution
//! - [`profile`] - Tenancy/region defaults from the environment and CLI profile
//!
//! # Example
//!
//! ```ignore
//! use tinv::api::client::ApiClient;
//! use tinv::api::compartments::list_all;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = ApiClient::new("us-ashburn-1", None, None)?;
//!     let compartments = list_all(&client, "ocid1.tenancy.oc1..aaaa").await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod compartments;
pub mod http;
pub mod profile;
