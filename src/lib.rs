//! tinv - tenancy inventory
//!
//! Discovers cloud resources across every compartment of a tenancy and
//! returns them as one normalized record list.
//!
//! - [`api`] - REST client, compartment listing, CLI profile defaults
//! - [`inventory`] - Resource categories, adapters and records
//! - [`discovery`] - The concurrent discovery engine
//! - [`config`] - Persistent configuration

pub mod api;
pub mod config;
pub mod discovery;
pub mod inventory;

/// Version injected at compile time via TINV_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("TINV_VERSION") {
    Some(v) => v,
    None => "dev",
};
