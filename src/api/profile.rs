//! CLI profile defaults
//!
//! Reads the default tenancy and region from the environment or from the
//! profile file of the cloud CLI (`~/.oci/config`). Credentials themselves
//! are not acquired here; an already issued token can be supplied through
//! the environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Profile used when `OCI_CLI_PROFILE` is unset
pub const DEFAULT_PROFILE: &str = "DEFAULT";

/// Environment variable holding a pre-issued bearer token
pub const TOKEN_ENV: &str = "TINV_TOKEN";

/// Get the CLI configuration file path
pub fn get_cli_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("OCI_CLI_CONFIG_FILE") {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|p| p.join(".oci").join("config"))
}

/// Validate a tenancy OCID: `ocid1.tenancy.<realm>.<region?>.<unique id>`
pub fn validate_tenancy_id(tenancy: &str) -> bool {
    let parts: Vec<&str> = tenancy.split('.').collect();
    if parts.len() < 5 || parts[0] != "ocid1" || parts[1] != "tenancy" {
        return false;
    }

    // The unique part is mandatory; the region part may be empty
    let unique = parts[parts.len() - 1];
    if unique.is_empty() {
        return false;
    }

    tenancy
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-' || c == '_')
}

/// Validate a profile (section) name to keep lookups predictable
fn validate_profile_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parse one section of an INI-style profile file
fn parse_profile_section(content: &str, profile: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    let header = format!("[{}]", profile);
    let mut in_section = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            in_section = line == header;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    values
}

/// Load the active profile section from the given file
fn load_profile(path: &Path) -> Option<HashMap<String, String>> {
    let profile = std::env::var("OCI_CLI_PROFILE").unwrap_or_else(|_| DEFAULT_PROFILE.to_string());

    if !validate_profile_name(&profile) {
        tracing::warn!("Invalid characters in OCI_CLI_PROFILE");
        return None;
    }

    let content = std::fs::read_to_string(path).ok()?;
    Some(parse_profile_section(&content, &profile))
}

/// Read the default tenancy from the environment or the profile file
/// Validates the OCID format before returning
pub fn get_default_tenancy() -> Option<String> {
    for var in ["OCI_TENANCY", "OCI_CLI_TENANCY"] {
        if let Ok(tenancy) = std::env::var(var) {
            if validate_tenancy_id(&tenancy) {
                return Some(tenancy);
            }
            tracing::warn!("Invalid tenancy OCID format in {}", var);
        }
    }

    let profile = load_profile(&get_cli_config_path()?)?;
    let tenancy = profile.get("tenancy")?;
    if validate_tenancy_id(tenancy) {
        Some(tenancy.clone())
    } else {
        tracing::warn!("Invalid tenancy OCID format in CLI profile");
        None
    }
}

/// Read the default region from the environment or the profile file
pub fn get_default_region() -> Option<String> {
    for var in ["OCI_REGION", "OCI_CLI_REGION"] {
        if let Ok(region) = std::env::var(var) {
            if !region.is_empty() {
                return Some(region);
            }
        }
    }

    let profile = load_profile(&get_cli_config_path()?)?;
    profile.get("region").cloned()
}

/// Read a pre-issued bearer token, if any
pub fn get_token() -> Option<String> {
    std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty())
}
