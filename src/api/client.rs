//! API Client
//!
//! Main client for the cloud REST APIs, combining the HTTP layer with
//! endpoint construction and page-token pagination.

use super::http::{ApiHttpClient, Page};
use anyhow::{Context, Result};
use serde_json::Value;
use url::Url;

/// Default endpoint template; `{service}` and `{region}` are substituted
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "https://{service}.{region}.oraclecloud.com";

/// Hard stop for runaway pagination (a server that never stops returning tokens)
const MAX_PAGES: usize = 10_000;

/// Main API client
#[derive(Clone)]
pub struct ApiClient {
    pub http: ApiHttpClient,
    pub region: String,
    endpoint_template: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(region: &str, endpoint_template: Option<&str>, token: Option<String>) -> Result<Self> {
        let http = ApiHttpClient::new()?;

        Ok(Self {
            http,
            region: region.to_string(),
            endpoint_template: endpoint_template
                .unwrap_or(DEFAULT_ENDPOINT_TEMPLATE)
                .trim_end_matches('/')
                .to_string(),
            token,
        })
    }

    /// Base URL for a service in the configured region
    pub fn service_url(&self, service: &str) -> String {
        self.endpoint_template
            .replace("{service}", service)
            .replace("{region}", &self.region)
    }

    /// Build a full request URL with encoded query parameters
    pub fn build_url(
        &self,
        service: &str,
        path: &str,
        params: &[(&str, &str)],
        page: Option<&str>,
    ) -> Result<String> {
        let base = format!("{}{}", self.service_url(service), path);
        let mut url = Url::parse(&base).with_context(|| format!("Invalid endpoint URL: {}", base))?;

        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            if let Some(page) = page {
                query.append_pair("page", page);
            }
        }

        // An empty query leaves a dangling '?'
        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(url.into())
    }

    /// Make a GET request to an API
    pub async fn get(&self, url: &str) -> Result<Value> {
        self.http.get(url, self.token.as_deref()).await
    }

    /// Fetch one page
    pub async fn get_page(&self, url: &str) -> Result<Page> {
        self.http.get_page(url, self.token.as_deref()).await
    }

    /// Fetch all pages of a listing (auto-paginate)
    pub async fn list_all(
        &self,
        service: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<Value>> {
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let url = self.build_url(service, path, params, page_token.as_deref())?;
            let page = self.get_page(&url).await?;
            all_items.extend(extract_items(page.body));

            if page.next_page.is_none() {
                return Ok(all_items);
            }
            page_token = page.next_page;
        }

        Err(anyhow::anyhow!(
            "Pagination for {}{} did not terminate after {} pages",
            service,
            path,
            MAX_PAGES
        ))
    }
}

/// Listing bodies are either a bare array or an object with an `items` array
fn extract_items(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => vec![],
        },
        _ => vec![],
    }
}
