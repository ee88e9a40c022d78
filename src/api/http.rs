//! HTTP utilities for REST API calls

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Response header carrying the next page token
pub const NEXT_PAGE_HEADER: &str = "opc-next-page";

/// Response header carrying the server-side request id
const REQUEST_ID_HEADER: &str = "opc-request-id";

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// One page of a paginated listing
#[derive(Debug, Clone)]
pub struct Page {
    pub body: Value,
    pub next_page: Option<String>,
}

/// HTTP client wrapper for API calls
#[derive(Clone)]
pub struct ApiHttpClient {
    client: Client,
}

impl ApiHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tinv/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Make a GET request and return the parsed body plus the next page token
    pub async fn get_page(&self, url: &str, token: Option<&str>) -> Result<Page> {
        tracing::debug!("GET {}", url);

        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("Failed to send request")?;

        let status = response.status();
        let next_page = response
            .headers()
            .get(NEXT_PAGE_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            // Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(status_error(status, request_id.as_deref()));
        }

        if body.is_empty() {
            return Ok(Page {
                body: Value::Null,
                next_page,
            });
        }

        let body = serde_json::from_str(&body).context("Failed to parse response JSON")?;
        Ok(Page { body, next_page })
    }

    /// Make a GET request to an API, ignoring pagination
    pub async fn get(&self, url: &str, token: Option<&str>) -> Result<Value> {
        Ok(self.get_page(url, token).await?.body)
    }
}

/// Build the error for a non-success status. The status code and reason stay
/// in the message because retry and skip classification read it.
fn status_error(status: StatusCode, request_id: Option<&str>) -> anyhow::Error {
    match request_id {
        Some(id) => anyhow::anyhow!("API request failed: {} (opc-request-id: {})", status, id),
        None => anyhow::anyhow!("API request failed: {}", status),
    }
}

/// Prefix of the errors built by `status_error`
const STATUS_PREFIX: &str = "api request failed: ";

/// HTTP status code recorded in an error message, if any
pub fn status_code(message: &str) -> Option<u16> {
    let lower = message.to_ascii_lowercase();
    let start = lower.find(STATUS_PREFIX)? + STATUS_PREFIX.len();
    lower[start..].get(..3)?.parse().ok()
}

/// Format an API error for display
/// Sanitizes error messages to avoid leaking API details
pub fn format_api_error(error: &anyhow::Error) -> String {
    let error_str = format!("{:#}", error);

    match status_code(&error_str) {
        Some(403) => {
            return "Permission denied. Check your IAM policies for this compartment.".to_string()
        }
        Some(401) => return "Authentication failed. Check your security token.".to_string(),
        Some(404) => return "Resource not found.".to_string(),
        Some(429) => return "Rate limit exceeded. Please try again later.".to_string(),
        Some(400) => return "Invalid request. Check your parameters.".to_string(),
        Some(500..=599) => {
            return "Service temporarily unavailable. Please try again.".to_string()
        }
        Some(_) => {
            return "Request failed. Check your network connection and try again.".to_string()
        }
        None => {}
    }

    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(80)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let out = sanitize_for_log(&body);
        assert!(out.starts_with(&"x".repeat(MAX_LOG_BODY_LENGTH)));
        assert!(out.contains("500 bytes total"));
    }

    #[test]
    fn test_status_error_keeps_status_in_message() {
        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, Some("abc"));
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn test_format_api_error_maps_statuses() {
        let err = anyhow::anyhow!("API request failed: 403 Forbidden");
        assert!(format_api_error(&err).starts_with("Permission denied"));

        let err = anyhow::anyhow!("API request failed: 429 Too Many Requests");
        assert!(format_api_error(&err).starts_with("Rate limit"));
    }

    #[test]
    fn test_status_code_reads_the_status_line() {
        assert_eq!(status_code("API request failed: 503 Service Unavailable"), Some(503));
        assert_eq!(
            status_code("listing vcns: api request failed: 404 Not Found (opc-request-id: 1)"),
            Some(404)
        );
        assert_eq!(status_code("connection reset after 500 ms"), None);
        assert_eq!(status_code("API request failed: "), None);
    }

    #[test]
    fn test_format_api_error_ignores_digits_outside_status() {
        let err = anyhow::anyhow!("API request failed: 403 Forbidden (opc-request-id: 5004040429)");
        assert!(format_api_error(&err).starts_with("Permission denied"));

        let err = anyhow::anyhow!("API request failed: 409 Conflict (opc-request-id: 500401)");
        assert!(format_api_error(&err).starts_with("Request failed"));

        let err = anyhow::anyhow!("no route for ocid1.compartment.oc1..aaa500bbb404");
        let friendly = format_api_error(&err);
        assert!(!friendly.starts_with("Service temporarily unavailable"), "{}", friendly);
        assert!(!friendly.starts_with("Resource not found"), "{}", friendly);
        assert!(friendly.starts_with("no route for"), "{}", friendly);
    }
}
