//! Error Aggregator
//!
//! Non-fatal per-unit failures, collected up to a cap. Errors beyond the
//! cap are still counted.

use serde::Serialize;
use std::fmt;
use tokio::sync::Mutex;

/// Default number of errors kept in a summary
pub const DEFAULT_ERROR_CAP: usize = 100;

/// One failed (compartment, category) unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitError {
    pub compartment_id: String,
    pub compartment_name: String,
    pub category: String,
    pub message: String,
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "compartment '{}' ({}) / category {}: {}",
            self.compartment_name, self.compartment_id, self.category, self.message
        )
    }
}

/// Errors of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    pub errors: Vec<UnitError>,
    /// Every recorded error, including those past the cap
    pub total: usize,
}

impl ErrorSummary {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn truncated(&self) -> usize {
        self.total - self.errors.len()
    }
}

#[derive(Default)]
struct Collected {
    errors: Vec<UnitError>,
    total: usize,
}

/// Concurrent, capped collection of unit errors
pub struct ErrorAggregator {
    cap: usize,
    inner: Mutex<Collected>,
}

impl Default for ErrorAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_CAP)
    }
}

impl ErrorAggregator {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            inner: Mutex::new(Collected::default()),
        }
    }

    pub async fn record(&self, error: UnitError) {
        let mut inner = self.inner.lock().await;
        inner.total += 1;
        if inner.errors.len() < self.cap {
            inner.errors.push(error);
        }
    }

    pub async fn summary(&self) -> ErrorSummary {
        let inner = self.inner.lock().await;
        ErrorSummary {
            errors: inner.errors.clone(),
            total: inner.total,
        }
    }
}
