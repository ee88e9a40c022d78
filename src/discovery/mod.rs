//! Concurrent multi-compartment discovery engine
//!
//! # Architecture
//!
//! - [`filter`] - Include/exclude rules for compartments, categories and names
//! - [`cache`] - Compartment id -> name cache with single-flight misses
//! - [`retry`] - Error classification and backoff with jitter
//! - [`progress`] - Fire-and-forget progress events, one consumer, optional renderer
//! - [`errors`] - Capped collection of non-fatal unit failures
//! - [`orchestrator`] - Bounded fan-out over compartments, merging results
//!
//! Every network call and backoff observes one [`CancellationToken`] per
//! run; [`deadline`] builds one that fires after a wall-clock timeout.

pub mod cache;
pub mod errors;
pub mod filter;
pub mod orchestrator;
pub mod progress;
pub mod retry;

pub use cache::{CompartmentNameCache, NameResolver};
pub use errors::{ErrorSummary, UnitError};
pub use filter::{CompiledFilters, FilterConfig, FilterError};
pub use orchestrator::{Discoverer, Discovery, DiscoveryError, DiscoveryOptions};
pub use retry::RetryPolicy;

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A token cancelled once `timeout` has elapsed (or earlier, by any clone)
pub fn deadline(timeout: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let timer = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!("Run deadline of {:?} reached", timeout);
                timer.cancel();
            }
        }
    });

    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_after_timeout() {
        let token = deadline(Duration::from_secs(60));
        assert!(!token.is_cancelled());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(token.is_cancelled());
    }
}
