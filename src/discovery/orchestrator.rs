//! Worker Pool Orchestrator
//!
//! Runs one task per selected compartment, at most `max_concurrency` at a
//! time. Inside a task, categories run one after another so the number of
//! outbound calls in flight stays bounded by the compartment limit.
//!
//! Per-unit failures never abort the run: skippable ones are logged,
//! everything else lands in the [`ErrorSummary`]. Only filter validation and
//! compartment enumeration can fail [`Discoverer::discover`] outright.

use super::cache::CompartmentNameCache;
use super::errors::{ErrorAggregator, ErrorSummary, UnitError, DEFAULT_ERROR_CAP};
use super::filter::{CompiledFilters, FilterConfig, FilterError};
use super::progress::{
    ProgressHandle, ProgressSnapshot, ProgressTracker, ProgressUpdate, DEFAULT_RENDER_INTERVAL,
};
use super::retry::{is_skippable, RetryPolicy};
use crate::api::compartments::{list_all, Compartment, CompartmentSource};
use crate::inventory::{AdapterRegistry, ResourceRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Compartments processed simultaneously
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Failures that stop a run before any discovery work
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no tenancy configured")]
    MissingTenancy,

    #[error("invalid filter configuration")]
    InvalidFilter(#[from] FilterError),

    #[error("compartment enumeration failed")]
    Enumeration(#[source] anyhow::Error),
}

/// Result of one run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Discovery {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Set when the deadline fired and `records` is partial
    pub timed_out: bool,
    pub progress: ProgressSnapshot,
    pub errors: ErrorSummary,
    pub records: Vec<ResourceRecord>,
}

/// Orchestrator settings
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryOptions {
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
    pub error_cap: usize,
    /// Draw a live status line on stderr
    pub show_progress: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            retry: RetryPolicy::default(),
            error_cap: DEFAULT_ERROR_CAP,
            show_progress: false,
        }
    }
}

/// State shared by every compartment task of a run
struct RunState {
    adapters: AdapterRegistry,
    filters: CompiledFilters,
    cache: Arc<CompartmentNameCache>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    progress: ProgressHandle,
    results: Mutex<Vec<ResourceRecord>>,
    errors: ErrorAggregator,
}

/// The discovery engine
pub struct Discoverer {
    tenancy_id: String,
    source: Arc<dyn CompartmentSource>,
    adapters: AdapterRegistry,
    cache: Arc<CompartmentNameCache>,
    options: DiscoveryOptions,
}

impl Discoverer {
    pub fn new(
        tenancy_id: &str,
        source: Arc<dyn CompartmentSource>,
        adapters: AdapterRegistry,
        cache: Arc<CompartmentNameCache>,
    ) -> Self {
        Self {
            tenancy_id: tenancy_id.to_string(),
            source,
            adapters,
            cache,
            options: DiscoveryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DiscoveryOptions) -> Self {
        self.options = options;
        self
    }

    /// Discover every (compartment, category) unit selected by `filters`.
    ///
    /// Returns once all compartment tasks finish or `cancel` fires; in the
    /// latter case in-flight work is abandoned and the records gathered so
    /// far are returned with `timed_out` set.
    pub async fn discover(
        &self,
        cancel: &CancellationToken,
        filters: &FilterConfig,
    ) -> Result<Discovery, DiscoveryError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("discover", %run_id);
        self.run(run_id, cancel, filters).instrument(span).await
    }

    async fn run(
        &self,
        run_id: Uuid,
        cancel: &CancellationToken,
        filters: &FilterConfig,
    ) -> Result<Discovery, DiscoveryError> {
        let started_at = Utc::now();

        if self.tenancy_id.is_empty() {
            return Err(DiscoveryError::MissingTenancy);
        }

        let filters = CompiledFilters::compile(filters, &self.adapters.tags())?;

        let compartments = self
            .options
            .retry
            .run(
                "enumerate compartments",
                cancel,
                &ProgressHandle::detached(),
                || list_all(self.source.as_ref(), &self.tenancy_id),
            )
            .await
            .map_err(DiscoveryError::Enumeration)?;

        self.cache
            .insert_many(
                compartments
                    .iter()
                    .map(|c| (c.id.clone(), c.name.clone()))
                    .collect(),
            )
            .await;

        let selected = filters.filter_compartments(&compartments);
        let total_units = (selected.len() * self.adapters.len()) as u64;
        tracing::info!(
            "Discovering {} categories in {} of {} compartments ({} units)",
            self.adapters.len(),
            selected.len(),
            compartments.len(),
            total_units
        );

        let mut tracker = ProgressTracker::start(total_units);
        if self.options.show_progress {
            tracker.spawn_renderer(std::io::stderr(), DEFAULT_RENDER_INTERVAL);
        }

        let state = Arc::new(RunState {
            adapters: self.adapters.clone(),
            filters,
            cache: Arc::clone(&self.cache),
            retry: self.options.retry,
            cancel: cancel.clone(),
            progress: tracker.handle(),
            results: Mutex::new(Vec::new()),
            errors: ErrorAggregator::new(self.options.error_cap),
        });

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for compartment in selected {
            let state = Arc::clone(&state);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                discover_compartment(&state, &compartment).await;
            });
        }

        let aborted = wait_for_tasks(&mut tasks, cancel).await;

        let progress = tracker.finish().await;
        // Tasks also return early on their own once the token fires
        let timed_out = cancel.is_cancelled()
            && (aborted || progress.processed_units < progress.total_units);
        let records = std::mem::take(&mut *state.results.lock().await);
        let errors = state.errors.summary().await;

        if timed_out {
            tracing::warn!(
                "Deadline reached after {}/{} units; returning {} records collected so far",
                progress.processed_units,
                progress.total_units,
                records.len()
            );
        }
        for error in &errors.errors {
            tracing::warn!("{}", error);
        }
        tracing::info!(
            "Discovered {} records ({} errors, {} retries)",
            records.len(),
            errors.total,
            progress.retries
        );

        Ok(Discovery {
            run_id,
            started_at,
            timed_out,
            progress,
            errors,
            records,
        })
    }
}

/// Wait for every task, or abort them all when `cancel` fires.
/// Returns true if a task was still running when it was aborted; tasks that
/// had already finished by then do not count.
async fn wait_for_tasks(tasks: &mut JoinSet<()>, cancel: &CancellationToken) -> bool {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tasks.abort_all();
                let mut aborted = false;
                while let Some(joined) = tasks.join_next().await {
                    aborted |= matches!(joined, Err(e) if e.is_cancelled());
                }
                return aborted;
            }

            joined = tasks.join_next() => match joined {
                Some(Ok(())) => {}
                Some(Err(e)) if e.is_panic() => {
                    tracing::error!("Compartment task panicked: {}", e);
                }
                Some(Err(_)) => {}
                None => return false,
            },
        }
    }
}

/// Process every category of one compartment, sequentially
async fn discover_compartment(state: &RunState, compartment: &Compartment) {
    for adapter in state.adapters.iter() {
        if state.cancel.is_cancelled() {
            return;
        }

        let tag = adapter.tag();
        let label = format!("{}/{}", compartment.name, tag);

        if !state.filters.filter_category(tag) {
            tracing::trace!("{}: category filtered out", label);
            state.progress.update(ProgressUpdate::unit_done(0, false));
            continue;
        }

        state.progress.update(ProgressUpdate::started(label.clone()));

        let result = state
            .retry
            .run(&label, &state.cancel, &state.progress, || {
                adapter.discover(&compartment.id)
            })
            .await;

        match result {
            Ok(records) => {
                let count = merge_records(state, records).await;
                tracing::debug!("{}: {} records", label, count);
                state.progress.update(ProgressUpdate::unit_done(count, false));
            }
            // Abandoned by the deadline; nothing to report
            Err(_) if state.cancel.is_cancelled() => return,
            Err(e) if is_skippable(&e) => {
                tracing::debug!("{}: skipped ({:#})", label, e);
                state.progress.update(ProgressUpdate::unit_done(0, false));
            }
            Err(e) => {
                tracing::warn!("{}: failed: {:#}", label, e);
                state
                    .errors
                    .record(UnitError {
                        compartment_id: compartment.id.clone(),
                        compartment_name: compartment.name.clone(),
                        category: tag.to_string(),
                        message: format!("{:#}", e),
                    })
                    .await;
                state.progress.update(ProgressUpdate::unit_done(0, true));
            }
        }
    }
}

/// Apply the name filter, resolve compartment names and append survivors
async fn merge_records(state: &RunState, records: Vec<ResourceRecord>) -> u64 {
    let mut kept = Vec::with_capacity(records.len());
    for mut record in records {
        if !state.filters.filter_by_name(&record.name) {
            continue;
        }
        record.compartment_name = state.cache.get(&record.compartment_id).await;
        kept.push(record);
    }

    let count = kept.len() as u64;
    state.results.lock().await.extend(kept);
    count
}
