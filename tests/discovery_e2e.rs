//! End-to-end tests of the discovery engine with in-memory sources and
//! adapters: result merging, failure isolation, the concurrency bound,
//! deadlines and filters.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tinv::api::compartments::{Compartment, CompartmentSource};
use tinv::discovery::{
    self, CompartmentNameCache, Discoverer, Discovery, DiscoveryOptions, FilterConfig,
    NameResolver, RetryPolicy,
};
use tinv::inventory::{AdapterRegistry, CategoryAdapter, ResourceRecord};
use tokio_util::sync::CancellationToken;

const TENANCY: &str = "ocid1.tenancy.oc1..tenancy";

struct Source(Vec<Compartment>);

#[async_trait]
impl CompartmentSource for Source {
    async fn list_compartments(&self, _tenancy_id: &str) -> Result<Vec<Compartment>> {
        Ok(self.0.clone())
    }
}

struct Unresolvable;

#[async_trait]
impl NameResolver for Unresolvable {
    async fn resolve_name(&self, _compartment_id: &str) -> Result<String> {
        Err(anyhow::anyhow!("API request failed: 404 Not Found"))
    }
}

/// Adapter answering from a plain function of the compartment id
struct FnAdapter<F> {
    tag: &'static str,
    list: F,
}

#[async_trait]
impl<F> CategoryAdapter for FnAdapter<F>
where
    F: Fn(&str) -> Result<Vec<ResourceRecord>> + Send + Sync,
{
    fn tag(&self) -> &str {
        self.tag
    }

    async fn discover(&self, compartment_id: &str) -> Result<Vec<ResourceRecord>> {
        (self.list)(compartment_id)
    }
}

fn adapter<F>(tag: &'static str, list: F) -> Arc<dyn CategoryAdapter>
where
    F: Fn(&str) -> Result<Vec<ResourceRecord>> + Send + Sync + 'static,
{
    Arc::new(FnAdapter { tag, list })
}

/// One record named `<tag>-<compartment>` per compartment
fn one_each(tag: &'static str) -> Arc<dyn CategoryAdapter> {
    adapter(tag, move |c| {
        Ok(vec![ResourceRecord::new(tag, c, &format!("{}-{}", tag, c), "")])
    })
}

/// Never completes
struct Hanging;

#[async_trait]
impl CategoryAdapter for Hanging {
    fn tag(&self) -> &str {
        "hanging"
    }

    async fn discover(&self, _compartment_id: &str) -> Result<Vec<ResourceRecord>> {
        std::future::pending::<Result<Vec<ResourceRecord>>>().await
    }
}

/// Tracks how many calls run at the same time
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl CategoryAdapter for Gauge {
    fn tag(&self) -> &str {
        "gauge"
    }

    async fn discover(&self, compartment_id: &str) -> Result<Vec<ResourceRecord>> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![ResourceRecord::new("gauge", compartment_id, "g", "")])
    }
}

/// Fails with a transient error a fixed number of times, then succeeds
struct Flaky {
    failures_left: AtomicUsize,
}

#[async_trait]
impl CategoryAdapter for Flaky {
    fn tag(&self) -> &str {
        "flaky"
    }

    async fn discover(&self, compartment_id: &str) -> Result<Vec<ResourceRecord>> {
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow::anyhow!("API request failed: 503 Service Unavailable"));
        }
        Ok(vec![ResourceRecord::new("flaky", compartment_id, "f", "")])
    }
}

fn compartments(n: usize) -> Vec<Compartment> {
    (1..=n)
        .map(|i| Compartment::new(&format!("c{}", i), &format!("comp-{}", i), "ACTIVE"))
        .collect()
}

fn registry(adapters: Vec<Arc<dyn CategoryAdapter>>) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    for a in adapters {
        registry.register(a);
    }
    registry
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

fn discoverer(listed: Vec<Compartment>, adapters: Vec<Arc<dyn CategoryAdapter>>) -> Discoverer {
    Discoverer::new(
        TENANCY,
        Arc::new(Source(listed)),
        registry(adapters),
        Arc::new(CompartmentNameCache::new(Arc::new(Unresolvable))),
    )
    .with_options(DiscoveryOptions {
        retry: fast_retry(),
        ..Default::default()
    })
}

async fn run(d: &Discoverer, filters: &FilterConfig) -> Discovery {
    d.discover(&CancellationToken::new(), filters)
        .await
        .expect("discovery should succeed")
}

fn sorted_ids(discovery: &Discovery) -> Vec<String> {
    let mut ids: Vec<String> = discovery.records.iter().map(|r| r.id.clone()).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_three_compartments_two_categories() {
    // "subnets" is not authorized in c2 only
    let subnets = adapter("subnets", |c| {
        if c == "c2" {
            Err(anyhow::anyhow!(
                "API request failed: 401 Unauthorized: NotAuthorizedOrNotFound"
            ))
        } else {
            Ok(vec![ResourceRecord::new("subnets", c, "subnet", "")])
        }
    });
    let d = discoverer(compartments(2), vec![one_each("vcns"), subnets]);

    let discovery = run(&d, &FilterConfig::default()).await;

    assert_eq!(discovery.records.len(), 5);
    assert!(discovery.errors.is_empty());
    assert!(!discovery.timed_out);
    assert_eq!(discovery.progress.total_units, 6);
    assert_eq!(discovery.progress.processed_units, 6);
    assert_eq!(discovery.progress.records, 5);
    assert_eq!(discovery.progress.errors, 0);

    let root = discovery
        .records
        .iter()
        .find(|r| r.compartment_id == TENANCY)
        .unwrap();
    assert_eq!(root.compartment_name, "root");
    assert!(discovery
        .records
        .iter()
        .filter(|r| r.compartment_id == "c1")
        .all(|r| r.compartment_name == "comp-1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_is_bounded() {
    let gauge = Arc::new(Gauge {
        current: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let counted: Arc<dyn CategoryAdapter> = gauge.clone();
    let d = discoverer(compartments(24), vec![counted]);

    let discovery = run(&d, &FilterConfig::default()).await;

    assert_eq!(discovery.records.len(), 25);
    let peak = gauge.peak.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 5, "peak concurrency {}", peak);
}

#[tokio::test]
async fn test_custom_concurrency_of_one_serializes_compartments() {
    let gauge = Arc::new(Gauge {
        current: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let counted: Arc<dyn CategoryAdapter> = gauge.clone();
    let d = discoverer(compartments(4), vec![counted]).with_options(DiscoveryOptions {
        max_concurrency: 1,
        retry: fast_retry(),
        ..Default::default()
    });

    run(&d, &FilterConfig::default()).await;
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failures_are_isolated_and_reported() {
    let broken = adapter("broken", |c| {
        if c == "c1" {
            Err(anyhow::anyhow!("API request failed: 400 Bad Request"))
        } else {
            Ok(vec![])
        }
    });
    let d = discoverer(compartments(2), vec![broken, one_each("vcns")]);

    let discovery = run(&d, &FilterConfig::default()).await;

    assert_eq!(discovery.records.len(), 3);
    assert_eq!(discovery.errors.total, 1);
    let error = &discovery.errors.errors[0];
    assert_eq!(error.compartment_id, "c1");
    assert_eq!(error.compartment_name, "comp-1");
    assert_eq!(error.category, "broken");
    assert!(error.message.contains("400"));
    assert!(error.to_string().contains("comp-1"));
    assert_eq!(discovery.progress.errors, 1);
    assert_eq!(discovery.progress.processed_units, discovery.progress.total_units);
}

#[tokio::test]
async fn test_skippable_failures_are_not_errors() {
    let denied = adapter("denied", |_| {
        Err(anyhow::anyhow!("API request failed: 404 Not Found"))
    });
    let d = discoverer(compartments(1), vec![denied, one_each("vcns")]);

    let discovery = run(&d, &FilterConfig::default()).await;

    assert!(discovery.errors.is_empty());
    assert_eq!(discovery.records.len(), 2);
    assert_eq!(discovery.progress.processed_units, 4);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let flaky: Arc<dyn CategoryAdapter> = Arc::new(Flaky {
        failures_left: AtomicUsize::new(2),
    });
    let d = discoverer(vec![], vec![flaky]);

    let discovery = run(&d, &FilterConfig::default()).await;

    assert_eq!(discovery.records.len(), 1);
    assert!(discovery.errors.is_empty());
    assert_eq!(discovery.progress.retries, 2);
}

#[tokio::test]
async fn test_exhausted_retries_become_unit_errors() {
    let flaky: Arc<dyn CategoryAdapter> = Arc::new(Flaky {
        failures_left: AtomicUsize::new(100),
    });
    let d = discoverer(vec![], vec![flaky]);

    let discovery = run(&d, &FilterConfig::default()).await;

    assert!(discovery.records.is_empty());
    assert_eq!(discovery.errors.total, 1);
    assert!(discovery.errors.errors[0].message.contains("giving up after"));
    assert_eq!(discovery.progress.retries, 3);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_returns_partial_results() {
    let hanging: Arc<dyn CategoryAdapter> = Arc::new(Hanging);
    let d = discoverer(compartments(2), vec![one_each("vcns"), hanging]);

    let cancel = discovery::deadline(Duration::from_secs(5));
    let discovery = d
        .discover(&cancel, &FilterConfig::default())
        .await
        .unwrap();

    assert!(discovery.timed_out);
    assert_eq!(discovery.records.len(), 3);
    assert_eq!(discovery.progress.total_units, 6);
    assert!(discovery.progress.processed_units < discovery.progress.total_units);
    assert!(discovery.errors.is_empty());
}

#[tokio::test]
async fn test_already_cancelled_run_fails_enumeration() {
    let d = discoverer(compartments(2), vec![one_each("vcns")]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = d.discover(&cancel, &FilterConfig::default()).await;
    // Enumeration itself observes the token
    assert!(result.is_err());
}

#[tokio::test]
async fn test_filters_apply_at_every_level() {
    let d = discoverer(
        compartments(3),
        vec![one_each("vcns"), one_each("instances")],
    );
    let filters = FilterConfig {
        exclude_compartments: vec!["c2".to_string()],
        exclude_categories: vec!["instances".to_string()],
        exclude_name_pattern: Some("c3$".to_string()),
        ..Default::default()
    };

    let discovery = run(&d, &filters).await;

    let names: HashSet<String> = discovery.records.iter().map(|r| r.name.clone()).collect();
    let expected: HashSet<String> = [format!("vcns-{}", TENANCY), "vcns-c1".to_string()]
        .into_iter()
        .collect();
    assert_eq!(names, expected);
    // Three compartments remain, each with both categories counted
    assert_eq!(discovery.progress.total_units, 6);
    assert_eq!(discovery.progress.processed_units, 6);
}

#[tokio::test]
async fn test_unknown_owner_gets_fallback_name() {
    let foreign = adapter("foreign", |_| {
        Ok(vec![ResourceRecord::new(
            "foreign",
            "ocid1.compartment.oc1..abcdef12345678",
            "x",
            "",
        )])
    });
    let d = discoverer(vec![], vec![foreign]);

    let discovery = run(&d, &FilterConfig::default()).await;

    assert_eq!(discovery.records[0].compartment_name, "compartment-12345678");
}

#[tokio::test]
async fn test_progress_display_does_not_change_results() {
    let adapters = || vec![one_each("vcns"), one_each("subnets")];

    let quiet = run(&discoverer(compartments(3), adapters()), &FilterConfig::default()).await;
    let shown = discoverer(compartments(3), adapters()).with_options(DiscoveryOptions {
        show_progress: true,
        retry: fast_retry(),
        ..Default::default()
    });
    let shown = run(&shown, &FilterConfig::default()).await;

    assert_eq!(sorted_ids(&quiet), sorted_ids(&shown));
    assert_eq!(quiet.progress.processed_units, shown.progress.processed_units);
}

#[tokio::test]
async fn test_discovery_serializes_camel_case() {
    let d = discoverer(vec![], vec![one_each("vcns")]);
    let discovery = run(&d, &FilterConfig::default()).await;

    let value = serde_json::to_value(&discovery).unwrap();
    assert!(value.get("runId").is_some());
    assert_eq!(value["timedOut"], false);
    assert_eq!(value["records"][0]["compartmentName"], "root");
    assert_eq!(value["records"][0]["category"], "vcns");
}

/// Two records per call, returned immediately
fn two_each(tag: &'static str) -> Arc<dyn CategoryAdapter> {
    adapter(tag, move |c| {
        Ok(vec![
            ResourceRecord::new(tag, c, "a", ""),
            ResourceRecord::new(tag, c, "b", ""),
        ])
    })
}

#[tokio::test]
async fn test_counters_are_exact_on_large_runs() {
    // Far more progress events than the progress channel holds
    let d = discoverer(compartments(1_500), vec![two_each("vcns"), two_each("subnets")]);

    let discovery = run(&d, &FilterConfig::default()).await;

    assert!(!discovery.timed_out);
    assert_eq!(discovery.progress.total_units, 3_002);
    assert_eq!(discovery.progress.processed_units, discovery.progress.total_units);
    assert_eq!(discovery.progress.records, discovery.records.len() as u64);
    assert_eq!(discovery.records.len(), 6_004);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_counters_are_exact_on_large_multi_threaded_runs() {
    let adapters = ["a", "b", "c", "d", "e", "f", "g", "h"]
        .into_iter()
        .map(two_each)
        .collect();
    let d = discoverer(compartments(800), adapters);

    let discovery = run(&d, &FilterConfig::default()).await;

    assert_eq!(discovery.progress.total_units, 6_408);
    assert_eq!(discovery.progress.processed_units, 6_408);
    assert_eq!(discovery.progress.records, discovery.records.len() as u64);
}

#[tokio::test]
async fn test_cancel_at_completion_is_not_a_timeout() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    // The only unit fires the token as it finishes
    let last = adapter("vcns", move |c| {
        trigger.cancel();
        Ok(vec![ResourceRecord::new("vcns", c, "main", "")])
    });
    let d = discoverer(vec![], vec![last]);

    let discovery = d.discover(&cancel, &FilterConfig::default()).await.unwrap();

    assert!(!discovery.timed_out);
    assert_eq!(discovery.records.len(), 1);
    assert_eq!(discovery.progress.processed_units, 1);
}
