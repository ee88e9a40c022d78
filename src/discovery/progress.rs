//! Progress Tracker
//!
//! Workers report progress through a [`ProgressHandle`]. Each update bumps
//! shared atomic counters, then is offered to a bounded channel without
//! waiting; events that find the channel full are dropped. Counts are
//! therefore exact however many events are lost, and only the "current
//! unit" label is best-effort.
//!
//! A single consumer task drains the channel and publishes an immutable
//! [`ProgressSnapshot`] through a `watch` channel. An optional render task
//! samples the counters on a timer and draws a one-line status with
//! smoothed throughput and ETA.

use crossterm::{
    cursor::MoveToColumn,
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use serde::Serialize;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Capacity of the update channel
pub const CHANNEL_CAPACITY: usize = 1024;

/// Smoothing factor of the throughput moving average
pub const EMA_ALPHA: f64 = 0.1;

/// Default interval between rendered status lines
pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(250);

/// One immutable progress event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    /// Records discovered since the previous update
    pub records: u64,
    /// The unit ended with a recorded error
    pub error: bool,
    /// A retry was scheduled
    pub retry: bool,
    /// Label of the unit now in progress
    pub label: Option<String>,
    /// A unit finished (successfully, skipped or failed)
    pub unit_done: bool,
}

impl ProgressUpdate {
    pub fn started(label: String) -> Self {
        Self {
            label: Some(label),
            ..Default::default()
        }
    }

    pub fn retry() -> Self {
        Self {
            retry: true,
            ..Default::default()
        }
    }

    pub fn unit_done(records: u64, error: bool) -> Self {
        Self {
            records,
            error,
            unit_done: true,
            ..Default::default()
        }
    }
}

/// Point-in-time view of a run's progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub total_units: u64,
    pub processed_units: u64,
    pub records: u64,
    pub retries: u64,
    pub errors: u64,
    pub current: String,
}

impl ProgressSnapshot {
    /// Completed share of the run, in percent
    pub fn percent(&self) -> f64 {
        if self.total_units == 0 {
            return 100.0;
        }
        (self.processed_units as f64 / self.total_units as f64 * 100.0).min(100.0)
    }
}

/// Authoritative run counters, shared by every handle of a tracker
#[derive(Debug)]
struct Counters {
    total_units: u64,
    processed_units: AtomicU64,
    records: AtomicU64,
    retries: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn new(total_units: u64) -> Self {
        Self {
            total_units,
            processed_units: AtomicU64::new(0),
            records: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    fn record(&self, update: &ProgressUpdate) {
        if update.records > 0 {
            self.records.fetch_add(update.records, Ordering::Relaxed);
        }
        if update.error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        if update.retry {
            self.retries.fetch_add(1, Ordering::Relaxed);
        }
        if update.unit_done {
            self.processed_units.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self, current: String) -> ProgressSnapshot {
        ProgressSnapshot {
            total_units: self.total_units,
            processed_units: self.processed_units.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            current,
        }
    }
}

/// Cheap, cloneable sender side of the tracker
#[derive(Clone)]
pub struct ProgressHandle {
    tx: mpsc::Sender<ProgressUpdate>,
    counters: Arc<Counters>,
}

impl ProgressHandle {
    /// A handle connected to nothing; every update is discarded
    pub fn detached() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self {
            tx,
            counters: Arc::new(Counters::new(0)),
        }
    }

    /// Count the update, then enqueue it without waiting. Only the queued
    /// event is dropped when the channel is full; the counts never are.
    #[inline]
    pub fn update(&self, update: ProgressUpdate) {
        self.counters.record(&update);
        let _ = self.tx.try_send(update);
    }

    #[inline]
    pub fn retry(&self) {
        self.update(ProgressUpdate::retry());
    }
}

/// Owner of the consumer (and optional renderer) tasks
pub struct ProgressTracker {
    handle: ProgressHandle,
    counters: Arc<Counters>,
    snapshots: watch::Receiver<ProgressSnapshot>,
    consumer: JoinHandle<String>,
    consumer_done: CancellationToken,
    renderer: Option<(JoinHandle<()>, CancellationToken)>,
}

impl ProgressTracker {
    /// Start the consumer task for a run of `total_units` units
    pub fn start(total_units: u64) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let counters = Arc::new(Counters::new(total_units));
        let (snapshot_tx, snapshots) = watch::channel(counters.snapshot(String::new()));
        let consumer_done = CancellationToken::new();

        let consumer = tokio::spawn(consume(
            rx,
            snapshot_tx,
            Arc::clone(&counters),
            consumer_done.clone(),
        ));

        Self {
            handle: ProgressHandle {
                tx,
                counters: Arc::clone(&counters),
            },
            counters,
            snapshots,
            consumer,
            consumer_done,
            renderer: None,
        }
    }

    pub fn handle(&self) -> ProgressHandle {
        self.handle.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.snapshots.clone()
    }

    /// Draw a status line to `out` every `interval` until the run finishes
    pub fn spawn_renderer<W>(&mut self, out: W, interval: Duration)
    where
        W: Write + Send + 'static,
    {
        let done = CancellationToken::new();
        let task = tokio::spawn(render_loop(
            out,
            Arc::clone(&self.counters),
            self.subscribe(),
            interval,
            done.clone(),
        ));
        self.renderer = Some((task, done));
    }

    /// Stop the consumer and return the final snapshot.
    ///
    /// Call once every worker has finished. Counters come from the shared
    /// atomics, so events dropped on a full channel do not affect them.
    pub async fn finish(self) -> ProgressSnapshot {
        let Self {
            handle,
            counters,
            snapshots,
            consumer,
            consumer_done,
            renderer,
        } = self;
        drop(handle);

        consumer_done.cancel();
        let current = match consumer.await {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!("Progress consumer failed: {}", e);
                snapshots.borrow().current.clone()
            }
        };
        let final_snapshot = counters.snapshot(current);

        if let Some((task, done)) = renderer {
            done.cancel();
            let _ = task.await;
        }

        final_snapshot
    }
}

/// The single consumer: tracks the latest label and publishes snapshots.
/// Returns the last label seen.
async fn consume(
    mut rx: mpsc::Receiver<ProgressUpdate>,
    snapshot_tx: watch::Sender<ProgressSnapshot>,
    counters: Arc<Counters>,
    done: CancellationToken,
) -> String {
    let mut current = String::new();

    loop {
        tokio::select! {
            biased;

            update = rx.recv() => match update {
                Some(update) => {
                    if let Some(label) = update.label {
                        current = label;
                    }
                    snapshot_tx.send_replace(counters.snapshot(current.clone()));
                }
                None => break,
            },

            _ = done.cancelled() => {
                rx.close();
                while let Ok(update) = rx.try_recv() {
                    if let Some(label) = update.label {
                        current = label;
                    }
                }
                break;
            }
        }
    }

    snapshot_tx.send_replace(counters.snapshot(current.clone()));
    current
}

/// Exponential moving average of processed units per second
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    alpha: f64,
    ema: Option<f64>,
    last_processed: u64,
    last_elapsed: Duration,
}

impl ThroughputMeter {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            ema: None,
            last_processed: 0,
            last_elapsed: Duration::ZERO,
        }
    }

    /// Feed one sample and return the smoothed speed (units/s)
    pub fn sample(&mut self, processed: u64, elapsed: Duration) -> f64 {
        let dt = elapsed.saturating_sub(self.last_elapsed).as_secs_f64();
        if dt <= 0.0 {
            return self.speed();
        }

        let instant = processed.saturating_sub(self.last_processed) as f64 / dt;
        self.ema = Some(match self.ema {
            None => instant,
            Some(prev) => self.alpha * instant + (1.0 - self.alpha) * prev,
        });
        self.last_processed = processed;
        self.last_elapsed = elapsed;
        self.speed()
    }

    pub fn speed(&self) -> f64 {
        self.ema.unwrap_or(0.0)
    }
}

/// Remaining time: remaining percent x (elapsed / percent so far)
pub fn estimate_eta(percent: f64, elapsed: Duration) -> Option<Duration> {
    if percent <= 0.0 {
        return None;
    }
    let remaining = (100.0 - percent).max(0.0);
    Some(Duration::from_secs_f64(remaining * (elapsed.as_secs_f64() / percent)))
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else {
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

/// One status line
pub fn render_line(snapshot: &ProgressSnapshot, speed: f64, eta: Option<Duration>) -> String {
    let eta = eta.map(format_duration).unwrap_or_else(|| "--:--".to_string());
    format!(
        "[{:5.1}%] {}/{} units | {} records | {} retries | {} errors | {:.1} units/s | ETA {} | {}",
        snapshot.percent(),
        snapshot.processed_units,
        snapshot.total_units,
        snapshot.records,
        snapshot.retries,
        snapshot.errors,
        speed,
        eta,
        snapshot.current
    )
}

async fn render_loop<W: Write>(
    mut out: W,
    counters: Arc<Counters>,
    snapshots: watch::Receiver<ProgressSnapshot>,
    interval: Duration,
    done: CancellationToken,
) {
    let started = Instant::now();
    let mut meter = ThroughputMeter::new(EMA_ALPHA);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        let finished = tokio::select! {
            _ = done.cancelled() => true,
            _ = ticker.tick() => false,
        };

        let snapshot = counters.snapshot(snapshots.borrow().current.clone());
        let elapsed = started.elapsed();
        let speed = meter.sample(snapshot.processed_units, elapsed);
        let line = render_line(&snapshot, speed, estimate_eta(snapshot.percent(), elapsed));

        // Display errors are ignored; progress output must never affect the run
        let _ = queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine), Print(line));
        if finished {
            let _ = writeln!(out);
        }
        let _ = out.flush();

        if finished {
            break;
        }
    }
}
