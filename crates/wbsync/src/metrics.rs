//! Sync counters and outbound HTTP metrics, rendered in Prometheus text format.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};

/// Histogram bucket upper bounds for request durations, in seconds.
pub const DURATION_BUCKETS: [f64; 6] = [0.1, 0.5, 1.0, 2.0, 5.0, 10.0];

/// Per-sync item counters. Lock-free; shared between pipeline stages.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    dispatched: AtomicU64,
    processed: AtomicU64,
    updated: AtomicU64,
    errored: AtomicU64,
}

/// Point-in-time copy of [`SyncMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub dispatched: u64,
    pub processed: u64,
    pub updated: u64,
    pub errored: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_updated(&self, count: u64) {
        self.updated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_errored(&self, count: u64) {
        self.errored.fetch_add(count, Ordering::Relaxed);
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn updated(&self) -> u64 {
        self.updated.load(Ordering::Relaxed)
    }

    pub fn errored(&self) -> u64 {
        self.errored.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
        }
    }

    /// Add a finished sync's counters into these process-wide totals.
    pub fn absorb(&self, snapshot: MetricsSnapshot) {
        self.dispatched.fetch_add(snapshot.dispatched, Ordering::Relaxed);
        self.processed.fetch_add(snapshot.processed, Ordering::Relaxed);
        self.updated.fetch_add(snapshot.updated, Ordering::Relaxed);
        self.errored.fetch_add(snapshot.errored, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RequestLabels {
    method: &'static str,
    endpoint: String,
    status: &'static str,
}

#[derive(Debug, Default, Clone)]
struct RequestStats {
    count: u64,
    buckets: [u64; DURATION_BUCKETS.len()],
    sum_seconds: f64,
}

/// Request counters and duration histograms keyed by method, path and
/// status class.
#[derive(Debug, Default)]
pub struct HttpMetrics {
    requests: Mutex<BTreeMap<RequestLabels, RequestStats>>,
}

impl HttpMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, method: &'static str, endpoint: &str, status: &'static str, elapsed: Duration) {
        let seconds = elapsed.as_secs_f64();
        let labels = RequestLabels {
            method,
            endpoint: endpoint.to_string(),
            status,
        };

        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        let stats = requests.entry(labels).or_default();
        stats.count += 1;
        stats.sum_seconds += seconds;
        for (bucket, bound) in stats.buckets.iter_mut().zip(DURATION_BUCKETS) {
            if seconds <= bound {
                *bucket += 1;
            }
        }
    }

    /// Total requests recorded for a label set.
    pub fn request_count(&self, method: &str, endpoint: &str, status: &str) -> u64 {
        let requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        requests
            .iter()
            .filter(|(l, _)| l.method == method && l.endpoint == endpoint && l.status == status)
            .map(|(_, s)| s.count)
            .sum()
    }

    fn render_into(&self, out: &mut String) {
        let requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());

        out.push_str("# HELP http_requests_total Outbound HTTP requests.\n");
        out.push_str("# TYPE http_requests_total counter\n");
        for (labels, stats) in requests.iter() {
            let _ = writeln!(
                out,
                "http_requests_total{{{}}} {}",
                labels.render(),
                stats.count
            );
        }

        out.push_str("# HELP http_request_duration_seconds Outbound HTTP request duration.\n");
        out.push_str("# TYPE http_request_duration_seconds histogram\n");
        for (labels, stats) in requests.iter() {
            let rendered = labels.render();
            for (bound, count) in DURATION_BUCKETS.iter().zip(stats.buckets) {
                let _ = writeln!(
                    out,
                    "http_request_duration_seconds_bucket{{{rendered},le=\"{bound}\"}} {count}"
                );
            }
            let _ = writeln!(
                out,
                "http_request_duration_seconds_bucket{{{rendered},le=\"+Inf\"}} {}",
                stats.count
            );
            let _ = writeln!(
                out,
                "http_request_duration_seconds_sum{{{rendered}}} {}",
                stats.sum_seconds
            );
            let _ = writeln!(
                out,
                "http_request_duration_seconds_count{{{rendered}}} {}",
                stats.count
            );
        }
    }
}

impl RequestLabels {
    fn render(&self) -> String {
        format!(
            "method=\"{}\",endpoint=\"{}\",status=\"{}\"",
            self.method,
            escape_label(&self.endpoint),
            self.status
        )
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Status label for a response: `2xx`..`5xx`, or `error` for transport failures.
pub fn status_class(result: &Result<HttpResponse, HttpError>) -> &'static str {
    match result {
        Ok(response) => match response.status {
            200..=299 => "2xx",
            300..=399 => "3xx",
            400..=499 => "4xx",
            500..=599 => "5xx",
            _ => "error",
        },
        Err(_) => "error",
    }
}

fn endpoint_of(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

impl MetricsSnapshot {
    fn merged(self, other: Self) -> Self {
        Self {
            dispatched: self.dispatched + other.dispatched,
            processed: self.processed + other.processed,
            updated: self.updated + other.updated,
            errored: self.errored + other.errored,
        }
    }
}

/// Process-wide metrics: cumulative sync counters plus HTTP observations.
///
/// Counters of a run in progress are rendered alongside the totals of
/// finished runs.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Totals of finished runs.
    pub sync: SyncMetrics,
    pub http: HttpMetrics,
    live: Mutex<Vec<Arc<SyncMetrics>>>,
}

impl MetricsRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Counters for a new run, visible in [`render`](Self::render) until
    /// [`end_run`](Self::end_run).
    pub fn begin_run(&self) -> Arc<SyncMetrics> {
        let run = Arc::new(SyncMetrics::new());
        self.live
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(&run));
        run
    }

    /// Fold a finished run into the totals and return its final counts.
    pub fn end_run(&self, run: &Arc<SyncMetrics>) -> MetricsSnapshot {
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.retain(|m| !Arc::ptr_eq(m, run));
        let snapshot = run.snapshot();
        self.sync.absorb(snapshot);
        snapshot
    }

    /// Finished totals plus every run in progress.
    pub fn totals(&self) -> MetricsSnapshot {
        let live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.iter()
            .map(|run| run.snapshot())
            .fold(self.sync.snapshot(), MetricsSnapshot::merged)
    }

    /// Render every metric in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let snapshot = self.totals();
        for (name, help, value) in [
            ("wbsync_items_dispatched_total", "Items dispatched by discovery.", snapshot.dispatched),
            ("wbsync_items_processed_total", "Items processed by workers.", snapshot.processed),
            ("wbsync_items_updated_total", "Items accepted by the marketplace.", snapshot.updated),
            ("wbsync_items_errored_total", "Items skipped or rejected.", snapshot.errored),
        ] {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {value}");
        }
        self.http.render_into(&mut out);
        out
    }
}

/// Transport decorator that records every request in [`HttpMetrics`].
pub struct MeteredTransport {
    inner: Arc<dyn HttpTransport>,
    registry: Arc<MetricsRegistry>,
}

impl MeteredTransport {
    pub fn new(inner: Arc<dyn HttpTransport>, registry: Arc<MetricsRegistry>) -> Self {
        Self { inner, registry }
    }
}

#[async_trait]
impl HttpTransport for MeteredTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let method = request.method.as_str();
        let endpoint = endpoint_of(&request.url);
        let started = Instant::now();

        let result = self.inner.send(request).await;

        self.registry
            .http
            .observe(method, &endpoint, status_class(&result), started.elapsed());
        result
    }
}
