//! # Prometheus Metrics
//!
//! HTTP request counters and latency histograms are recorded by
//! [`metrics_middleware`]. Domain gauges (applications by status, programs,
//! change feed position) are refreshed on each `/metrics` scrape by the
//! handler in `lib.rs`.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use prometheus::core::Collector;
use prometheus::{
    Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};

/// Request and domain metrics registered on a private Prometheus registry.
#[derive(Clone)]
pub struct ApiMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,

    requests: IntCounterVec,
    latency: HistogramVec,
    failures: IntCounterVec,

    applications_total: GaugeVec,
    programs_active: Gauge,
    change_feed_sequence: Gauge,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics")
            .field("request_count", &self.request_count())
            .field("failure_count", &self.failure_count())
            .finish_non_exhaustive()
    }
}

/// Upload requests carry whole files, so the upper buckets go past the
/// usual API latencies.
const LATENCY_BUCKETS: [f64; 10] = [0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0, 30.0];

impl ApiMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("admit_http_requests_total", "HTTP requests by route and status"),
            &["method", "route", "status"],
        )
        .expect("metric can be created");

        let latency = HistogramVec::new(
            HistogramOpts::new(
                "admit_http_request_duration_seconds",
                "Time from request receipt to response, by route",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["method", "route"],
        )
        .expect("metric can be created");

        let failures = IntCounterVec::new(
            Opts::new(
                "admit_http_errors_total",
                "HTTP responses with a 4xx or 5xx status, by class",
            ),
            &["method", "route", "class"],
        )
        .expect("metric can be created");

        let applications_total = GaugeVec::new(
            Opts::new("admit_applications_total", "Applications by status"),
            &["status"],
        )
        .expect("metric can be created");

        let programs_active = Gauge::new(
            "admit_programs_active",
            "Programs currently listed as active",
        )
        .expect("metric can be created");

        let change_feed_sequence = Gauge::new(
            "admit_change_feed_sequence",
            "Sequence number of the newest change feed event",
        )
        .expect("metric can be created");

        let collectors: [Box<dyn Collector>; 6] = [
            Box::new(requests.clone()),
            Box::new(latency.clone()),
            Box::new(failures.clone()),
            Box::new(applications_total.clone()),
            Box::new(programs_active.clone()),
            Box::new(change_feed_sequence.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .expect("metric can be registered");
        }

        Self {
            inner: Arc::new(Inner {
                registry,
                requests,
                latency,
                failures,
                applications_total,
                programs_active,
                change_feed_sequence,
            }),
        }
    }

    /// Requests observed so far, summed over every route.
    pub fn request_count(&self) -> u64 {
        sum_counter(&self.inner.requests)
    }

    /// Client and server failures observed so far.
    pub fn failure_count(&self) -> u64 {
        sum_counter(&self.inner.failures)
    }

    fn observe(&self, method: &str, route: &str, status: u16, elapsed_secs: f64) {
        let code = status.to_string();
        self.inner
            .requests
            .with_label_values(&[method, route, &code])
            .inc();
        self.inner
            .latency
            .with_label_values(&[method, route])
            .observe(elapsed_secs);

        let class = match status {
            400..=499 => "client",
            500..=599 => "server",
            _ => return,
        };
        self.inner
            .failures
            .with_label_values(&[method, route, class])
            .inc();
    }

    pub fn applications_total(&self) -> &GaugeVec {
        &self.inner.applications_total
    }

    pub fn programs_active(&self) -> &Gauge {
        &self.inner.programs_active
    }

    pub fn change_feed_sequence(&self) -> &Gauge {
        &self.inner.change_feed_sequence
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn gather_and_encode(&self) -> Result<String, String> {
        let mut body = Vec::new();
        TextEncoder::new()
            .encode(&self.inner.registry.gather(), &mut body)
            .map_err(|e| format!("failed to encode metrics: {e}"))?;
        String::from_utf8(body).map_err(|e| format!("metrics are not valid UTF-8: {e}"))
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn sum_counter(counter: &IntCounterVec) -> u64 {
    counter
        .collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}

/// Route template for a request path: UUID segments become `{id}`.
fn route_of(path: &str) -> String {
    path.split('/')
        .map(|segment| match uuid::Uuid::try_parse(segment) {
            Ok(_) => "{id}",
            Err(_) => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Count and time every request that reaches the API router.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let Some(metrics) = request.extensions().get::<ApiMetrics>().cloned() else {
        return next.run(request).await;
    };
    let method = request.method().clone();
    let route = route_of(request.uri().path());
    let started = Instant::now();

    let response = next.run(request).await;
    metrics.observe(
        method.as_str(),
        &route,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}
