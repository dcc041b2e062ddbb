//! Prometheus metrics for the task API and the collection cache.
//!
//! The recorder is pull-based: `/api/metrics` renders the global handle.
//! HTTP series are labelled by route template, so task ids never become
//! label values.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "taskplatform_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "taskplatform_http_request_duration_seconds";
    pub const CACHE_LOOKUPS_TOTAL: &str = "taskplatform_cache_lookups_total";
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "taskplatform_cache_invalidations_total";
}

/// Latency buckets in seconds; a cache hit sits in the first few.
const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];

fn builder() -> PrometheusBuilder {
    let matcher = Matcher::Full(names::HTTP_REQUEST_DURATION_SECONDS.to_string());
    match PrometheusBuilder::new().set_buckets_for_metric(matcher, LATENCY_BUCKETS) {
        Ok(builder) => builder,
        Err(e) => {
            tracing::warn!(error = %e, "latency buckets rejected; using summaries");
            PrometheusBuilder::new()
        }
    }
}

/// Installs the global recorder once. Later calls are no-ops.
pub fn init_metrics() {
    PROMETHEUS_HANDLE.get_or_init(|| {
        let recorder = builder().build_recorder();
        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("another metrics recorder is installed; /api/metrics will be empty");
        } else {
            tracing::info!("Prometheus metrics initialized");
        }
        handle
    });
}

/// Prometheus text exposition, or `None` before [`init_metrics`].
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}

pub fn record_http_request(method: &str, route: &str, status: u16, duration: Duration) {
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Snapshot lookups per cache backend, split by `result="hit"|"miss"`.
pub fn record_cache_lookup(backend: &'static str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(names::CACHE_LOOKUPS_TOTAL, "backend" => backend, "result" => result).increment(1);
}

pub fn record_cache_invalidation(backend: &'static str) {
    counter!(names::CACHE_INVALIDATIONS_TOTAL, "backend" => backend).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_with(f: impl FnOnce()) -> String {
        let recorder = builder().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, f);
        handle.render()
    }

    #[test]
    fn test_http_requests_are_labelled_by_route() {
        let text = render_with(|| {
            record_http_request("GET", "/api/tasks/{id}", 404, Duration::from_millis(3));
        });
        assert!(text.contains(names::HTTP_REQUESTS_TOTAL));
        assert!(text.contains(r#"route="/api/tasks/{id}""#));
        assert!(text.contains(r#"status="404""#));
        assert!(text.contains("taskplatform_http_request_duration_seconds_bucket"));
    }

    #[test]
    fn test_cache_lookups_split_by_result() {
        let text = render_with(|| {
            record_cache_lookup("local", false);
            record_cache_lookup("local", true);
            record_cache_lookup("local", true);
            record_cache_invalidation("redis");
        });
        let sample = |needle: &str| {
            text.lines()
                .find(|line| line.contains(needle))
                .and_then(|line| line.rsplit(' ').next())
                .map(str::to_owned)
        };
        assert_eq!(sample(r#"result="hit""#).as_deref(), Some("2"));
        assert_eq!(sample(r#"result="miss""#).as_deref(), Some("1"));
        assert_eq!(
            sample(r#"taskplatform_cache_invalidations_total{backend="redis"}"#).as_deref(),
            Some("1")
        );
    }
}
