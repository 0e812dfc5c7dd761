use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static SUBMISSIONS_TOTAL: OnceLock<IntCounter> = OnceLock::new();
static FORWARDS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn register_collector<T>(collector: T) -> T
where
    T: prometheus::core::Collector + Clone + 'static,
{
    let _ = registry().register(Box::new(collector.clone()));
    collector
}

fn http_requests_total() -> &'static IntCounterVec {
    HTTP_REQUESTS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new("survey_http_requests_total", "Survey HTTP request count."),
                &["route", "method", "status"],
            )
            .expect("create survey_http_requests_total"),
        )
    })
}

fn http_request_duration_seconds() -> &'static HistogramVec {
    HTTP_REQUEST_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "survey_http_request_duration_seconds",
                    "Survey HTTP request duration in seconds.",
                )
                .buckets(vec![
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ]),
                &["route", "method", "outcome"],
            )
            .expect("create survey_http_request_duration_seconds"),
        )
    })
}

fn submissions_total() -> &'static IntCounter {
    SUBMISSIONS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounter::new("survey_submissions_total", "Survey responses stored.")
                .expect("create survey_submissions_total"),
        )
    })
}

fn forwards_total() -> &'static IntCounterVec {
    FORWARDS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new("survey_forwards_total", "Survey response forwards by outcome."),
                &["outcome"],
            )
            .expect("create survey_forwards_total"),
        )
    })
}

pub fn observe_http_request(route: &str, method: &str, status: u16, duration: Duration) {
    let status_str = status.to_string();
    http_requests_total()
        .with_label_values(&[route, method, status_str.as_str()])
        .inc();

    let outcome = if (200..400).contains(&status) {
        "success"
    } else {
        "error"
    };
    http_request_duration_seconds()
        .with_label_values(&[route, method, outcome])
        .observe(duration.as_secs_f64());
}

pub fn inc_submission() {
    submissions_total().inc();
}

pub fn observe_forward(outcome: &str) {
    forwards_total().with_label_values(&[outcome]).inc();
}

pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let _ = submissions_total();
    let _ = forwards_total();

    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_observed_series() {
        observe_http_request("/submit", "POST", 200, Duration::from_millis(3));
        inc_submission();

        let (body, content_type) = render().expect("render should succeed");
        let text = String::from_utf8(body).expect("metrics are utf-8");
        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("survey_http_requests_total"));
        assert!(text.contains("survey_submissions_total"));
    }
}
