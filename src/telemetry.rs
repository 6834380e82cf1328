use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;

/// Installs the global Prometheus recorder. `None` when one is already set.
pub fn install_recorder() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            describe();
            Some(handle)
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
            None
        }
    }
}

fn describe() {
    describe_counter!("check_url_requests_total", "URL checks received");
    describe_counter!("check_url_verdicts_total", "Classifier verdicts by status");
    describe_counter!("lookup_failures_total", "WHOIS and DNS lookups that fell back to defaults");
    describe_histogram!("check_url_duration_ms", Unit::Milliseconds, "End-to-end URL check latency");
}
