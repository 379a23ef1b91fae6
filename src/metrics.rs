use crate::{errors::WhoisError, lookup::LookupSource};
use axum::{http::StatusCode, response::IntoResponse};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);

            // Initialize metrics with zero values
            counter!("whois_requests_total", "tld" => "unknown").absolute(0);
            counter!("whois_cache_hits_total", "tier" => "volatile").absolute(0);
            counter!("whois_cache_hits_total", "tier" => "durable").absolute(0);
            counter!("whois_cache_misses_total").absolute(0);
            counter!("whois_errors_total", "error_type" => "unknown").absolute(0);
            histogram!("whois_request_duration_seconds").record(0.0);
        }
        Err(e) => {
            tracing::error!("Failed to install metrics recorder: {}", e);
        }
    }
}

pub fn increment_requests(domain: &str) {
    let tld = extract_tld(domain);
    counter!("whois_requests_total", "tld" => tld).increment(1);
}

pub fn increment_cache_hits(tier: &'static str) {
    counter!("whois_cache_hits_total", "tier" => tier).increment(1);
}

pub fn increment_cache_misses() {
    counter!("whois_cache_misses_total").increment(1);
}

pub fn increment_errors(error_type: &str) {
    counter!("whois_errors_total", "error_type" => error_type.to_string()).increment(1);
}

pub fn record_query_time(duration_ms: u64) {
    let duration_seconds = duration_ms as f64 / 1000.0;
    histogram!("whois_request_duration_seconds").record(duration_seconds);
}

/// Record the outcome and latency of one lookup request, whichever tier
/// answered it or however it failed.
pub fn record_lookup(outcome: Result<LookupSource, &WhoisError>, duration_ms: u64) {
    match outcome {
        Ok(LookupSource::Origin) => increment_cache_misses(),
        Ok(source) => increment_cache_hits(source.as_str()),
        Err(e) => increment_errors(e.kind()),
    }
    record_query_time(duration_ms);
}

pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics not initialized".to_string()),
    }
}

fn extract_tld(domain: &str) -> String {
    domain
        .rsplit('.')
        .next()
        .filter(|tld| !tld.is_empty())
        .unwrap_or("unknown")
        .to_lowercase()
}
