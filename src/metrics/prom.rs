use lazy_static::lazy_static;
use log::{debug, warn};
use prometheus::{labels, register_gauge, Gauge};

use sanchecker::Trace;

lazy_static! {
    static ref SANCHECKER_CERTIFICATE_MATCH: Gauge = register_gauge!(
        "sanchecker_certificate_match",
        "1 when the SAN host presents the source certificate"
    )
    .unwrap();
    static ref SANCHECKER_DAYS_BEFORE_EXPIRED: Gauge =
        register_gauge!("sanchecker_days_before_expired", "days before expiration").unwrap();
}

/// Pushes one sample per probe result to a Prometheus Push Gateway.
/// # Arguments
/// * `trace` - Finished trace
/// * `prometheus_address` - Push gateway base address
pub fn prometheus_metrics(trace: &Trace, prometheus_address: &str) {
    for result in trace.results.iter() {
        SANCHECKER_CERTIFICATE_MATCH.set(if result.is_match { 1.0 } else { 0.0 });
        SANCHECKER_DAYS_BEFORE_EXPIRED.set(f64::from(result.validity_days));

        let metric_families = prometheus::gather();
        let prometheus_client = prometheus::push_metrics(
            "sanchecker",
            labels! {
                "instance".to_owned() => "sanchecker".to_owned(),
                "source".to_owned() => trace.source.hostname.to_owned(),
                "source_thumbprint".to_owned() => trace.source.thumbprint.to_owned(),
                "host".to_owned() => result.hostname.to_owned(),
                "port".to_owned() => result.port.to_string(),
                "thumbprint".to_owned() => result.thumbprint.to_owned(),
                "expired".to_owned() => result.is_expired.to_string(),
            },
            &format!("{}/metrics/job", prometheus_address),
            metric_families,
            None,
        );

        match prometheus_client {
            Ok(_) => debug!(
                "Pushed metrics for {}:{} to {}",
                result.hostname, result.port, prometheus_address
            ),
            Err(e) => warn!("Failed to push metrics to prometheus: {}", e),
        }
    }
}
