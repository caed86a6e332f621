// Prometheus metrics for the admission service
//
// Exposes metrics on /metrics HTTP endpoint:
// - Admission decisions by action and outcome (counter)
// - Admission check latency (histogram)
// - Tracked tenants and client IPs (gauge)
// - Entries evicted by the reclaimer (counter)

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use crate::rate_limit::{RateLimitDecision, ReclaimReport, RegistrySummary};

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref ADMISSION_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("admission_decisions_total", "Admission decisions by action and outcome"),
        &["action", "outcome"]
    ).expect("Failed to create admission decisions metric");

    pub static ref ADMISSION_CHECK_DURATION_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("admission_check_duration_seconds", "Time spent in an admission check, lock wait included")
            .buckets(vec![0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05]),
    ).expect("Failed to create admission check duration metric");

    pub static ref TRACKED_TENANTS: IntGauge = IntGauge::new(
        "admission_tracked_tenants",
        "Tenant buckets currently held in memory"
    ).expect("Failed to create tracked tenants metric");

    pub static ref TRACKED_CLIENT_IPS: IntGauge = IntGauge::new(
        "admission_tracked_client_ips",
        "Unauthenticated client IP counters currently held in memory"
    ).expect("Failed to create tracked client IPs metric");

    pub static ref RECLAIMED_ENTRIES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("admission_reclaimed_entries_total", "Entries evicted by the stale-bucket sweep"),
        &["kind"]
    ).expect("Failed to create reclaimed entries metric");
}

/// Initialize metrics registry
///
/// Safe to call more than once; already-registered collectors are skipped.
pub fn init() -> prometheus::Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ADMISSION_DECISIONS_TOTAL.clone()),
        Box::new(ADMISSION_CHECK_DURATION_SECONDS.clone()),
        Box::new(TRACKED_TENANTS.clone()),
        Box::new(TRACKED_CLIENT_IPS.clone()),
        Box::new(RECLAIMED_ENTRIES_TOTAL.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Record the outcome of one admission check
pub fn record_decision(decision: &RateLimitDecision) {
    let outcome = if decision.allowed { "allowed" } else { "denied" };
    ADMISSION_DECISIONS_TOTAL
        .with_label_values(&[decision.action.as_str(), outcome])
        .inc();
}

/// Publish the current registry size
///
/// Called at scrape time so the gauges never lag behind the registry.
pub fn record_registry_size(summary: &RegistrySummary) {
    TRACKED_TENANTS.set(summary.tracked_tenants as i64);
    TRACKED_CLIENT_IPS.set(summary.tracked_ips as i64);
}

/// Count the entries evicted by one sweep
pub fn record_reclaim(report: &ReclaimReport) {
    for (kind, evicted) in [
        ("tenant", report.tenants),
        ("action_counter", report.action_counters),
        ("client_ip", report.ips),
    ] {
        RECLAIMED_ENTRIES_TOTAL
            .with_label_values(&[kind])
            .inc_by(evicted as u64);
    }
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
