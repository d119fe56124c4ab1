use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Call once at startup; without it the
/// counters below are no-ops.
pub fn init_metrics() -> Result<(), AppError> {
    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))
    })?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| AppError::ConfigError(anyhow::anyhow!("Metrics already initialized")))
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_coupon_issued(tier_name: &str) {
    counter!("loyalty_coupons_issued_total", "tier" => tier_name.to_string()).increment(1);
}

pub fn record_code_collision() {
    counter!("loyalty_code_collisions_total").increment(1);
}

pub fn record_order_event(outcome: &'static str) {
    counter!("loyalty_order_events_total", "outcome" => outcome).increment(1);
}

pub fn record_coupons_expired(count: u64) {
    counter!("loyalty_coupons_expired_total").increment(count);
}
