//! Telemetry module for MyQ Home
//!
//! Provides Prometheus metrics for logins, provider calls and token issuance.

use crate::{MyqHomeError, Result};
use once_cell::sync::Lazy;
use prometheus::{CounterVec, Encoder, TextEncoder, register_counter_vec};

/// Login bridge outcomes
static LOGINS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "myq_home_logins_total",
        "Total number of login bridge submissions",
        &["outcome"]
    )
    .unwrap()
});

/// External provider logins, by stage (login or gate) and return code
static PROVIDER_LOGINS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "myq_home_provider_logins_total",
        "Total number of logins against the external provider",
        &["stage", "return_code"]
    )
    .unwrap()
});

/// Token endpoint issuance
static TOKENS_ISSUED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "myq_home_tokens_issued_total",
        "Total number of token pairs issued",
        &["grant_type"]
    )
    .unwrap()
});

/// Record a login bridge outcome (`rejected`, `failed`, `success`, `error`)
pub fn record_login(outcome: &str) {
    LOGINS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a provider login
pub fn record_provider_login(stage: &str, return_code: i64) {
    PROVIDER_LOGINS_TOTAL
        .with_label_values(&[stage, &return_code.to_string()])
        .inc();
}

/// Record an issued token pair
pub fn record_token_issued(grant_type: &str) {
    TOKENS_ISSUED_TOTAL.with_label_values(&[grant_type]).inc();
}

/// Get Prometheus metrics in text format
pub fn get_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| MyqHomeError::config(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| MyqHomeError::config(format!("Failed to convert metrics to UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_metrics() {
        record_login("success");
        record_provider_login("gate", 0);
        record_token_issued("authorization_code");

        let metrics = get_metrics().unwrap();

        assert!(metrics.contains("myq_home_logins_total"));
        assert!(metrics.contains("myq_home_provider_logins_total"));
        assert!(metrics.contains("myq_home_tokens_issued_total"));
    }
}
