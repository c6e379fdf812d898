//! # Prometheus Metrics
//!
//! Exposes operational metrics for the wallet core. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! Gauges are sampled from the core's state by the maintenance loop;
//! counters track the loop's own work. All metrics are registered in a
//! dedicated [`prometheus::Registry`] so they do not collide with any
//! default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it
/// can be shared across the metrics server and the maintenance loop.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Number of open wallets.
    pub open_wallets: IntGauge,
    /// Number of rows in the transaction journal.
    pub journal_rows: IntGauge,
    /// Live idempotency records.
    pub idempotency_records: IntGauge,
    /// Currently active account locks.
    pub active_account_locks: IntGauge,
    /// Total rate-limit violations recorded since startup.
    pub rate_limit_violations: IntGauge,
    /// Maintenance sweeps completed.
    pub maintenance_sweeps_total: IntCounter,
    /// Idempotency records removed by TTL sweeps.
    pub idempotency_records_expired_total: IntCounter,
    /// Account locks released by expiry sweeps.
    pub expired_locks_released_total: IntCounter,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("vela".into()), None)
            .expect("failed to create prometheus registry");

        fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
            let g = IntGauge::new(name, help).expect("metric creation");
            registry.register(Box::new(g.clone())).expect("metric registration");
            g
        }

        fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
            let c = IntCounter::new(name, help).expect("metric creation");
            registry.register(Box::new(c.clone())).expect("metric registration");
            c
        }

        Self {
            open_wallets: gauge(&registry, "open_wallets", "Number of open wallets"),
            journal_rows: gauge(
                &registry,
                "journal_rows",
                "Rows in the append-only transaction journal",
            ),
            idempotency_records: gauge(
                &registry,
                "idempotency_records",
                "Live idempotency records awaiting TTL expiry",
            ),
            active_account_locks: gauge(
                &registry,
                "active_account_locks",
                "Currently active account locks",
            ),
            rate_limit_violations: gauge(
                &registry,
                "rate_limit_violations",
                "Rate-limit violations recorded since startup",
            ),
            maintenance_sweeps_total: counter(
                &registry,
                "maintenance_sweeps_total",
                "Maintenance sweeps completed since startup",
            ),
            idempotency_records_expired_total: counter(
                &registry,
                "idempotency_records_expired_total",
                "Idempotency records removed by TTL sweeps",
            ),
            expired_locks_released_total: counter(
                &registry,
                "expired_locks_released_total",
                "Account locks released by expiry sweeps",
            ),
            registry,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition
    /// format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers via state.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
