// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{net::SocketAddr, sync::Arc};

use axum::{http::StatusCode, routing::get, Extension, Router};
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry, HistogramVec, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Histogram buckets for the time it takes a driver to run once, in seconds.
const DRIVER_LATENCY_SEC_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
];

#[derive(Clone)]
pub struct IndexerMetrics {
    pub total_rows_written: IntCounterVec,
    pub total_stale_rows: IntCounterVec,
    pub total_statements: IntCounterVec,
    pub total_pages_fetched: IntCounterVec,
    pub total_dispatch_failures: IntCounterVec,
    pub driver_latency: HistogramVec,
    pub latest_height: IntGauge,
}

/// A service that exposes prometheus metrics over HTTP on a "/metrics" route on the provided
/// listen address.
pub struct MetricsService {
    addr: SocketAddr,
    registry: Registry,
    cancel: CancellationToken,
}

impl IndexerMetrics {
    pub fn new(registry: &Registry) -> Arc<Self> {
        Arc::new(Self {
            total_rows_written: register_int_counter_vec_with_registry!(
                "indexer_total_rows_written",
                "Number of rows inserted or updated, by table",
                &["table"],
                registry,
            )
            .unwrap(),
            total_stale_rows: register_int_counter_vec_with_registry!(
                "indexer_total_stale_rows",
                "Number of rows skipped because the store already held an equal or newer observation, by table",
                &["table"],
                registry,
            )
            .unwrap(),
            total_statements: register_int_counter_vec_with_registry!(
                "indexer_total_statements",
                "Number of statements issued to the store, by table",
                &["table"],
                registry,
            )
            .unwrap(),
            total_pages_fetched: register_int_counter_vec_with_registry!(
                "indexer_total_pages_fetched",
                "Number of pages requested from the chain, by query",
                &["query"],
                registry,
            )
            .unwrap(),
            total_dispatch_failures: register_int_counter_vec_with_registry!(
                "indexer_total_dispatch_failures",
                "Number of units of work that failed, by driver",
                &["driver"],
                registry,
            )
            .unwrap(),
            driver_latency: register_histogram_vec_with_registry!(
                "indexer_driver_latency",
                "Time taken by one run of a driver",
                &["driver"],
                DRIVER_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            latest_height: register_int_gauge_with_registry!(
                "indexer_latest_height",
                "Height of the most recent block handled",
                registry,
            )
            .unwrap(),
        })
    }

    /// Account for `rows` records written to `table` in `statements` statements, of which
    /// `affected` took effect.
    pub(crate) fn record_write(&self, table: &str, statements: usize, rows: usize, affected: usize) {
        self.total_statements
            .with_label_values(&[table])
            .inc_by(statements as u64);
        self.total_rows_written
            .with_label_values(&[table])
            .inc_by(affected as u64);
        self.total_stale_rows
            .with_label_values(&[table])
            .inc_by(rows.saturating_sub(affected) as u64);
    }
}

impl MetricsService {
    /// Create a new instance of the service, listening on `addr`, serving metrics from the
    /// `registry`. The service will shut down if the provided `cancel` token is cancelled.
    ///
    /// The service will not be run until [Self::run] is called.
    pub fn new(addr: SocketAddr, registry: Registry, cancel: CancellationToken) -> Self {
        Self {
            addr,
            registry,
            cancel,
        }
    }

    /// Add metrics to this registry to serve them from this service.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Start the service. The service will run until the cancellation token is triggered.
    pub async fn run(self) -> anyhow::Result<JoinHandle<()>> {
        let Self {
            addr,
            registry,
            cancel,
        } = self;

        let listener = TcpListener::bind(&addr).await?;
        let app = Router::new()
            .route("/metrics", get(metrics))
            .layer(Extension(registry));

        Ok(tokio::spawn(async move {
            info!("Starting metrics service on {}", addr);
            let shutdown = async move {
                cancel.cancelled().await;
                info!("Shutdown received, shutting down metrics service");
            };

            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!("Metrics service failed: {e}");
            }
        }))
    }
}

/// Route handler for metrics service
async fn metrics(Extension(registry): Extension<Registry>) -> (StatusCode, String) {
    match TextEncoder.encode_to_string(&registry.gather()) {
        Ok(s) => (StatusCode::OK, s),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("unable to encode metrics: {e}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Metrics registered against a throwaway registry.
    fn test_metrics() -> Arc<IndexerMetrics> {
        IndexerMetrics::new(&Registry::new())
    }

    #[test]
    fn stale_rows_are_the_ones_not_affected() {
        let metrics = test_metrics();
        metrics.record_write("account_balance", 2, 10, 7);

        let label = &["account_balance"];
        assert_eq!(metrics.total_statements.with_label_values(label).get(), 2);
        assert_eq!(metrics.total_rows_written.with_label_values(label).get(), 7);
        assert_eq!(metrics.total_stale_rows.with_label_values(label).get(), 3);
    }
}
