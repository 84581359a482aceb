// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Reconciliation drivers. Each driver fetches the current state of one kind of entity from the
//! chain, as of a fixed height, and writes it through the batch writer so that the store's write
//! policies decide what supersedes what. Drivers are idempotent: running one again at the same or
//! a lower height changes nothing.

use std::{future::Future, sync::Arc, time::Instant};

use anyhow::Context as _;
use ledger_indexer_framework::{
    pagination::{self, Page, PageRequest},
    store::Connection as _,
    BatchWriter, DispatchReport, Dispatcher, Record, Statement, Store,
};
use tracing::debug;

use crate::{address::Bech32Prefixes, client::ChainClient, metrics::IndexerMetrics};

pub mod bank;
pub mod distribution;
pub mod genesis;
pub mod gov;
pub mod staking;

/// How one run of a fanned-out driver went.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Units of work that ran to completion.
    pub succeeded: usize,
    /// Keys of the units that failed.
    pub failed: Vec<String>,
    /// Units that never reported back.
    pub cancelled: usize,
    /// Rows the store reported as inserted, updated or deleted.
    pub affected: usize,
}

impl Summary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.cancelled == 0
    }

    /// Summarize a dispatch whose units each wrote their own rows.
    pub fn of<K: ToString>(report: DispatchReport<K, usize>) -> Self {
        let mut summary = Summary {
            cancelled: report.cancelled,
            ..Summary::default()
        };
        for (key, outcome) in report.outcomes {
            match outcome {
                Ok(affected) => {
                    summary.succeeded += 1;
                    summary.affected += affected;
                }
                Err(_) => summary.failed.push(key.to_string()),
            }
        }

        summary
    }
}

/// Everything a driver needs: where to read from, where to write to, and how.
pub struct Context<S: Store, C: ChainClient> {
    pub store: S,
    pub client: Arc<C>,
    pub writer: BatchWriter,
    pub dispatcher: Dispatcher,
    pub page_size: u64,
    pub prefixes: Bech32Prefixes,
    pub metrics: Arc<IndexerMetrics>,
}

impl<S: Store, C: ChainClient> Context<S, C> {
    /// Write `records` in as many statements as the writer needs. Earlier statements stay
    /// written if a later one fails.
    pub async fn write<R: Record>(&self, records: &[R]) -> anyhow::Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let table = R::TABLE;
        let statements = self.writer.upserts(records)?;
        let mut conn = self.store.connect().await?;

        let mut affected = 0;
        for (i, statement) in statements.iter().enumerate() {
            let n = conn.execute(statement).await.with_context(|| {
                format!(
                    "Failed to write chunk {} of {} to {}",
                    i + 1,
                    statements.len(),
                    table.name
                )
            })?;

            affected += n;
            self.metrics.record_write(table.name, 1, statement.len(), n);
        }

        debug!(
            table = table.name,
            rows = records.len(),
            affected,
            statements = statements.len(),
            "Wrote records"
        );

        Ok(affected)
    }

    /// Run `statements` in one transaction.
    pub async fn write_atomic(&self, statements: Vec<Statement>) -> anyhow::Result<usize> {
        if statements.is_empty() {
            return Ok(0);
        }

        let mut conn = self.store.connect().await?;
        let affected = conn.execute_atomic(&statements).await?;

        // The store only reports a total for the transaction, so rows are attributed to tables
        // without distinguishing stale ones.
        for statement in &statements {
            let table = statement.table().name;
            self.metrics
                .total_statements
                .with_label_values(&[table])
                .inc();
        }

        debug!(statements = statements.len(), affected, "Committed transaction");
        Ok(affected)
    }

    /// Upsert statements for `records`, to be combined with others in [Self::write_atomic].
    pub fn upserts<R: Record>(&self, records: &[R]) -> anyhow::Result<Vec<Statement>> {
        Ok(self.writer.upserts(records)?)
    }

    /// Drain the paginated query `fetch` with the configured page size, counting pages under
    /// `query`.
    pub async fn fetch_all<T, E, F, Fut>(
        &self,
        query: &'static str,
        mut fetch: F,
    ) -> anyhow::Result<Vec<T>>
    where
        F: FnMut(PageRequest) -> Fut,
        Fut: Future<Output = Result<Page<T>, E>>,
        E: Into<anyhow::Error>,
    {
        let pages = self.metrics.total_pages_fetched.with_label_values(&[query]);
        pagination::fetch_all(self.page_size, |request| {
            pages.inc();
            fetch(request)
        })
        .await
        .with_context(|| format!("Failed to fetch {query}"))
    }

    /// Run one fetch-and-persist task per unit under the dispatcher, counting failures under
    /// `driver`.
    pub async fn dispatch<K, T, F, Fut>(
        &self,
        driver: &'static str,
        units: impl IntoIterator<Item = K>,
        f: F,
    ) -> DispatchReport<K, T>
    where
        K: Clone + std::fmt::Debug + Send + 'static,
        T: Send + 'static,
        F: FnMut(K) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let report = self.dispatcher.dispatch(driver, units, f).await;

        let failures = report.failed().count() + report.cancelled;
        self.metrics
            .total_dispatch_failures
            .with_label_values(&[driver])
            .inc_by(failures as u64);

        report
    }
}

/// Time a driver run under `driver`, regardless of whether it succeeds.
pub(crate) async fn timed<T>(
    metrics: &IndexerMetrics,
    driver: &'static str,
    run: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    let started = Instant::now();
    let result = run.await;
    metrics
        .driver_latency
        .with_label_values(&[driver])
        .observe(started.elapsed().as_secs_f64());
    result
}
