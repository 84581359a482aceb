// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{collections::BTreeSet, sync::Arc};

use anyhow::Context as _;
use chrono::NaiveDateTime;
use ledger_indexer_framework::{store::Connection as _, BatchWriter, Dispatcher, Store};
use prometheus::Registry;
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    address::Bech32Prefixes,
    client::ChainClient,
    config::{DriversConfig, IndexerConfig, SyncConfig},
    handlers::{bank, distribution, gov, staking, Context, Summary},
    metrics::IndexerMetrics,
    models::staking::DELEGATION,
};

pub mod address;
pub mod args;
pub mod client;
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod telemetry;
pub mod testing;
pub mod validator;

/// Keeps the store in sync with the chain. Per-block state (validators, voting power, pools,
/// evidence, proposals) is re-read whenever a new block is seen, and per-account state
/// (balances, delegations, rewards, votes) is re-read on a slower timer.
pub struct Indexer<S: Store, C: ChainClient> {
    ctx: Arc<Context<S, C>>,
    sync: SyncConfig,
    drivers: DriversConfig,
    cancel: CancellationToken,
}

impl<S: Store, C: ChainClient> Indexer<S, C> {
    pub fn new(
        store: S,
        client: C,
        config: IndexerConfig,
        registry: &Registry,
        cancel: CancellationToken,
    ) -> Self {
        let (sync, drivers) = config.finish();

        let ctx = Context {
            store,
            client: Arc::new(client),
            writer: BatchWriter::new(sync.max_bind_parameters),
            dispatcher: Dispatcher::new(sync.dispatch_concurrency),
            page_size: sync.page_size,
            prefixes: Bech32Prefixes::new(&sync.bech32_prefix),
            metrics: IndexerMetrics::new(registry),
        };

        Self {
            ctx: Arc::new(ctx),
            sync,
            drivers,
            cancel,
        }
    }

    pub fn context(&self) -> &Arc<Context<S, C>> {
        &self.ctx
    }

    /// Re-read everything that can change from one block to the next, as of `height`. Each
    /// driver runs even if an earlier one failed, and failures are logged.
    pub async fn handle_block(&self, height: i64, timestamp: NaiveDateTime) {
        let ctx = &self.ctx;
        ctx.metrics.latest_height.set(height);

        if self.drivers.staking {
            log(
                "validators",
                height,
                staking::refresh_validators(ctx, height, Some(timestamp)).await,
            );
            log(
                "voting power",
                height,
                staking::refresh_voting_power(ctx, height).await,
            );
            log(
                "staking pool",
                height,
                staking::refresh_staking_pool(ctx, height).await,
            );
        }

        if self.drivers.evidence {
            log(
                "double sign evidence",
                height,
                staking::refresh_double_sign_evidence(ctx, height).await,
            );
        }

        if self.drivers.bank {
            log("supply", height, bank::update_supply(ctx, height).await);
        }

        if self.drivers.distribution {
            log(
                "community pool",
                height,
                distribution::refresh_community_pool(ctx, height).await,
            );
        }

        if self.drivers.gov {
            match gov::refresh_proposals(ctx, height).await {
                Ok(proposals) => {
                    let voting = proposals
                        .into_iter()
                        .filter(|(_, status)| status == gov::VOTING_PERIOD)
                        .map(|(id, _)| id);

                    log_summary(
                        "tallies",
                        height,
                        gov::refresh_tallies(ctx, voting, height).await,
                    );
                }
                Err(e) => error!(height, "Failed to refresh proposals: {e:#}"),
            }
        }
    }

    /// Re-read every account, delegation, reward and vote the store knows about, as of
    /// `height`, the block produced at `timestamp`.
    pub async fn refresh(&self, height: i64, timestamp: NaiveDateTime) -> anyhow::Result<()> {
        let ctx = &self.ctx;
        info!(height, "Starting full refresh");

        if self.drivers.bank {
            log_summary(
                "balances",
                height,
                bank::refresh_all_balances(ctx, height).await,
            );
        }

        if self.drivers.staking || self.drivers.distribution {
            let operators: Vec<String> =
                staking::refresh_validators(ctx, height, Some(timestamp))
                    .await?
                    .into_iter()
                    .map(|v| v.operator_address)
                    .collect();

            let delegators = self.delegators().await?;

            if self.drivers.staking {
                log_summary(
                    "delegations",
                    height,
                    staking::refresh_delegations(ctx, operators.clone(), height).await,
                );
                log_summary(
                    "delegators",
                    height,
                    staking::refresh_delegators(ctx, delegators.clone(), height).await,
                );
            }

            if self.drivers.distribution {
                log_summary(
                    "commission",
                    height,
                    distribution::refresh_commission_amounts(ctx, operators, height).await,
                );
                log_summary(
                    "rewards",
                    height,
                    distribution::refresh_delegation_rewards(ctx, delegators, height).await,
                );
            }
        }

        if self.drivers.gov {
            let proposals = gov::refresh_proposals(ctx, height).await?;
            log_summary(
                "votes and deposits",
                height,
                gov::refresh_votes_and_deposits(
                    ctx,
                    proposals.into_iter().map(|(id, _)| id),
                    height,
                )
                .await,
            );
        }

        info!(height, "Finished full refresh");
        Ok(())
    }

    /// Start the block loop and the refresh loop. Both stop at their next suspension point once
    /// the cancellation token is triggered.
    pub fn run(self) -> JoinHandle<()> {
        let this = Arc::new(self);

        let h_blocks = tokio::spawn({
            let this = this.clone();
            async move { this.block_loop().await }
        });

        let h_refresh = tokio::spawn({
            let this = this.clone();
            async move { this.refresh_loop().await }
        });

        tokio::spawn(async move {
            let (blocks, refresh) = tokio::join!(h_blocks, h_refresh);
            if let Err(e) = blocks.and(refresh) {
                error!("Indexer task failed: {e}");
            }

            info!("Indexer stopped");
        })
    }

    async fn block_loop(&self) {
        let mut poll = interval(self.sync.block_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last = None;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Shutdown received, stopping block loop");
                    break;
                }

                _ = poll.tick() => {}
            }

            let block = match self.ctx.client.latest_block().await {
                Ok(block) => block,
                Err(e) => {
                    warn!("Failed to fetch latest block: {e}");
                    continue;
                }
            };

            if last.is_some_and(|h| h >= block.height) {
                continue;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.handle_block(block.height, block.time.naive_utc()) => {}
            }

            last = Some(block.height);
        }
    }

    async fn refresh_loop(&self) {
        let mut timer = interval(self.sync.refresh_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Shutdown received, stopping refresh loop");
                    break;
                }

                _ = timer.tick() => {}
            }

            let block = match self.ctx.client.latest_block().await {
                Ok(block) => block,
                Err(e) => {
                    warn!("Failed to fetch latest block: {e}");
                    continue;
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.refresh(block.height, block.time.naive_utc()) => {
                    if let Err(e) = result {
                        error!(height = block.height, "Full refresh failed: {e:#}");
                    }
                }
            }
        }
    }

    /// Every delegator with at least one delegation in the store.
    async fn delegators(&self) -> anyhow::Result<BTreeSet<String>> {
        let mut conn = self.ctx.store.connect().await?;
        let delegators = conn
            .select(&DELEGATION, "delegator_address", None)
            .await
            .context("Failed to list delegators")?;

        Ok(delegators.into_iter().collect())
    }
}

fn log<T>(what: &str, height: i64, result: anyhow::Result<T>) {
    if let Err(e) = result {
        error!(height, "Failed to refresh {what}: {e:#}");
    }
}

fn log_summary(what: &str, height: i64, result: anyhow::Result<Summary>) {
    match result {
        Ok(summary) if summary.is_complete() => {
            info!(height, units = summary.succeeded, rows = summary.affected, "Refreshed {what}");
        }

        Ok(summary) => {
            warn!(
                height,
                units = summary.succeeded,
                failed = summary.failed.len(),
                cancelled = summary.cancelled,
                rows = summary.affected,
                "Partially refreshed {what}"
            );
        }

        Err(e) => error!(height, "Failed to refresh {what}: {e:#}"),
    }
}
