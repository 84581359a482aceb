// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use anyhow::Context as _;
use ledger_indexer_framework::Store;

use super::{timed, Context, Summary};
use crate::{
    client::ChainClient,
    models::distribution::{
        RewardHistory, StoredCommissionAmount, StoredCommunityPool, StoredDelegationReward,
    },
};

const COMMUNITY_POOL: &str = "community_pool";
const COMMISSION: &str = "commission";
const REWARDS: &str = "rewards";

pub async fn refresh_community_pool<S: Store, C: ChainClient>(
    ctx: &Context<S, C>,
    height: i64,
) -> anyhow::Result<usize> {
    timed(&ctx.metrics, COMMUNITY_POOL, async {
        let coins = ctx.client.community_pool(Some(height)).await?;
        ctx.write(&[StoredCommunityPool { coins, height }]).await
    })
    .await
}

/// Fetch the commission accumulated by each of `validators` as of `height`, one task per
/// validator.
pub async fn refresh_commission_amounts<S: Store, C: ChainClient>(
    ctx: &Arc<Context<S, C>>,
    validators: impl IntoIterator<Item = String>,
    height: i64,
) -> anyhow::Result<Summary> {
    timed(&ctx.metrics, COMMISSION, async {
        let report = ctx
            .dispatch(COMMISSION, validators, |operator_address| {
                let ctx = ctx.clone();
                async move {
                    let amount = ctx
                        .client
                        .validator_commission(&operator_address, Some(height))
                        .await?;

                    ctx.write(&[StoredCommissionAmount {
                        operator_address,
                        amount,
                        height,
                    }])
                    .await
                }
            })
            .await;

        Ok(Summary::of(report))
    })
    .await
}

/// Fetch the pending rewards of each of `delegators` as of `height`, one task per delegator.
/// Each delegator's rewards replace the latest snapshot and are appended to the reward history
/// in the same transaction.
pub async fn refresh_delegation_rewards<S: Store, C: ChainClient>(
    ctx: &Arc<Context<S, C>>,
    delegators: impl IntoIterator<Item = String>,
    height: i64,
) -> anyhow::Result<Summary> {
    timed(&ctx.metrics, REWARDS, async {
        let report = ctx
            .dispatch(REWARDS, delegators, |delegator| {
                let ctx = ctx.clone();
                async move {
                    let rewards = ctx.client.delegation_rewards(&delegator, Some(height)).await?;

                    let rewards: Vec<_> = rewards
                        .into_iter()
                        .map(|r| StoredDelegationReward {
                            validator_address: r.validator_address,
                            delegator_address: delegator.clone(),
                            amount: r.reward,
                            height,
                        })
                        .collect();

                    let history: Vec<_> = rewards.iter().map(RewardHistory).collect();

                    let mut statements = ctx.upserts(&rewards)?;
                    statements.extend(ctx.upserts(&history)?);

                    ctx.write_atomic(statements)
                        .await
                        .with_context(|| format!("Rewards of {delegator} at {height}"))
                }
            })
            .await;

        Ok(Summary::of(report))
    })
    .await
}
