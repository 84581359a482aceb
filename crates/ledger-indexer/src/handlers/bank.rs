// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{collections::BTreeSet, sync::Arc};

use ledger_indexer_framework::{store::Connection as _, Store};
use tracing::{info, warn};

use super::{timed, Context, Summary};
use crate::{
    client::ChainClient,
    models::bank::{StoredAccountBalance, StoredSupply, ACCOUNT_BALANCE},
};

const BALANCES: &str = "balances";
const SUPPLY: &str = "supply";

/// Fetch the balances of `addresses` as of `height`, one task per address, and write every
/// balance that was fetched successfully in as few statements as the parameter limit allows.
/// Addresses whose fetch failed are reported in the summary and left untouched.
pub async fn refresh_balances<S: Store, C: ChainClient>(
    ctx: &Arc<Context<S, C>>,
    addresses: impl IntoIterator<Item = String>,
    height: i64,
) -> anyhow::Result<Summary> {
    timed(&ctx.metrics, BALANCES, async {
        let report = ctx
            .dispatch(BALANCES, addresses, |address| {
                let ctx = ctx.clone();
                async move {
                    let coins = ctx
                        .fetch_all(BALANCES, |page| {
                            ctx.client.balances(&address, Some(height), page)
                        })
                        .await?;

                    Ok(StoredAccountBalance {
                        address,
                        coins,
                        height,
                    })
                }
            })
            .await;

        let mut summary = Summary {
            cancelled: report.cancelled,
            ..Summary::default()
        };

        let mut balances = vec![];
        for (address, outcome) in report.outcomes {
            match outcome {
                Ok(balance) => balances.push(balance),
                Err(_) => summary.failed.push(address),
            }
        }

        summary.succeeded = balances.len();
        summary.affected = ctx.write(&balances).await?;

        if !summary.is_complete() {
            warn!(
                height,
                failed = summary.failed.len(),
                cancelled = summary.cancelled,
                "Some balances could not be refreshed"
            );
        }

        Ok(summary)
    })
    .await
}

/// Re-fetch the balance of every account the store knows about, as of `height`.
pub async fn refresh_all_balances<S: Store, C: ChainClient>(
    ctx: &Arc<Context<S, C>>,
    height: i64,
) -> anyhow::Result<Summary> {
    let addresses: BTreeSet<String> = {
        let mut conn = ctx.store.connect().await?;
        conn.select(&ACCOUNT_BALANCE, "address", None)
            .await?
            .into_iter()
            .collect()
    };

    info!(height, accounts = addresses.len(), "Refreshing all balances");
    refresh_balances(ctx, addresses, height).await
}

/// Snapshot the total supply as of `height`.
pub async fn update_supply<S: Store, C: ChainClient>(
    ctx: &Context<S, C>,
    height: i64,
) -> anyhow::Result<usize> {
    timed(&ctx.metrics, SUPPLY, async {
        let coins = ctx
            .fetch_all(SUPPLY, |page| ctx.client.supply(Some(height), page))
            .await?;

        ctx.write(&[StoredSupply { coins, height }]).await
    })
    .await
}
