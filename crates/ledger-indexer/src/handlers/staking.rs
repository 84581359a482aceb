// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use anyhow::Context as _;
use chrono::NaiveDateTime;
use ledger_indexer_framework::{store::Connection as _, Store, Value};
use tracing::{debug, info, warn};

use super::{timed, Context, Summary};
use crate::{
    client::{
        types::{DelegationResponse, MsgCreateValidator, MsgEditValidator, Validator},
        ChainClient,
    },
    models::{
        decimal,
        staking::{
            LatestStatus, StatusHistory, StoredDelegation, StoredDoubleSignEvidence,
            StoredStakingPool, StoredStatusObservation, StoredValidatorCommission,
            StoredValidatorDescription, StoredValidatorStatus, StoredVotingPower, DELEGATION,
        },
    },
    validator::ValidatorRows,
};

const VALIDATORS: &str = "validators";
const DELEGATIONS: &str = "delegations";
const DELEGATOR: &str = "delegator";
const VOTING_POWER: &str = "voting_power";
const STAKING_POOL: &str = "staking_pool";
const EVIDENCE: &str = "double_sign_evidence";

/// Type URL of the only kind of evidence that is recorded.
const EQUIVOCATION: &str = "/cosmos.evidence.v1beta1.Equivocation";

/// Fetch every validator as of `height` and write its info, description, commission rates and
/// status, together with a status history entry, in one transaction. Validators whose addresses
/// cannot be derived are logged and skipped. Returns the validators that were written.
pub async fn refresh_validators<S: Store, C: ChainClient>(
    ctx: &Context<S, C>,
    height: i64,
    timestamp: Option<NaiveDateTime>,
) -> anyhow::Result<Vec<Validator>> {
    timed(&ctx.metrics, VALIDATORS, async {
        let validators = ctx
            .fetch_all(VALIDATORS, |page| ctx.client.validators(Some(height), page))
            .await?;

        let mut rows = Vec::with_capacity(validators.len());
        let mut statuses = Vec::with_capacity(validators.len());
        let mut written = Vec::with_capacity(validators.len());

        for validator in validators {
            let info = match ValidatorRows::new(&validator, &ctx.prefixes, height) {
                Ok(info) => info,
                Err(e) => {
                    warn!(
                        height,
                        validator = %validator.operator_address,
                        "Skipping validator: {e:#}"
                    );
                    continue;
                }
            };

            statuses.push(StoredStatusObservation {
                consensus_address: info.validator.consensus_address.clone(),
                status: StoredValidatorStatus {
                    status: validator.status.code(),
                    jailed: validator.jailed,
                    height,
                },
                timestamp,
            });

            rows.push(info);
            written.push(validator);
        }

        let validators: Vec<_> = rows.iter().map(|r| r.validator.clone()).collect();
        let descriptions: Vec<_> = rows.iter().map(|r| r.description.clone()).collect();
        let commissions: Vec<_> = rows.iter().map(|r| r.commission.clone()).collect();
        let latest: Vec<_> = statuses.iter().map(LatestStatus).collect();
        let history: Vec<_> = statuses.iter().map(StatusHistory).collect();

        let mut statements = ctx.upserts(&validators)?;
        statements.extend(ctx.upserts(&descriptions)?);
        statements.extend(ctx.upserts(&commissions)?);
        statements.extend(ctx.upserts(&latest)?);
        statements.extend(ctx.upserts(&history)?);

        ctx.write_atomic(statements)
            .await
            .with_context(|| format!("Failed to write validators at height {height}"))?;

        debug!(height, validators = written.len(), "Refreshed validators");
        Ok(written)
    })
    .await
}

/// Record a validator announced by a create-validator message: its description, commission
/// and info rows are written together or not at all.
pub async fn handle_create_validator<S: Store, C: ChainClient>(
    ctx: &Context<S, C>,
    msg: &MsgCreateValidator,
    height: i64,
) -> anyhow::Result<usize> {
    let rows = ValidatorRows::new(msg, &ctx.prefixes, height)?;

    let mut statements = ctx.upserts(&[rows.description])?;
    statements.extend(ctx.upserts(&[rows.commission])?);
    statements.extend(ctx.upserts(&[rows.validator])?);

    info!(height, validator = %msg.validator_address, "New validator");
    ctx.write_atomic(statements).await
}

/// Record an edit-validator message included at `height`. The validator's description and
/// commission as of that height are read from the chain and written together.
pub async fn handle_edit_validator<S: Store, C: ChainClient>(
    ctx: &Context<S, C>,
    msg: &MsgEditValidator,
    height: i64,
) -> anyhow::Result<usize> {
    let operator_address = &msg.validator_address;
    let validator = ctx
        .client
        .validator(operator_address, Some(height))
        .await
        .with_context(|| format!("Failed to fetch edited validator {operator_address}"))?;

    let description = StoredValidatorDescription {
        operator_address: operator_address.clone(),
        description: validator.description,
        height,
    };

    let rates = &validator.commission.commission_rates;
    let commission = StoredValidatorCommission {
        operator_address: operator_address.clone(),
        commission_rate: decimal(&rates.rate, "commission_rate")?,
        min_self_delegation: decimal(&validator.min_self_delegation, "min_self_delegation")?,
        height,
    };

    let mut statements = ctx.upserts(&[description])?;
    statements.extend(ctx.upserts(&[commission])?);

    info!(height, validator = %operator_address, "Edited validator");
    ctx.write_atomic(statements).await
}

/// Fetch the delegations to each of `validators` as of `height`, one task per validator, each
/// writing its own delegations as soon as they have been fetched.
pub async fn refresh_delegations<S: Store, C: ChainClient>(
    ctx: &Arc<Context<S, C>>,
    validators: impl IntoIterator<Item = String>,
    height: i64,
) -> anyhow::Result<Summary> {
    timed(&ctx.metrics, DELEGATIONS, async {
        let report = ctx
            .dispatch(DELEGATIONS, validators, |validator| {
                let ctx = ctx.clone();
                async move {
                    let responses = ctx
                        .fetch_all(DELEGATIONS, |page| {
                            ctx.client
                                .validator_delegations(&validator, Some(height), page)
                        })
                        .await?;

                    let delegations = stored_delegations(responses, height)?;
                    ctx.write(&delegations)
                        .await
                        .with_context(|| format!("Delegations to {validator} at {height}"))
                }
            })
            .await;

        Ok(Summary::of(report))
    })
    .await
}

/// Replace every delegation made by `delegator` with the set the chain reports as of `height`.
/// Delegations that no longer exist are removed. The delete and the re-insert happen in one
/// transaction. If any of the delegator's stored delegations was observed above `height`, the
/// refresh is skipped and nothing is written.
pub async fn refresh_delegator<S: Store, C: ChainClient>(
    ctx: &Context<S, C>,
    delegator: &str,
    height: i64,
) -> anyhow::Result<usize> {
    timed(&ctx.metrics, DELEGATOR, async {
        if let Some(stored) = latest_delegation_height(ctx, delegator).await? {
            if stored > height {
                debug!(height, stored, delegator, "Skipping stale delegator refresh");
                return Ok(0);
            }
        }

        let responses = ctx
            .fetch_all(DELEGATOR, |page| {
                ctx.client
                    .delegator_delegations(delegator, Some(height), page)
            })
            .await?;

        let delegations = stored_delegations(responses, height)?;

        let mut statements = ctx.writer.deletes(
            &DELEGATION,
            "delegator_address",
            &[Value::Text(delegator.to_owned())],
        )?;
        statements.extend(ctx.upserts(&delegations)?);

        ctx.write_atomic(statements)
            .await
            .with_context(|| format!("Failed to replace delegations of {delegator}"))
    })
    .await
}

/// Run [refresh_delegator] for each of `delegators`, one task per delegator.
pub async fn refresh_delegators<S: Store, C: ChainClient>(
    ctx: &Arc<Context<S, C>>,
    delegators: impl IntoIterator<Item = String>,
    height: i64,
) -> anyhow::Result<Summary> {
    let report = ctx
        .dispatch(DELEGATOR, delegators, |delegator| {
            let ctx = ctx.clone();
            async move { refresh_delegator(&ctx, &delegator, height).await }
        })
        .await;

    Ok(Summary::of(report))
}

/// Snapshot the voting power of the active validator set at `height`.
pub async fn refresh_voting_power<S: Store, C: ChainClient>(
    ctx: &Context<S, C>,
    height: i64,
) -> anyhow::Result<usize> {
    timed(&ctx.metrics, VOTING_POWER, async {
        let powers = ctx
            .fetch_all(VOTING_POWER, |page| ctx.client.validator_set(height, page))
            .await?;

        let powers = powers
            .into_iter()
            .map(|p| {
                let voting_power = p
                    .voting_power
                    .parse()
                    .with_context(|| format!("Invalid voting power of {}", p.address))?;

                Ok(StoredVotingPower {
                    consensus_address: p.address,
                    voting_power,
                    height,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        ctx.write(&powers).await
    })
    .await
}

pub async fn refresh_staking_pool<S: Store, C: ChainClient>(
    ctx: &Context<S, C>,
    height: i64,
) -> anyhow::Result<usize> {
    timed(&ctx.metrics, STAKING_POOL, async {
        let pool = ctx.client.staking_pool(Some(height)).await?;
        let pool = StoredStakingPool {
            bonded_tokens: decimal(&pool.bonded_tokens, "bonded_tokens")?,
            not_bonded_tokens: decimal(&pool.not_bonded_tokens, "not_bonded_tokens")?,
            height,
        };

        ctx.write(&[pool]).await
    })
    .await
}

/// Record any equivocation evidence the chain holds as of `height`. Other kinds of evidence are
/// ignored.
pub async fn refresh_double_sign_evidence<S: Store, C: ChainClient>(
    ctx: &Context<S, C>,
    height: i64,
) -> anyhow::Result<usize> {
    timed(&ctx.metrics, EVIDENCE, async {
        let evidence = ctx
            .fetch_all(EVIDENCE, |page| ctx.client.evidence(Some(height), page))
            .await?;

        let mut records = vec![];
        for e in evidence {
            if e.type_url != EQUIVOCATION {
                continue;
            }

            let (Some(address), Some(at), Some(power), Some(time)) =
                (e.consensus_address, e.height, e.power, e.time)
            else {
                warn!(height, "Skipping incomplete equivocation evidence");
                continue;
            };

            records.push(StoredDoubleSignEvidence {
                height: at
                    .parse()
                    .with_context(|| format!("Invalid evidence height {at:?}"))?,
                power: power
                    .parse()
                    .with_context(|| format!("Invalid evidence power {power:?}"))?,
                consensus_address: address,
                timestamp: time.naive_utc(),
            });
        }

        ctx.write(&records).await
    })
    .await
}

/// Highest height any of `delegator`'s stored delegations was observed at.
async fn latest_delegation_height<S: Store, C: ChainClient>(
    ctx: &Context<S, C>,
    delegator: &str,
) -> anyhow::Result<Option<i64>> {
    let mut conn = ctx.store.connect().await?;
    let heights = conn
        .select(
            &DELEGATION,
            "height",
            Some(("delegator_address", &Value::Text(delegator.to_owned()))),
        )
        .await
        .with_context(|| format!("Failed to read delegations of {delegator}"))?;

    let mut latest = None;
    for h in heights {
        let h: i64 = h
            .parse()
            .with_context(|| format!("Invalid delegation height {h:?}"))?;
        latest = latest.max(Some(h));
    }

    Ok(latest)
}

fn stored_delegations(
    responses: Vec<DelegationResponse>,
    height: i64,
) -> anyhow::Result<Vec<StoredDelegation>> {
    responses
        .into_iter()
        .map(|DelegationResponse { delegation, balance }| {
            Ok(StoredDelegation {
                shares: decimal(&delegation.shares, "shares")?,
                validator_address: delegation.validator_address,
                delegator_address: delegation.delegator_address,
                amount: balance,
                height,
            })
        })
        .collect()
}
