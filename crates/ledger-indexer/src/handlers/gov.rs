// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use anyhow::Context as _;
use ledger_indexer_framework::Store;

use super::{timed, Context, Summary};
use crate::{
    client::{types::Proposal, ChainClient},
    models::{
        decimal,
        gov::{StoredDeposit, StoredProposal, StoredTallyResult, StoredVote},
    },
};

const PROPOSALS: &str = "proposals";
const TALLY: &str = "tally";
const VOTES: &str = "votes";
const DEPOSITS: &str = "deposits";

/// Proposals in this status are still collecting votes, so their tally changes block by block.
pub const VOTING_PERIOD: &str = "PROPOSAL_STATUS_VOTING_PERIOD";

/// Fetch every proposal as of `height` and write them. Returns the ids and statuses of the
/// proposals written.
pub async fn refresh_proposals<S: Store, C: ChainClient>(
    ctx: &Context<S, C>,
    height: i64,
) -> anyhow::Result<Vec<(u64, String)>> {
    timed(&ctx.metrics, PROPOSALS, async {
        let proposals = ctx
            .fetch_all(PROPOSALS, |page| ctx.client.proposals(Some(height), page))
            .await?;

        let stored = proposals
            .iter()
            .map(|p| stored_proposal(p, height))
            .collect::<anyhow::Result<Vec<_>>>()?;

        ctx.write(&stored).await?;

        Ok(stored
            .into_iter()
            .map(|p| (p.id as u64, p.status))
            .collect())
    })
    .await
}

/// Snapshot the tally of each of `proposals` as of `height`, one task per proposal.
pub async fn refresh_tallies<S: Store, C: ChainClient>(
    ctx: &Arc<Context<S, C>>,
    proposals: impl IntoIterator<Item = u64>,
    height: i64,
) -> anyhow::Result<Summary> {
    timed(&ctx.metrics, TALLY, async {
        let report = ctx
            .dispatch(TALLY, proposals, |id| {
                let ctx = ctx.clone();
                async move {
                    let tally = ctx.client.tally(id, Some(height)).await?;
                    let tally = StoredTallyResult {
                        proposal_id: proposal_id(id)?,
                        yes: decimal(&tally.yes, "yes")?,
                        abstain: decimal(&tally.abstain, "abstain")?,
                        no: decimal(&tally.no, "no")?,
                        no_with_veto: decimal(&tally.no_with_veto, "no_with_veto")?,
                        height,
                    };

                    ctx.write(&[tally]).await
                }
            })
            .await;

        Ok(Summary::of(report))
    })
    .await
}

/// Append the votes and deposits on each of `proposals` as of `height` to their histories, one
/// task per proposal.
pub async fn refresh_votes_and_deposits<S: Store, C: ChainClient>(
    ctx: &Arc<Context<S, C>>,
    proposals: impl IntoIterator<Item = u64>,
    height: i64,
) -> anyhow::Result<Summary> {
    timed(&ctx.metrics, VOTES, async {
        let report = ctx
            .dispatch(VOTES, proposals, |id| {
                let ctx = ctx.clone();
                async move {
                    let proposal_id = proposal_id(id)?;

                    let deposits = ctx
                        .fetch_all(DEPOSITS, |page| ctx.client.deposits(id, Some(height), page))
                        .await?;

                    let votes = ctx
                        .fetch_all(VOTES, |page| ctx.client.votes(id, Some(height), page))
                        .await?;

                    let deposits: Vec<_> = deposits
                        .into_iter()
                        .map(|d| StoredDeposit {
                            proposal_id,
                            depositor: d.depositor,
                            amount: d.amount,
                            height,
                        })
                        .collect();

                    let votes: Vec<_> = votes
                        .into_iter()
                        .map(|v| StoredVote {
                            proposal_id,
                            voter: v.voter,
                            option: v.option,
                            height,
                        })
                        .collect();

                    Ok(ctx.write(&deposits).await? + ctx.write(&votes).await?)
                }
            })
            .await;

        Ok(Summary::of(report))
    })
    .await
}

fn proposal_id(id: u64) -> anyhow::Result<i64> {
    i64::try_from(id).with_context(|| format!("Proposal id {id} out of range"))
}

pub(crate) fn stored_proposal(proposal: &Proposal, height: i64) -> anyhow::Result<StoredProposal> {
    let id: u64 = proposal
        .proposal_id
        .parse()
        .with_context(|| format!("Invalid proposal id {:?}", proposal.proposal_id))?;

    let content = |field: &str| {
        proposal
            .content
            .get(field)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned()
    };

    Ok(StoredProposal {
        id: proposal_id(id)?,
        title: content("title"),
        description: content("description"),
        proposal_type: content("@type"),
        status: proposal.status.clone(),
        submit_time: proposal.submit_time.map(|t| t.naive_utc()),
        deposit_end_time: proposal.deposit_end_time.map(|t| t.naive_utc()),
        voting_start_time: proposal.voting_start_time.map(|t| t.naive_utc()),
        voting_end_time: proposal.voting_end_time.map(|t| t.naive_utc()),
        total_deposit: proposal.total_deposit.clone(),
        height,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    #[test]
    fn proposal_content_is_flattened() {
        let proposal = Proposal {
            proposal_id: "7".to_string(),
            content: json!({
                "@type": "/cosmos.gov.v1beta1.TextProposal",
                "title": "Upgrade",
                "description": "Do the upgrade",
            }),
            status: VOTING_PERIOD.to_string(),
            submit_time: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            deposit_end_time: None,
            total_deposit: vec![],
            voting_start_time: None,
            voting_end_time: None,
        };

        let stored = stored_proposal(&proposal, 42).unwrap();
        assert_eq!(stored.id, 7);
        assert_eq!(stored.title, "Upgrade");
        assert_eq!(stored.proposal_type, "/cosmos.gov.v1beta1.TextProposal");
        assert_eq!(
            stored.submit_time.unwrap().to_string(),
            "2024-01-02 03:04:05"
        );
        assert_eq!(stored.height, 42);
    }

    #[test]
    fn malformed_proposal_id() {
        let proposal = Proposal {
            proposal_id: "seven".to_string(),
            content: json!({}),
            status: String::new(),
            submit_time: None,
            deposit_end_time: None,
            total_deposit: vec![],
            voting_start_time: None,
            voting_end_time: None,
        };

        assert!(stored_proposal(&proposal, 1).is_err());
    }
}
