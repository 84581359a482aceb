// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use ledger_indexer_framework::{
    policy::{MonotonicUpsert, Table, WritePolicy},
    record::{Record, Value},
};

use super::coins;
use crate::client::types::Coin;

pub const PROPOSAL: Table = Table {
    name: "proposal",
    columns: &[
        "id",
        "title",
        "description",
        "proposal_type",
        "status",
        "submit_time",
        "deposit_end_time",
        "voting_start_time",
        "voting_end_time",
        "total_deposit",
        "height",
    ],
    policy: WritePolicy::LatestState(MonotonicUpsert::new(&["id"], "height")),
};

pub const PROPOSAL_TALLY_RESULT: Table = Table {
    name: "proposal_tally_result",
    columns: &[
        "proposal_id",
        "yes",
        "abstain",
        "no",
        "no_with_veto",
        "height",
    ],
    policy: WritePolicy::LatestState(MonotonicUpsert::new(&["proposal_id"], "height")),
};

pub const PROPOSAL_DEPOSIT: Table = Table {
    name: "proposal_deposit",
    columns: &["proposal_id", "depositor", "amount", "height"],
    policy: WritePolicy::History {
        key: &["proposal_id", "depositor", "height"],
    },
};

pub const PROPOSAL_VOTE: Table = Table {
    name: "proposal_vote",
    columns: &["proposal_id", "voter", "option", "height"],
    policy: WritePolicy::History {
        key: &["proposal_id", "voter", "height"],
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredProposal {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub proposal_type: String,
    pub status: String,
    pub submit_time: Option<NaiveDateTime>,
    pub deposit_end_time: Option<NaiveDateTime>,
    pub voting_start_time: Option<NaiveDateTime>,
    pub voting_end_time: Option<NaiveDateTime>,
    pub total_deposit: Vec<Coin>,
    pub height: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredTallyResult {
    pub proposal_id: i64,
    pub yes: BigDecimal,
    pub abstain: BigDecimal,
    pub no: BigDecimal,
    pub no_with_veto: BigDecimal,
    pub height: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredDeposit {
    pub proposal_id: i64,
    pub depositor: String,
    pub amount: Vec<Coin>,
    pub height: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredVote {
    pub proposal_id: i64,
    pub voter: String,
    pub option: String,
    pub height: i64,
}

impl Record for StoredProposal {
    const TABLE: &'static Table = &PROPOSAL;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::BigInt(self.id),
            Value::Text(self.title.clone()),
            Value::Text(self.description.clone()),
            Value::Text(self.proposal_type.clone()),
            Value::Text(self.status.clone()),
            Value::OptTimestamp(self.submit_time),
            Value::OptTimestamp(self.deposit_end_time),
            Value::OptTimestamp(self.voting_start_time),
            Value::OptTimestamp(self.voting_end_time),
            coins(&self.total_deposit),
            Value::BigInt(self.height),
        ]
    }
}

impl Record for StoredTallyResult {
    const TABLE: &'static Table = &PROPOSAL_TALLY_RESULT;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::BigInt(self.proposal_id),
            Value::Numeric(self.yes.clone()),
            Value::Numeric(self.abstain.clone()),
            Value::Numeric(self.no.clone()),
            Value::Numeric(self.no_with_veto.clone()),
            Value::BigInt(self.height),
        ]
    }
}

impl Record for StoredDeposit {
    const TABLE: &'static Table = &PROPOSAL_DEPOSIT;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::BigInt(self.proposal_id),
            Value::Text(self.depositor.clone()),
            coins(&self.amount),
            Value::BigInt(self.height),
        ]
    }
}

impl Record for StoredVote {
    const TABLE: &'static Table = &PROPOSAL_VOTE;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::BigInt(self.proposal_id),
            Value::Text(self.voter.clone()),
            Value::Text(self.option.clone()),
            Value::BigInt(self.height),
        ]
    }
}
