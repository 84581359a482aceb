// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use ledger_indexer_framework::{
    policy::{MonotonicUpsert, Table, WritePolicy},
    record::{Record, Value},
};

use super::{coin, opt_text};
use crate::client::types::{Coin, Description};

pub const VALIDATOR: Table = Table {
    name: "validator",
    columns: &[
        "operator_address",
        "consensus_address",
        "consensus_pubkey",
        "self_delegate_address",
        "max_rate",
        "max_change_rate",
        "height",
    ],
    policy: WritePolicy::LatestState(MonotonicUpsert::new(&["operator_address"], "height")),
};

pub const VALIDATOR_DESCRIPTION: Table = Table {
    name: "validator_description",
    columns: &[
        "operator_address",
        "moniker",
        "identity",
        "website",
        "security_contact",
        "details",
        "height",
    ],
    policy: WritePolicy::LatestState(MonotonicUpsert::new(&["operator_address"], "height")),
};

pub const VALIDATOR_COMMISSION: Table = Table {
    name: "validator_commission",
    columns: &[
        "operator_address",
        "commission_rate",
        "min_self_delegation",
        "height",
    ],
    policy: WritePolicy::LatestState(MonotonicUpsert::new(&["operator_address"], "height")),
};

pub const VALIDATOR_STATUS: Table = Table {
    name: "validator_status",
    columns: &["consensus_address", "status", "jailed", "height"],
    policy: WritePolicy::LatestState(MonotonicUpsert::new(&["consensus_address"], "height")),
};

pub const VALIDATOR_STATUS_HISTORY: Table = Table {
    name: "validator_status_history",
    columns: &["consensus_address", "status", "jailed", "height", "timestamp"],
    policy: WritePolicy::History {
        key: &["consensus_address", "height"],
    },
};

pub const VALIDATOR_VOTING_POWER: Table = Table {
    name: "validator_voting_power",
    columns: &["consensus_address", "voting_power", "height"],
    policy: WritePolicy::LatestState(MonotonicUpsert::new(&["consensus_address"], "height")),
};

pub const DOUBLE_SIGN_EVIDENCE: Table = Table {
    name: "double_sign_evidence",
    columns: &["consensus_address", "height", "power", "timestamp"],
    policy: WritePolicy::History {
        key: &["consensus_address", "height"],
    },
};

pub const DELEGATION: Table = Table {
    name: "delegation",
    columns: &[
        "validator_address",
        "delegator_address",
        "amount",
        "shares",
        "height",
    ],
    policy: WritePolicy::LatestState(MonotonicUpsert::new(
        &["validator_address", "delegator_address"],
        "height",
    )),
};

pub const SELF_DELEGATION: Table = Table {
    name: "self_delegation",
    columns: &[
        "operator_address",
        "delegator_address",
        "amount",
        "shares_percent",
        "height",
    ],
    policy: WritePolicy::LatestState(MonotonicUpsert::new(&["operator_address"], "height")),
};

/// One entry of an unbonding delegation, identified by the height it was created at.
pub const UNBONDING_DELEGATION: Table = Table {
    name: "unbonding_delegation",
    columns: &[
        "delegator_address",
        "validator_address",
        "amount",
        "completion_timestamp",
        "creation_height",
        "height",
    ],
    policy: WritePolicy::History {
        key: &["delegator_address", "validator_address", "creation_height"],
    },
};

pub const REDELEGATION: Table = Table {
    name: "redelegation",
    columns: &[
        "delegator_address",
        "src_validator_address",
        "dst_validator_address",
        "amount",
        "completion_timestamp",
        "creation_height",
        "height",
    ],
    policy: WritePolicy::History {
        key: &[
            "delegator_address",
            "src_validator_address",
            "dst_validator_address",
            "creation_height",
        ],
    },
};

pub const STAKING_POOL: Table = Table {
    name: "staking_pool",
    columns: &["one_row_id", "bonded_tokens", "not_bonded_tokens", "height"],
    policy: WritePolicy::LatestState(MonotonicUpsert::new(&["one_row_id"], "height")),
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredValidator {
    pub operator_address: String,
    pub consensus_address: String,
    pub consensus_pubkey: String,
    pub self_delegate_address: String,
    pub max_rate: BigDecimal,
    pub max_change_rate: BigDecimal,
    pub height: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredValidatorDescription {
    pub operator_address: String,
    pub description: Description,
    pub height: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredValidatorCommission {
    pub operator_address: String,
    pub commission_rate: BigDecimal,
    pub min_self_delegation: BigDecimal,
    pub height: i64,
}

/// Bond status of a validator, as persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoredValidatorStatus {
    pub status: i32,
    pub jailed: bool,
    pub height: i64,
}

/// A validator's status, keyed by consensus address. Written to the latest-state table and, in
/// the same transaction, to its history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredStatusObservation {
    pub consensus_address: String,
    pub status: StoredValidatorStatus,
    pub timestamp: Option<NaiveDateTime>,
}

/// Latest-state view of a [StoredStatusObservation].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LatestStatus<'a>(pub &'a StoredStatusObservation);

/// History view of a [StoredStatusObservation].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusHistory<'a>(pub &'a StoredStatusObservation);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredVotingPower {
    pub consensus_address: String,
    pub voting_power: i64,
    pub height: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredDoubleSignEvidence {
    pub consensus_address: String,
    pub height: i64,
    pub power: i64,
    pub timestamp: NaiveDateTime,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredDelegation {
    pub validator_address: String,
    pub delegator_address: String,
    pub amount: Coin,
    pub shares: BigDecimal,
    pub height: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredSelfDelegation {
    pub operator_address: String,
    pub delegator_address: String,
    pub amount: Coin,
    pub shares_percent: BigDecimal,
    pub height: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredUnbondingDelegation {
    pub delegator_address: String,
    pub validator_address: String,
    pub amount: Coin,
    pub completion_timestamp: NaiveDateTime,
    pub creation_height: i64,
    pub height: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRedelegation {
    pub delegator_address: String,
    pub src_validator_address: String,
    pub dst_validator_address: String,
    pub amount: Coin,
    pub completion_timestamp: NaiveDateTime,
    pub creation_height: i64,
    pub height: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredStakingPool {
    pub bonded_tokens: BigDecimal,
    pub not_bonded_tokens: BigDecimal,
    pub height: i64,
}

impl Record for StoredValidator {
    const TABLE: &'static Table = &VALIDATOR;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.operator_address.clone()),
            Value::Text(self.consensus_address.clone()),
            Value::Text(self.consensus_pubkey.clone()),
            Value::Text(self.self_delegate_address.clone()),
            Value::Numeric(self.max_rate.clone()),
            Value::Numeric(self.max_change_rate.clone()),
            Value::BigInt(self.height),
        ]
    }
}

impl Record for StoredValidatorDescription {
    const TABLE: &'static Table = &VALIDATOR_DESCRIPTION;

    fn values(&self) -> Vec<Value> {
        let d = &self.description;
        vec![
            Value::Text(self.operator_address.clone()),
            opt_text(&d.moniker),
            opt_text(&d.identity),
            opt_text(&d.website),
            opt_text(&d.security_contact),
            opt_text(&d.details),
            Value::BigInt(self.height),
        ]
    }
}

impl Record for StoredValidatorCommission {
    const TABLE: &'static Table = &VALIDATOR_COMMISSION;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.operator_address.clone()),
            Value::Numeric(self.commission_rate.clone()),
            Value::Numeric(self.min_self_delegation.clone()),
            Value::BigInt(self.height),
        ]
    }
}

impl Record for LatestStatus<'_> {
    const TABLE: &'static Table = &VALIDATOR_STATUS;

    fn values(&self) -> Vec<Value> {
        let StoredStatusObservation {
            consensus_address,
            status,
            ..
        } = self.0;

        vec![
            Value::Text(consensus_address.clone()),
            Value::Int(status.status),
            Value::Bool(status.jailed),
            Value::BigInt(status.height),
        ]
    }
}

impl Record for StatusHistory<'_> {
    const TABLE: &'static Table = &VALIDATOR_STATUS_HISTORY;

    fn values(&self) -> Vec<Value> {
        let StoredStatusObservation {
            consensus_address,
            status,
            timestamp,
        } = self.0;

        vec![
            Value::Text(consensus_address.clone()),
            Value::Int(status.status),
            Value::Bool(status.jailed),
            Value::BigInt(status.height),
            Value::OptTimestamp(*timestamp),
        ]
    }
}

impl Record for StoredVotingPower {
    const TABLE: &'static Table = &VALIDATOR_VOTING_POWER;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.consensus_address.clone()),
            Value::BigInt(self.voting_power),
            Value::BigInt(self.height),
        ]
    }
}

impl Record for StoredDoubleSignEvidence {
    const TABLE: &'static Table = &DOUBLE_SIGN_EVIDENCE;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.consensus_address.clone()),
            Value::BigInt(self.height),
            Value::BigInt(self.power),
            Value::Timestamp(self.timestamp),
        ]
    }
}

impl Record for StoredDelegation {
    const TABLE: &'static Table = &DELEGATION;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.validator_address.clone()),
            Value::Text(self.delegator_address.clone()),
            coin(&self.amount),
            Value::Numeric(self.shares.clone()),
            Value::BigInt(self.height),
        ]
    }
}

impl Record for StoredSelfDelegation {
    const TABLE: &'static Table = &SELF_DELEGATION;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.operator_address.clone()),
            Value::Text(self.delegator_address.clone()),
            coin(&self.amount),
            Value::Numeric(self.shares_percent.clone()),
            Value::BigInt(self.height),
        ]
    }
}

impl Record for StoredUnbondingDelegation {
    const TABLE: &'static Table = &UNBONDING_DELEGATION;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.delegator_address.clone()),
            Value::Text(self.validator_address.clone()),
            coin(&self.amount),
            Value::Timestamp(self.completion_timestamp),
            Value::BigInt(self.creation_height),
            Value::BigInt(self.height),
        ]
    }
}

impl Record for StoredRedelegation {
    const TABLE: &'static Table = &REDELEGATION;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.delegator_address.clone()),
            Value::Text(self.src_validator_address.clone()),
            Value::Text(self.dst_validator_address.clone()),
            coin(&self.amount),
            Value::Timestamp(self.completion_timestamp),
            Value::BigInt(self.creation_height),
            Value::BigInt(self.height),
        ]
    }
}

impl Record for StoredStakingPool {
    const TABLE: &'static Table = &STAKING_POOL;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Bool(true),
            Value::Numeric(self.bonded_tokens.clone()),
            Value::Numeric(self.not_bonded_tokens.clone()),
            Value::BigInt(self.height),
        ]
    }
}
