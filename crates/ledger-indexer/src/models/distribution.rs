// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use ledger_indexer_framework::{
    policy::{MonotonicUpsert, Table, WritePolicy},
    record::{Record, Value},
};

use super::coins;
use crate::client::types::Coin;

pub const COMMUNITY_POOL: Table = Table {
    name: "community_pool",
    columns: &["one_row_id", "coins", "height"],
    policy: WritePolicy::LatestState(MonotonicUpsert::new(&["one_row_id"], "height")),
};

pub const VALIDATOR_COMMISSION_AMOUNT: Table = Table {
    name: "validator_commission_amount",
    columns: &["operator_address", "amount", "height"],
    policy: WritePolicy::LatestState(MonotonicUpsert::new(&["operator_address"], "height")),
};

pub const DELEGATION_REWARD: Table = Table {
    name: "delegation_reward",
    columns: &["validator_address", "delegator_address", "amount", "height"],
    policy: WritePolicy::LatestState(MonotonicUpsert::new(
        &["validator_address", "delegator_address"],
        "height",
    )),
};

pub const DELEGATION_REWARD_HISTORY: Table = Table {
    name: "delegation_reward_history",
    columns: &["validator_address", "delegator_address", "amount", "height"],
    policy: WritePolicy::History {
        key: &["validator_address", "delegator_address", "height"],
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredCommunityPool {
    pub coins: Vec<Coin>,
    pub height: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredCommissionAmount {
    pub operator_address: String,
    pub amount: Vec<Coin>,
    pub height: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredDelegationReward {
    pub validator_address: String,
    pub delegator_address: String,
    pub amount: Vec<Coin>,
    pub height: i64,
}

/// A [StoredDelegationReward] destined for the append-only history table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewardHistory<'a>(pub &'a StoredDelegationReward);

impl Record for StoredCommunityPool {
    const TABLE: &'static Table = &COMMUNITY_POOL;

    fn values(&self) -> Vec<Value> {
        vec![Value::Bool(true), coins(&self.coins), Value::BigInt(self.height)]
    }
}

impl Record for StoredCommissionAmount {
    const TABLE: &'static Table = &VALIDATOR_COMMISSION_AMOUNT;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.operator_address.clone()),
            coins(&self.amount),
            Value::BigInt(self.height),
        ]
    }
}

impl Record for StoredDelegationReward {
    const TABLE: &'static Table = &DELEGATION_REWARD;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.validator_address.clone()),
            Value::Text(self.delegator_address.clone()),
            coins(&self.amount),
            Value::BigInt(self.height),
        ]
    }
}

impl Record for RewardHistory<'_> {
    const TABLE: &'static Table = &DELEGATION_REWARD_HISTORY;

    fn values(&self) -> Vec<Value> {
        self.0.values()
    }
}
