// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use ledger_indexer_framework::{
    policy::{MonotonicUpsert, Table, WritePolicy},
    record::{Record, Value},
};

use super::coins;
use crate::client::types::Coin;

pub const ACCOUNT_BALANCE: Table = Table {
    name: "account_balance",
    columns: &["address", "coins", "height"],
    policy: WritePolicy::LatestState(MonotonicUpsert::new(&["address"], "height")),
};

pub const SUPPLY: Table = Table {
    name: "supply",
    columns: &["one_row_id", "coins", "height"],
    policy: WritePolicy::LatestState(MonotonicUpsert::new(&["one_row_id"], "height")),
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredAccountBalance {
    pub address: String,
    pub coins: Vec<Coin>,
    pub height: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredSupply {
    pub coins: Vec<Coin>,
    pub height: i64,
}

impl Record for StoredAccountBalance {
    const TABLE: &'static Table = &ACCOUNT_BALANCE;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.address.clone()),
            coins(&self.coins),
            Value::BigInt(self.height),
        ]
    }
}

impl Record for StoredSupply {
    const TABLE: &'static Table = &SUPPLY;

    fn values(&self) -> Vec<Value> {
        vec![Value::Bool(true), coins(&self.coins), Value::BigInt(self.height)]
    }
}
