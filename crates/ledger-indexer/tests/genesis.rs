// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use ledger_indexer::{
    address::Bech32Prefixes,
    handlers::{bank, genesis},
    models::{
        bank::{ACCOUNT_BALANCE, SUPPLY},
        staking::{
            DELEGATION, REDELEGATION, SELF_DELEGATION, UNBONDING_DELEGATION, VALIDATOR,
            VALIDATOR_STATUS_HISTORY,
        },
    },
    testing::{account, context, operator, stake, validator, MockChainClient, MockState},
};
use ledger_indexer_framework::{in_memory_store::InMemoryStore, BatchWriter, Value};
use serde_json::json;

fn genesis_json() -> serde_json::Value {
    json!({
        "genesis_time": "2024-03-01T00:00:00Z",
        "chain_id": "test-1",
        "initial_height": "1",
        "app_state": {
            "bank": {
                "balances": [
                    { "address": account(1), "coins": [{ "denom": "stake", "amount": "10" }] },
                    { "address": account(2), "coins": [{ "denom": "stake", "amount": "20" }] },
                ],
                "supply": [{ "denom": "stake", "amount": "30" }],
            },
            "staking": {
                "params": { "bond_denom": "stake" },
                "validators": [validator(1)],
                "delegations": [
                    { "delegator_address": account(1), "validator_address": operator(1), "shares": "250" },
                    { "delegator_address": account(2), "validator_address": operator(1), "shares": "750" },
                ],
                "unbonding_delegations": [{
                    "delegator_address": account(2),
                    "validator_address": operator(1),
                    "entries": [{
                        "creation_height": "0",
                        "completion_time": "2024-03-22T00:00:00Z",
                        "initial_balance": "5",
                        "balance": "5",
                    }],
                }],
                "redelegations": [{
                    "delegator_address": account(1),
                    "validator_src_address": operator(1),
                    "validator_dst_address": operator(2),
                    "entries": [{
                        "creation_height": "0",
                        "completion_time": "2024-03-22T00:00:00Z",
                        "initial_balance": "7",
                        "shares_dst": "7.000000000000000000",
                    }],
                }],
            },
        },
    })
}

fn load(value: &serde_json::Value) -> genesis::GenesisDoc {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(value.to_string().as_bytes()).unwrap();
    genesis::GenesisDoc::load(file.path()).unwrap()
}

#[tokio::test]
async fn import_writes_derived_state() {
    let store = InMemoryStore::new();
    let doc = load(&genesis_json());

    genesis::import_genesis(
        &store,
        &BatchWriter::new(100),
        &doc,
        &Bech32Prefixes::new("cosmos"),
    )
    .await
    .unwrap();

    assert_eq!(store.rows(&VALIDATOR).len(), 1);
    assert_eq!(store.rows(&VALIDATOR_STATUS_HISTORY).len(), 1);
    assert_eq!(store.rows(&ACCOUNT_BALANCE).len(), 2);
    assert_eq!(store.rows(&SUPPLY).len(), 1);

    // 1000 tokens over 1000 shares.
    assert_eq!(
        store.value(
            &DELEGATION,
            &[operator(1).into(), account(2).into()],
            "amount"
        ),
        Some(Value::Json(json!({ "denom": "stake", "amount": "750" })))
    );

    assert_eq!(
        store.value(
            &UNBONDING_DELEGATION,
            &[account(2).into(), operator(1).into(), Value::BigInt(0)],
            "amount"
        ),
        Some(Value::Json(json!({ "denom": "stake", "amount": "5" })))
    );
    assert_eq!(
        store.value(
            &REDELEGATION,
            &[
                account(1).into(),
                operator(1).into(),
                operator(2).into(),
                Value::BigInt(0)
            ],
            "height"
        ),
        Some(Value::BigInt(1))
    );

    // The account sharing the operator's key is its self-delegation.
    let self_delegations = store.rows(&SELF_DELEGATION);
    assert_eq!(self_delegations.len(), 1);
    assert_eq!(self_delegations[0][1], Value::Text(account(1)));
}

#[tokio::test]
async fn replay_after_live_sync_changes_nothing() {
    let mut state = MockState::default();
    state.balances.insert(account(1), vec![stake(99)]);

    let store = InMemoryStore::new();
    let ctx = context(
        store.clone(),
        MockChainClient::new(state),
        BatchWriter::new(100),
    );

    bank::refresh_balances(&ctx, [account(1)], 50).await.unwrap();

    let doc = load(&genesis_json());
    genesis::import_genesis(&store, &ctx.writer, &doc, &ctx.prefixes)
        .await
        .unwrap();

    assert_eq!(
        store.value(&ACCOUNT_BALANCE, &[account(1).into()], "height"),
        Some(Value::BigInt(50))
    );
    assert_eq!(
        store.value(&ACCOUNT_BALANCE, &[account(2).into()], "height"),
        Some(Value::BigInt(1))
    );

    // Importing twice leaves every table as it was.
    let before = store.rows(&VALIDATOR_STATUS_HISTORY);
    let affected = genesis::import_genesis(&store, &ctx.writer, &doc, &ctx.prefixes)
        .await
        .unwrap();

    assert_eq!(store.rows(&VALIDATOR_STATUS_HISTORY), before);
    assert_eq!(store.rows(&DELEGATION).len(), 2);
    assert_eq!(store.rows(&UNBONDING_DELEGATION).len(), 1);
    assert_eq!(store.rows(&REDELEGATION).len(), 1);
    assert!(affected > 0, "same-height rows are rewritten");
}

#[tokio::test]
async fn invalid_genesis_writes_nothing() {
    let mut value = genesis_json();
    value["app_state"]["staking"]["validators"][0]["delegator_shares"] = json!("0");

    let store = InMemoryStore::new();
    let doc = load(&value);

    let err = genesis::import_genesis(
        &store,
        &BatchWriter::new(100),
        &doc,
        &Bech32Prefixes::new("cosmos"),
    )
    .await
    .unwrap_err();

    assert!(format!("{err:#}").contains("no delegator shares"), "{err:#}");
    assert!(store.statements().is_empty());
}
