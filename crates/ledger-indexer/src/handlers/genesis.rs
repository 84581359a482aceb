// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bulk-load of the state described by a genesis document. Every row derived from genesis is
//! stamped with the genesis height, so importing it after live sync has moved past that height
//! leaves the latest-state tables untouched.

use std::{collections::HashMap, path::Path};

use anyhow::Context as _;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use ledger_indexer_framework::{
    batch::BatchError, store::Connection as _, BatchWriter, Statement, Store,
};
use num_bigint::BigInt;
use serde::Deserialize;
use tracing::info;

use super::gov::stored_proposal;
use crate::{
    address::Bech32Prefixes,
    client::types::{Coin, Delegation, MsgCreateValidator, Proposal, Validator},
    models::{
        bank::{StoredAccountBalance, StoredSupply},
        gov::StoredProposal,
        staking::{
            LatestStatus, StatusHistory, StoredDelegation, StoredRedelegation,
            StoredSelfDelegation, StoredStatusObservation, StoredUnbondingDelegation,
            StoredValidatorStatus,
        },
    },
    validator::ValidatorRows,
};

/// Type URL of genesis transactions that create a validator.
const MSG_CREATE_VALIDATOR: &str = "/cosmos.staking.v1beta1.MsgCreateValidator";

/// Decimal places kept for self-delegation percentages.
const PERCENT_SCALE: i64 = 18;

#[derive(thiserror::Error, Debug)]
pub enum DerivationError {
    #[error("Invalid {field} {value:?}")]
    Number { field: &'static str, value: String },

    #[error("Validator {0} has no delegator shares")]
    ZeroShares(String),

    #[error("Invalid validator {operator}: {error:#}")]
    Validator {
        operator: String,
        error: anyhow::Error,
    },

    #[error("Invalid genesis transaction {index}: {source}")]
    GenTx {
        index: usize,
        source: serde_json::Error,
    },

    #[error("Invalid proposal: {0:#}")]
    Proposal(anyhow::Error),
}

#[derive(Deserialize, Debug)]
pub struct GenesisDoc {
    pub genesis_time: DateTime<Utc>,
    #[serde(default)]
    pub chain_id: String,
    #[serde(default)]
    pub initial_height: Option<String>,
    #[serde(default)]
    pub app_state: AppState,
}

#[derive(Deserialize, Debug, Default)]
pub struct AppState {
    #[serde(default)]
    pub bank: BankGenesis,
    #[serde(default)]
    pub staking: StakingGenesis,
    #[serde(default)]
    pub gov: GovGenesis,
    #[serde(default)]
    pub genutil: GenutilGenesis,
}

#[derive(Deserialize, Debug, Default)]
pub struct BankGenesis {
    #[serde(default)]
    pub balances: Vec<GenesisBalance>,
    #[serde(default)]
    pub supply: Vec<Coin>,
}

#[derive(Deserialize, Debug)]
pub struct GenesisBalance {
    pub address: String,
    #[serde(default)]
    pub coins: Vec<Coin>,
}

#[derive(Deserialize, Debug, Default)]
pub struct StakingGenesis {
    #[serde(default)]
    pub params: StakingParams,
    #[serde(default)]
    pub validators: Vec<Validator>,
    #[serde(default)]
    pub delegations: Vec<Delegation>,
    #[serde(default)]
    pub unbonding_delegations: Vec<GenesisUnbondingDelegation>,
    #[serde(default)]
    pub redelegations: Vec<GenesisRedelegation>,
}

#[derive(Deserialize, Debug)]
pub struct GenesisUnbondingDelegation {
    pub delegator_address: String,
    pub validator_address: String,
    #[serde(default)]
    pub entries: Vec<GenesisEntry>,
}

#[derive(Deserialize, Debug)]
pub struct GenesisRedelegation {
    pub delegator_address: String,
    pub validator_src_address: String,
    pub validator_dst_address: String,
    #[serde(default)]
    pub entries: Vec<GenesisEntry>,
}

/// An unbonding or redelegation entry: `initial_balance` of the bond denomination, moving since
/// `creation_height` until `completion_time`.
#[derive(Deserialize, Debug)]
pub struct GenesisEntry {
    pub creation_height: String,
    pub completion_time: DateTime<Utc>,
    pub initial_balance: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct StakingParams {
    #[serde(default)]
    pub bond_denom: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct GovGenesis {
    #[serde(default)]
    pub proposals: Vec<Proposal>,
}

#[derive(Deserialize, Debug, Default)]
pub struct GenutilGenesis {
    #[serde(default)]
    pub gen_txs: Vec<GenTx>,
}

#[derive(Deserialize, Debug)]
pub struct GenTx {
    pub body: GenTxBody,
}

#[derive(Deserialize, Debug)]
pub struct GenTxBody {
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
}

/// Everything derived from a genesis document, ready to be written.
#[derive(Debug, Default)]
pub struct GenesisRows {
    pub height: i64,
    pub validators: Vec<ValidatorRows>,
    pub statuses: Vec<StoredStatusObservation>,
    pub delegations: Vec<StoredDelegation>,
    pub self_delegations: Vec<StoredSelfDelegation>,
    pub unbonding_delegations: Vec<StoredUnbondingDelegation>,
    pub redelegations: Vec<StoredRedelegation>,
    pub balances: Vec<StoredAccountBalance>,
    pub supply: Option<StoredSupply>,
    pub proposals: Vec<StoredProposal>,
}

impl GenesisDoc {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read genesis file {}", path.display()))?;

        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse genesis file {}", path.display()))
    }

    /// The height every genesis-derived row is stamped with.
    pub fn height(&self) -> Result<i64, DerivationError> {
        match &self.initial_height {
            None => Ok(0),
            Some(h) => h.parse().map_err(|_| DerivationError::Number {
                field: "initial_height",
                value: h.clone(),
            }),
        }
    }
}

impl GenesisEntry {
    fn creation_height(&self) -> Result<i64, DerivationError> {
        self.creation_height
            .parse()
            .map_err(|_| DerivationError::Number {
                field: "creation_height",
                value: self.creation_height.clone(),
            })
    }

    fn amount(&self, denom: &str) -> Result<Coin, DerivationError> {
        let amount: BigInt = self
            .initial_balance
            .parse()
            .map_err(|_| DerivationError::Number {
                field: "initial_balance",
                value: self.initial_balance.clone(),
            })?;

        Ok(Coin {
            denom: denom.to_owned(),
            amount: amount.to_string(),
        })
    }
}

/// `floor(tokens * shares / total_shares)`, computed exactly.
pub fn delegation_amount(
    tokens: &BigDecimal,
    total_shares: &BigDecimal,
    shares: &BigDecimal,
) -> Option<BigInt> {
    let (tn, td) = ratio(tokens);
    let (sn, sd) = ratio(shares);
    let (dn, dd) = ratio(total_shares);

    let denominator = td * sd * dn;
    if denominator == BigInt::from(0) {
        return None;
    }

    Some(tn * sn * dd / denominator)
}

/// `shares / total_shares * 100`, truncated to [PERCENT_SCALE] decimal places.
pub fn shares_percent(shares: &BigDecimal, total_shares: &BigDecimal) -> Option<BigDecimal> {
    let (sn, sd) = ratio(shares);
    let (dn, dd) = ratio(total_shares);

    let denominator = sd * dn;
    if denominator == BigInt::from(0) {
        return None;
    }

    let scaled = sn * dd * 100 * BigInt::from(10).pow(PERCENT_SCALE as u32);
    Some(BigDecimal::new(scaled / denominator, PERCENT_SCALE))
}

/// Derive every row a genesis document describes. Nothing is returned unless every row could be
/// derived.
pub fn derive(doc: &GenesisDoc, prefixes: &Bech32Prefixes) -> Result<GenesisRows, DerivationError> {
    let height = doc.height()?;
    let timestamp = doc.genesis_time.naive_utc();
    let staking = &doc.app_state.staking;

    let mut rows = GenesisRows {
        height,
        ..GenesisRows::default()
    };

    let mut by_operator: HashMap<&str, &Validator> = HashMap::new();
    for validator in &staking.validators {
        let info = ValidatorRows::new(validator, prefixes, height).map_err(|error| {
            DerivationError::Validator {
                operator: validator.operator_address.clone(),
                error,
            }
        })?;

        rows.statuses.push(status(&info, validator, height, timestamp));
        rows.validators.push(info);
        by_operator.insert(&validator.operator_address, validator);
    }

    // Validators created by genesis transactions only appear there when the staking state was
    // not exported from a running chain.
    for msg in create_validator_msgs(doc)? {
        if by_operator.contains_key(msg.validator_address.as_str()) {
            continue;
        }

        let info = ValidatorRows::new(&msg, prefixes, height).map_err(|error| {
            DerivationError::Validator {
                operator: msg.validator_address.clone(),
                error,
            }
        })?;

        rows.validators.push(info);
    }

    for delegation in &staking.delegations {
        let Some(validator) = by_operator.get(delegation.validator_address.as_str()) else {
            continue;
        };

        let tokens = number("tokens", &validator.tokens)?;
        let total = number("delegator_shares", &validator.delegator_shares)?;
        let shares = number("shares", &delegation.shares)?;

        let amount = delegation_amount(&tokens, &total, &shares)
            .ok_or_else(|| DerivationError::ZeroShares(validator.operator_address.clone()))?;

        let amount = Coin {
            denom: staking.params.bond_denom.clone(),
            amount: amount.to_string(),
        };

        let self_delegate_address = prefixes
            .self_delegate_address(&validator.operator_address)
            .map_err(|error| DerivationError::Validator {
                operator: validator.operator_address.clone(),
                error,
            })?;

        if delegation.delegator_address == self_delegate_address {
            let shares_percent = shares_percent(&shares, &total)
                .ok_or_else(|| DerivationError::ZeroShares(validator.operator_address.clone()))?;

            rows.self_delegations.push(StoredSelfDelegation {
                operator_address: validator.operator_address.clone(),
                delegator_address: delegation.delegator_address.clone(),
                amount: amount.clone(),
                shares_percent,
                height,
            });
        }

        rows.delegations.push(StoredDelegation {
            validator_address: validator.operator_address.clone(),
            delegator_address: delegation.delegator_address.clone(),
            amount,
            shares,
            height,
        });
    }

    // Unbondings from validators unknown at genesis are dropped, like their delegations.
    for unbonding in &staking.unbonding_delegations {
        if !by_operator.contains_key(unbonding.validator_address.as_str()) {
            continue;
        }

        for entry in &unbonding.entries {
            rows.unbonding_delegations.push(StoredUnbondingDelegation {
                delegator_address: unbonding.delegator_address.clone(),
                validator_address: unbonding.validator_address.clone(),
                amount: entry.amount(&staking.params.bond_denom)?,
                completion_timestamp: entry.completion_time.naive_utc(),
                creation_height: entry.creation_height()?,
                height,
            });
        }
    }

    for redelegation in &staking.redelegations {
        for entry in &redelegation.entries {
            rows.redelegations.push(StoredRedelegation {
                delegator_address: redelegation.delegator_address.clone(),
                src_validator_address: redelegation.validator_src_address.clone(),
                dst_validator_address: redelegation.validator_dst_address.clone(),
                amount: entry.amount(&staking.params.bond_denom)?,
                completion_timestamp: entry.completion_time.naive_utc(),
                creation_height: entry.creation_height()?,
                height,
            });
        }
    }

    let bank = &doc.app_state.bank;
    rows.balances = bank
        .balances
        .iter()
        .map(|b| StoredAccountBalance {
            address: b.address.clone(),
            coins: b.coins.clone(),
            height,
        })
        .collect();

    if !bank.supply.is_empty() {
        rows.supply = Some(StoredSupply {
            coins: bank.supply.clone(),
            height,
        });
    }

    rows.proposals = doc
        .app_state
        .gov
        .proposals
        .iter()
        .map(|p| stored_proposal(p, height))
        .collect::<anyhow::Result<_>>()
        .map_err(DerivationError::Proposal)?;

    Ok(rows)
}

impl GenesisRows {
    /// The statements writing every derived row. Descriptions and commissions precede the
    /// validators they belong to.
    pub fn statements(&self, writer: &BatchWriter) -> Result<Vec<Statement>, BatchError> {
        let descriptions: Vec<_> = self.validators.iter().map(|v| v.description.clone()).collect();
        let commissions: Vec<_> = self.validators.iter().map(|v| v.commission.clone()).collect();
        let validators: Vec<_> = self.validators.iter().map(|v| v.validator.clone()).collect();
        let latest: Vec<_> = self.statuses.iter().map(LatestStatus).collect();
        let history: Vec<_> = self.statuses.iter().map(StatusHistory).collect();

        let mut statements = writer.upserts(&descriptions)?;
        statements.extend(writer.upserts(&commissions)?);
        statements.extend(writer.upserts(&validators)?);
        statements.extend(writer.upserts(&latest)?);
        statements.extend(writer.upserts(&history)?);
        statements.extend(writer.upserts(&self.delegations)?);
        statements.extend(writer.upserts(&self.self_delegations)?);
        statements.extend(writer.upserts(&self.unbonding_delegations)?);
        statements.extend(writer.upserts(&self.redelegations)?);
        statements.extend(writer.upserts(&self.balances)?);
        statements.extend(writer.upserts(self.supply.as_slice())?);
        statements.extend(writer.upserts(&self.proposals)?);
        Ok(statements)
    }
}

/// Derive the genesis state and write all of it in one transaction. Derivation failures abort
/// the import before anything is written.
pub async fn import_genesis<S: Store>(
    store: &S,
    writer: &BatchWriter,
    doc: &GenesisDoc,
    prefixes: &Bech32Prefixes,
) -> anyhow::Result<usize> {
    let rows = derive(doc, prefixes).context("Failed to derive genesis state")?;
    let statements = rows.statements(writer)?;

    info!(
        chain_id = %doc.chain_id,
        height = rows.height,
        validators = rows.validators.len(),
        delegations = rows.delegations.len(),
        accounts = rows.balances.len(),
        statements = statements.len(),
        "Importing genesis"
    );

    let mut conn = store.connect().await?;
    let affected = conn
        .execute_atomic(&statements)
        .await
        .context("Failed to write genesis state")?;

    info!(affected, "Imported genesis");
    Ok(affected)
}

fn status(
    info: &ValidatorRows,
    validator: &Validator,
    height: i64,
    timestamp: NaiveDateTime,
) -> StoredStatusObservation {
    StoredStatusObservation {
        consensus_address: info.validator.consensus_address.clone(),
        status: StoredValidatorStatus {
            status: validator.status.code(),
            jailed: validator.jailed,
            height,
        },
        timestamp: Some(timestamp),
    }
}

fn create_validator_msgs(doc: &GenesisDoc) -> Result<Vec<MsgCreateValidator>, DerivationError> {
    let mut msgs = vec![];
    for (index, tx) in doc.app_state.genutil.gen_txs.iter().enumerate() {
        for msg in &tx.body.messages {
            if msg.get("@type").and_then(|t| t.as_str()) != Some(MSG_CREATE_VALIDATOR) {
                continue;
            }

            let msg = serde_json::from_value(msg.clone())
                .map_err(|source| DerivationError::GenTx { index, source })?;
            msgs.push(msg);
        }
    }

    Ok(msgs)
}

fn number(field: &'static str, value: &str) -> Result<BigDecimal, DerivationError> {
    value.parse().map_err(|_| DerivationError::Number {
        field,
        value: value.to_owned(),
    })
}

/// A decimal as an exact fraction of integers.
fn ratio(value: &BigDecimal) -> (BigInt, BigInt) {
    let (mantissa, scale) = value.as_bigint_and_exponent();
    if scale >= 0 {
        (mantissa, BigInt::from(10).pow(scale as u32))
    } else {
        (
            mantissa * BigInt::from(10).pow(scale.unsigned_abs() as u32),
            BigInt::from(1),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use base64::{engine::general_purpose::STANDARD, Engine};
    use bech32::{ToBase32, Variant};
    use serde_json::json;

    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn bech(hrp: &str, byte: u8) -> String {
        bech32::encode(hrp, [byte; 20].to_base32(), Variant::Bech32).unwrap()
    }

    fn genesis() -> GenesisDoc {
        let operator = bech("cosmosvaloper", 1);
        let own = bech("cosmos", 1);
        let other = bech("cosmos", 2);

        serde_json::from_value(json!({
            "genesis_time": "2024-03-01T00:00:00Z",
            "chain_id": "test-1",
            "initial_height": "1",
            "app_state": {
                "bank": {
                    "balances": [
                        { "address": own, "coins": [{ "denom": "stake", "amount": "10" }] },
                        { "address": other, "coins": [{ "denom": "stake", "amount": "20" }] },
                    ],
                    "supply": [{ "denom": "stake", "amount": "30" }],
                },
                "staking": {
                    "params": { "bond_denom": "stake" },
                    "validators": [{
                        "operator_address": operator,
                        "consensus_pubkey": {
                            "@type": "/cosmos.crypto.ed25519.PubKey",
                            "key": STANDARD.encode([9u8; 32]),
                        },
                        "jailed": false,
                        "status": "BOND_STATUS_BONDED",
                        "tokens": "301",
                        "delegator_shares": "300.000000000000000000",
                        "description": { "moniker": "genesis" },
                        "commission": { "commission_rates": {
                            "rate": "0.1", "max_rate": "0.2", "max_change_rate": "0.01",
                        }},
                        "min_self_delegation": "1",
                    }],
                    "delegations": [
                        { "delegator_address": own, "validator_address": operator, "shares": "100" },
                        { "delegator_address": other, "validator_address": operator, "shares": "200" },
                    ],
                },
            },
        }))
        .unwrap()
    }

    #[test]
    fn amount_is_proportional() {
        assert_eq!(
            delegation_amount(&dec("1000"), &dec("1000"), &dec("500")),
            Some(BigInt::from(500))
        );
    }

    #[test]
    fn amount_truncates() {
        // 301 * 100 / 300 = 100.33...
        assert_eq!(
            delegation_amount(&dec("301"), &dec("300"), &dec("100")),
            Some(BigInt::from(100))
        );
        assert_eq!(
            delegation_amount(&dec("301"), &dec("300.000000000000000000"), &dec("200")),
            Some(BigInt::from(200))
        );
    }

    #[test]
    fn amount_with_fractional_shares() {
        // 1000 * 0.5 / 1.5 = 333.33...
        assert_eq!(
            delegation_amount(&dec("1000"), &dec("1.5"), &dec("0.5")),
            Some(BigInt::from(333))
        );
    }

    #[test]
    fn zero_total_shares() {
        assert_eq!(delegation_amount(&dec("1000"), &dec("0"), &dec("5")), None);
        assert_eq!(shares_percent(&dec("5"), &dec("0.000")), None);
    }

    #[test]
    fn percent_of_shares() {
        assert_eq!(shares_percent(&dec("1"), &dec("4")), Some(dec("25")));
        assert_eq!(
            shares_percent(&dec("1"), &dec("3")),
            Some(dec("33.333333333333333333"))
        );
    }

    #[test]
    fn derive_genesis() {
        let prefixes = Bech32Prefixes::new("cosmos");
        let rows = derive(&genesis(), &prefixes).unwrap();

        assert_eq!(rows.height, 1);
        assert_eq!(rows.validators.len(), 1);
        assert_eq!(rows.validators[0].description.description.moniker, "genesis");
        assert_eq!(rows.statuses[0].status.status, 3);
        assert_eq!(
            rows.statuses[0].timestamp.unwrap().to_string(),
            "2024-03-01 00:00:00"
        );

        let amounts: Vec<_> = rows
            .delegations
            .iter()
            .map(|d| d.amount.amount.as_str())
            .collect();
        assert_eq!(amounts, vec!["100", "200"]);

        assert_eq!(rows.self_delegations.len(), 1);
        assert_eq!(rows.self_delegations[0].delegator_address, bech("cosmos", 1));
        assert_eq!(
            rows.self_delegations[0].shares_percent,
            dec("33.333333333333333333")
        );

        assert_eq!(rows.balances.len(), 2);
        assert!(rows.supply.is_some());
    }

    #[test]
    fn unbondings_and_redelegations() {
        let mut doc = genesis();
        let entries = |heights: &[&str]| -> serde_json::Value {
            heights
                .iter()
                .map(|h| {
                    json!({
                        "creation_height": h,
                        "completion_time": "2024-03-22T00:00:00Z",
                        "initial_balance": "40",
                        "balance": "40",
                    })
                })
                .collect()
        };

        doc.app_state.staking.unbonding_delegations = serde_json::from_value(json!([
            {
                "delegator_address": bech("cosmos", 2),
                "validator_address": bech("cosmosvaloper", 1),
                "entries": entries(&["0", "0"]),
            },
            {
                "delegator_address": bech("cosmos", 2),
                "validator_address": bech("cosmosvaloper", 9),
                "entries": entries(&["0"]),
            },
        ]))
        .unwrap();

        doc.app_state.staking.redelegations = serde_json::from_value(json!([{
            "delegator_address": bech("cosmos", 1),
            "validator_src_address": bech("cosmosvaloper", 1),
            "validator_dst_address": bech("cosmosvaloper", 9),
            "entries": entries(&["0"]),
        }]))
        .unwrap();

        let prefixes = Bech32Prefixes::new("cosmos");
        let rows = derive(&doc, &prefixes).unwrap();

        // The unknown validator's unbonding is dropped, not its redelegation.
        assert_eq!(rows.unbonding_delegations.len(), 2);
        assert_eq!(rows.redelegations.len(), 1);

        let unbonding = &rows.unbonding_delegations[0];
        assert_eq!(unbonding.amount.denom, "stake");
        assert_eq!(unbonding.amount.amount, "40");
        assert_eq!(unbonding.creation_height, 0);
        assert_eq!(unbonding.height, 1);
        assert_eq!(
            unbonding.completion_timestamp.to_string(),
            "2024-03-22 00:00:00"
        );

        doc.app_state.staking.redelegations[0].entries[0].initial_balance = "4.5".to_string();
        assert!(matches!(
            derive(&doc, &prefixes),
            Err(DerivationError::Number {
                field: "initial_balance",
                ..
            })
        ));
    }

    #[test]
    fn malformed_numbers_abort_derivation() {
        let mut doc = genesis();
        doc.app_state.staking.validators[0].tokens = "lots".to_string();

        let prefixes = Bech32Prefixes::new("cosmos");
        assert!(matches!(
            derive(&doc, &prefixes),
            Err(DerivationError::Number { field: "tokens", .. })
        ));
    }

    #[test]
    fn gen_tx_validators() {
        let mut doc = genesis();
        doc.app_state.staking.validators.clear();
        doc.app_state.staking.delegations.clear();
        doc.app_state.genutil.gen_txs.push(GenTx {
            body: GenTxBody {
                messages: vec![json!({
                    "@type": MSG_CREATE_VALIDATOR,
                    "description": { "moniker": "gentx" },
                    "commission": { "rate": "0.1", "max_rate": "0.2", "max_change_rate": "0.01" },
                    "min_self_delegation": "1",
                    "delegator_address": bech("cosmos", 3),
                    "validator_address": bech("cosmosvaloper", 3),
                    "pubkey": {
                        "@type": "/cosmos.crypto.ed25519.PubKey",
                        "key": STANDARD.encode([4u8; 32]),
                    },
                    "value": { "denom": "stake", "amount": "100" },
                })],
            },
        });

        let prefixes = Bech32Prefixes::new("cosmos");
        let rows = derive(&doc, &prefixes).unwrap();
        assert_eq!(rows.validators.len(), 1);
        assert_eq!(rows.validators[0].description.description.moniker, "gentx");
        assert_eq!(
            rows.validators[0].validator.self_delegate_address,
            bech("cosmos", 3)
        );
    }
}
