// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};

use crate::{
    address::Bech32Prefixes,
    client::types::{Description, MsgCreateValidator, PubKey, Validator},
    models::{
        decimal,
        staking::{StoredValidator, StoredValidatorCommission, StoredValidatorDescription},
    },
};

/// The fields of a validator that are persisted, however the validator was observed: queried
/// from the chain, listed in a genesis document, or announced by a create-validator message.
pub trait ValidatorInfo {
    fn operator_address(&self) -> &str;

    fn consensus_pubkey(&self) -> &PubKey;

    fn description(&self) -> &Description;

    fn commission_rate(&self) -> &str;

    fn max_rate(&self) -> &str;

    fn max_change_rate(&self) -> &str;

    fn min_self_delegation(&self) -> &str;
}

/// The three latest-state rows describing one validator at one height. They are always written
/// together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorRows {
    pub validator: StoredValidator,
    pub description: StoredValidatorDescription,
    pub commission: StoredValidatorCommission,
}

impl ValidatorRows {
    pub fn new(info: &impl ValidatorInfo, prefixes: &Bech32Prefixes, height: i64) -> Result<Self> {
        let operator_address = info.operator_address().to_owned();
        let pubkey = info.consensus_pubkey();

        let consensus_address = prefixes
            .consensus_address(&pubkey.type_url, &pubkey.key)
            .with_context(|| format!("Consensus address of {operator_address}"))?;

        let self_delegate_address = prefixes.self_delegate_address(&operator_address)?;

        let consensus_pubkey =
            serde_json::to_string(pubkey).context("Failed to serialize consensus key")?;

        Ok(Self {
            validator: StoredValidator {
                operator_address: operator_address.clone(),
                consensus_address,
                consensus_pubkey,
                self_delegate_address,
                max_rate: decimal(info.max_rate(), "max_rate")?,
                max_change_rate: decimal(info.max_change_rate(), "max_change_rate")?,
                height,
            },
            description: StoredValidatorDescription {
                operator_address: operator_address.clone(),
                description: info.description().clone(),
                height,
            },
            commission: StoredValidatorCommission {
                operator_address,
                commission_rate: decimal(info.commission_rate(), "commission_rate")?,
                min_self_delegation: decimal(info.min_self_delegation(), "min_self_delegation")?,
                height,
            },
        })
    }
}

impl ValidatorInfo for Validator {
    fn operator_address(&self) -> &str {
        &self.operator_address
    }

    fn consensus_pubkey(&self) -> &PubKey {
        &self.consensus_pubkey
    }

    fn description(&self) -> &Description {
        &self.description
    }

    fn commission_rate(&self) -> &str {
        &self.commission.commission_rates.rate
    }

    fn max_rate(&self) -> &str {
        &self.commission.commission_rates.max_rate
    }

    fn max_change_rate(&self) -> &str {
        &self.commission.commission_rates.max_change_rate
    }

    fn min_self_delegation(&self) -> &str {
        &self.min_self_delegation
    }
}

impl ValidatorInfo for MsgCreateValidator {
    fn operator_address(&self) -> &str {
        &self.validator_address
    }

    fn consensus_pubkey(&self) -> &PubKey {
        &self.pubkey
    }

    fn description(&self) -> &Description {
        &self.description
    }

    fn commission_rate(&self) -> &str {
        &self.commission.rate
    }

    fn max_rate(&self) -> &str {
        &self.commission.max_rate
    }

    fn max_change_rate(&self) -> &str {
        &self.commission.max_change_rate
    }

    fn min_self_delegation(&self) -> &str {
        &self.min_self_delegation
    }
}
