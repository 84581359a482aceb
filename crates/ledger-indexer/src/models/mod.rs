// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use anyhow::Context;
use bigdecimal::BigDecimal;
use ledger_indexer_framework::record::Value;

use crate::client::types::Coin;

pub mod bank;
pub mod distribution;
pub mod gov;
pub mod staking;

/// Coin lists are stored as JSON arrays of `{"denom", "amount"}` objects.
pub(crate) fn coins(coins: &[Coin]) -> Value {
    Value::Json(serde_json::to_value(coins).unwrap_or_default())
}

pub(crate) fn coin(coin: &Coin) -> Value {
    Value::Json(serde_json::to_value(coin).unwrap_or_default())
}

/// Parse a decimal string as transmitted by the chain, naming `field` on failure.
pub fn decimal(value: &str, field: &str) -> anyhow::Result<BigDecimal> {
    BigDecimal::from_str(value).with_context(|| format!("Invalid decimal {value:?} for {field}"))
}

/// Optional text columns are stored as NULL rather than as empty strings.
pub(crate) fn opt_text(value: &str) -> Value {
    Value::OptText((!value.is_empty()).then(|| value.to_owned()))
}
