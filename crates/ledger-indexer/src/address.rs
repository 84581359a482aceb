// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use bech32::{FromBase32, ToBase32, Variant};
use sha2::{Digest, Sha256};

/// Type URL of the only consensus key type whose address derivation is supported.
const ED25519_PUBKEY: &str = "/cosmos.crypto.ed25519.PubKey";

/// Consensus addresses are the first 20 bytes of the SHA-256 of the consensus public key.
const CONSENSUS_ADDRESS_LEN: usize = 20;

/// Human-readable parts used by a chain's bech32 addresses. All three are derived from the
/// account prefix, following the SDK's convention.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bech32Prefixes {
    pub account: String,
    pub validator_operator: String,
    pub consensus: String,
}

impl Bech32Prefixes {
    pub fn new(account: &str) -> Self {
        Self {
            account: account.to_owned(),
            validator_operator: format!("{account}valoper"),
            consensus: format!("{account}valcons"),
        }
    }

    /// The account address controlled by the same key as the validator `operator_address`.
    pub fn self_delegate_address(&self, operator_address: &str) -> Result<String> {
        convert(operator_address, &self.validator_operator, &self.account)
    }

    /// The consensus address of a validator with the given base64-encoded consensus key.
    pub fn consensus_address(&self, type_url: &str, key: &str) -> Result<String> {
        if type_url != ED25519_PUBKEY {
            bail!("Unsupported consensus key type {type_url}");
        }

        let key = STANDARD
            .decode(key)
            .with_context(|| format!("Invalid base64 consensus key {key:?}"))?;

        let digest = Sha256::digest(&key);
        encode(&self.consensus, &digest[..CONSENSUS_ADDRESS_LEN])
    }
}

/// Re-encode `address` (which must carry the `from` prefix) under the `to` prefix.
pub fn convert(address: &str, from: &str, to: &str) -> Result<String> {
    let (hrp, data, _) =
        bech32::decode(address).with_context(|| format!("Invalid bech32 address {address:?}"))?;

    if hrp != from {
        bail!("Expected {address:?} to have prefix {from:?}, found {hrp:?}");
    }

    let bytes = Vec::<u8>::from_base32(&data)
        .with_context(|| format!("Invalid bech32 payload in {address:?}"))?;

    encode(to, &bytes)
}

pub(crate) fn encode(hrp: &str, bytes: &[u8]) -> Result<String> {
    bech32::encode(hrp, bytes.to_base32(), Variant::Bech32)
        .with_context(|| format!("Failed to encode address with prefix {hrp:?}"))
}
