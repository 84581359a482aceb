// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Wire types returned by the chain's REST query service. Amounts, heights and shares are
//! transmitted as decimal strings and are parsed at the point of persisting them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct PageResponse {
    /// Base64-encoded cursor, `null` or empty once the query is exhausted.
    #[serde(default)]
    pub next_key: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PubKey {
    #[serde(rename = "@type")]
    pub type_url: String,
    /// Base64-encoded key bytes.
    pub key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Description {
    #[serde(default)]
    pub moniker: String,
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub security_contact: String,
    #[serde(default)]
    pub details: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CommissionRates {
    pub rate: String,
    pub max_rate: String,
    pub max_change_rate: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Commission {
    pub commission_rates: CommissionRates,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BondStatus {
    #[serde(rename = "BOND_STATUS_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "BOND_STATUS_UNBONDED")]
    Unbonded,
    #[serde(rename = "BOND_STATUS_UNBONDING")]
    Unbonding,
    #[serde(rename = "BOND_STATUS_BONDED")]
    Bonded,
}

impl BondStatus {
    /// The status as numbered by the staking module.
    pub fn code(self) -> i32 {
        match self {
            BondStatus::Unspecified => 0,
            BondStatus::Unbonded => 1,
            BondStatus::Unbonding => 2,
            BondStatus::Bonded => 3,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Validator {
    pub operator_address: String,
    pub consensus_pubkey: PubKey,
    #[serde(default)]
    pub jailed: bool,
    pub status: BondStatus,
    pub tokens: String,
    pub delegator_shares: String,
    #[serde(default)]
    pub description: Description,
    pub commission: Commission,
    pub min_self_delegation: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Delegation {
    pub delegator_address: String,
    pub validator_address: String,
    pub shares: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DelegationResponse {
    pub delegation: Delegation,
    pub balance: Coin,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StakingPool {
    pub bonded_tokens: String,
    pub not_bonded_tokens: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DelegatorReward {
    pub validator_address: String,
    #[serde(default)]
    pub reward: Vec<Coin>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ValidatorPower {
    /// Consensus address of the validator.
    pub address: String,
    pub voting_power: String,
}

/// Evidence of misbehaviour. Only equivocation evidence carries the fields below.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Evidence {
    #[serde(rename = "@type")]
    pub type_url: String,
    pub height: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub power: Option<String>,
    pub consensus_address: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TallyResult {
    pub yes: String,
    pub abstain: String,
    pub no: String,
    pub no_with_veto: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Proposal {
    pub proposal_id: String,
    /// The proposal's content message: an `@type` plus a title and description.
    pub content: serde_json::Value,
    pub status: String,
    pub submit_time: Option<DateTime<Utc>>,
    pub deposit_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_deposit: Vec<Coin>,
    pub voting_start_time: Option<DateTime<Utc>>,
    pub voting_end_time: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Deposit {
    pub proposal_id: String,
    pub depositor: String,
    #[serde(default)]
    pub amount: Vec<Coin>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Vote {
    pub proposal_id: String,
    pub voter: String,
    pub option: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub height: i64,
    pub time: DateTime<Utc>,
}

/// The validator-creation message, as it appears in genesis transactions and in blocks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgCreateValidator {
    pub description: Description,
    pub commission: CommissionRates,
    pub min_self_delegation: String,
    pub delegator_address: String,
    pub validator_address: String,
    pub pubkey: PubKey,
    pub value: Coin,
}

/// The validator-edit message. Description fields the sender left unchanged hold a placeholder
/// and unchanged rates are omitted, so the edited state has to be read back from the chain.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MsgEditValidator {
    pub description: Description,
    pub validator_address: String,
    #[serde(default)]
    pub commission_rate: Option<String>,
    #[serde(default)]
    pub min_self_delegation: Option<String>,
}

// Response envelopes.

#[derive(Deserialize, Debug)]
pub(crate) struct BalancesResponse {
    pub balances: Vec<Coin>,
    #[serde(default)]
    pub pagination: Option<PageResponse>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct SupplyResponse {
    pub supply: Vec<Coin>,
    #[serde(default)]
    pub pagination: Option<PageResponse>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct CommunityPoolResponse {
    pub pool: Vec<Coin>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct StakingPoolResponse {
    pub pool: StakingPool,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ValidatorResponse {
    pub validator: Validator,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ValidatorsResponse {
    pub validators: Vec<Validator>,
    #[serde(default)]
    pub pagination: Option<PageResponse>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct DelegationsResponse {
    pub delegation_responses: Vec<DelegationResponse>,
    #[serde(default)]
    pub pagination: Option<PageResponse>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ValidatorCommission {
    #[serde(default)]
    pub commission: Vec<Coin>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct CommissionResponse {
    pub commission: ValidatorCommission,
}

#[derive(Deserialize, Debug)]
pub(crate) struct RewardsResponse {
    #[serde(default)]
    pub rewards: Vec<DelegatorReward>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ValidatorSetResponse {
    pub validators: Vec<ValidatorPower>,
    #[serde(default)]
    pub pagination: Option<PageResponse>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct EvidenceResponse {
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub pagination: Option<PageResponse>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ProposalsResponse {
    pub proposals: Vec<Proposal>,
    #[serde(default)]
    pub pagination: Option<PageResponse>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct TallyResponse {
    pub tally: TallyResult,
}

#[derive(Deserialize, Debug)]
pub(crate) struct DepositsResponse {
    pub deposits: Vec<Deposit>,
    #[serde(default)]
    pub pagination: Option<PageResponse>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct VotesResponse {
    pub votes: Vec<Vote>,
    #[serde(default)]
    pub pagination: Option<PageResponse>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct Header {
    pub height: String,
    pub time: DateTime<Utc>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct Block {
    pub header: Header,
}

#[derive(Deserialize, Debug)]
pub(crate) struct BlockResponse {
    pub block: Block,
}
