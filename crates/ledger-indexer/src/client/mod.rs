// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use ledger_indexer_framework::pagination::{Page, PageRequest};
use reqwest::StatusCode;

use self::types::{
    BlockInfo, Coin, DelegationResponse, DelegatorReward, Deposit, Evidence, Proposal,
    StakingPool, TallyResult, Validator, ValidatorPower, Vote,
};

pub mod lcd;
pub mod types;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("Request to {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{path} not found")]
    NotFound { path: String },

    #[error("Request to {path} returned {status}")]
    Status { path: String, status: StatusCode },

    #[error("Failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid pagination key from {path}: {source}")]
    Cursor {
        path: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Invalid URL for {path}: {source}")]
    Url {
        path: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid height {0:?} in response")]
    Height(String),

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),
}

/// Read access to the chain's state. Every query takes an optional `height` pinning it to a
/// historical snapshot, or `None` for the latest state. Paginated queries resume from the
/// cursor in `page` and return the cursor of the following page, if any.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Height and time of the most recent block.
    async fn latest_block(&self) -> Result<BlockInfo>;

    async fn balances(
        &self,
        address: &str,
        height: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<Coin>>;

    async fn supply(&self, height: Option<i64>, page: PageRequest) -> Result<Page<Coin>>;

    async fn community_pool(&self, height: Option<i64>) -> Result<Vec<Coin>>;

    async fn staking_pool(&self, height: Option<i64>) -> Result<StakingPool>;

    async fn validators(&self, height: Option<i64>, page: PageRequest) -> Result<Page<Validator>>;

    async fn validator(&self, operator: &str, height: Option<i64>) -> Result<Validator>;

    async fn validator_delegations(
        &self,
        validator: &str,
        height: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<DelegationResponse>>;

    async fn delegator_delegations(
        &self,
        delegator: &str,
        height: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<DelegationResponse>>;

    async fn validator_commission(&self, validator: &str, height: Option<i64>)
        -> Result<Vec<Coin>>;

    async fn delegation_rewards(
        &self,
        delegator: &str,
        height: Option<i64>,
    ) -> Result<Vec<DelegatorReward>>;

    /// Voting power of the active validator set at `height`.
    async fn validator_set(&self, height: i64, page: PageRequest) -> Result<Page<ValidatorPower>>;

    async fn evidence(&self, height: Option<i64>, page: PageRequest) -> Result<Page<Evidence>>;

    async fn proposals(&self, height: Option<i64>, page: PageRequest) -> Result<Page<Proposal>>;

    async fn tally(&self, proposal_id: u64, height: Option<i64>) -> Result<TallyResult>;

    async fn deposits(
        &self,
        proposal_id: u64,
        height: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<Deposit>>;

    async fn votes(
        &self,
        proposal_id: u64,
        height: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<Vote>>;
}
