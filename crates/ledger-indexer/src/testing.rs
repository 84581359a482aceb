// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! An in-process chain to run drivers against in tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use ledger_indexer_framework::{
    in_memory_store::InMemoryStore,
    pagination::{Cursor, Page, PageRequest},
    BatchWriter, Dispatcher,
};
use prometheus::Registry;
use reqwest::StatusCode;

use crate::{
    address::{encode, Bech32Prefixes},
    client::{
        types::{
            BlockInfo, BondStatus, Coin, Commission, CommissionRates, Delegation,
            DelegationResponse, DelegatorReward, Deposit, Description, Evidence, Proposal, PubKey,
            StakingPool, TallyResult, Validator, ValidatorPower, Vote,
        },
        ChainClient, QueryError, Result,
    },
    handlers::Context,
    metrics::IndexerMetrics,
};

/// Chain state served by [MockChainClient]. Paginated queries are served from these lists in
/// order, with the cursor encoding the offset of the next page.
#[derive(Default)]
pub struct MockState {
    pub block: Option<BlockInfo>,
    pub balances: HashMap<String, Vec<Coin>>,
    pub supply: Vec<Coin>,
    pub community_pool: Vec<Coin>,
    pub staking_pool: Option<StakingPool>,
    pub validators: Vec<Validator>,
    pub delegations: Vec<DelegationResponse>,
    pub commission: HashMap<String, Vec<Coin>>,
    pub rewards: HashMap<String, Vec<DelegatorReward>>,
    pub validator_set: Vec<ValidatorPower>,
    pub evidence: Vec<Evidence>,
    pub proposals: Vec<Proposal>,
    pub tallies: HashMap<u64, TallyResult>,
    pub deposits: HashMap<u64, Vec<Deposit>>,
    pub votes: HashMap<u64, Vec<Vote>>,

    /// Addresses (account, validator or delegator) whose queries fail.
    pub failing: HashSet<String>,

    /// Number of queries served, successful or not.
    pub requests: usize,
}

#[derive(Default)]
pub struct MockChainClient {
    state: Mutex<MockState>,
}

impl MockChainClient {
    pub fn new(state: MockState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Count the request, and fail it if it concerns a failing address.
    fn serve(&self, path: String, key: &str) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.state();
        state.requests += 1;

        if state.failing.contains(key) {
            return Err(QueryError::Status {
                path,
                status: StatusCode::INTERNAL_SERVER_ERROR,
            });
        }

        Ok(state)
    }
}

/// Serve `items` a page at a time, with the cursor holding the offset of the next page.
pub fn page<T: Clone>(items: &[T], request: PageRequest) -> Result<Page<T>> {
    let start = match &request.key {
        None => 0,
        Some(cursor) => {
            let bytes: [u8; 8] = cursor
                .as_bytes()
                .try_into()
                .map_err(|_| QueryError::Height("malformed cursor".to_string()))?;
            u64::from_be_bytes(bytes) as usize
        }
    };

    let limit = request.limit.max(1) as usize;
    let end = items.len().min(start + limit);
    let records = items.get(start..end).unwrap_or_default().to_vec();

    let next_key = if end < items.len() {
        Cursor::new((end as u64).to_be_bytes())
    } else {
        None
    };

    Ok(Page { records, next_key })
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn latest_block(&self) -> Result<BlockInfo> {
        let state = self.serve("/blocks/latest".to_string(), "")?;
        state.block.ok_or_else(|| QueryError::NotFound {
            path: "/blocks/latest".to_string(),
        })
    }

    async fn balances(
        &self,
        address: &str,
        _height: Option<i64>,
        request: PageRequest,
    ) -> Result<Page<Coin>> {
        let state = self.serve(format!("/balances/{address}"), address)?;
        let coins = state.balances.get(address).cloned().unwrap_or_default();
        page(&coins, request)
    }

    async fn supply(&self, _height: Option<i64>, request: PageRequest) -> Result<Page<Coin>> {
        let state = self.serve("/supply".to_string(), "")?;
        page(&state.supply, request)
    }

    async fn community_pool(&self, _height: Option<i64>) -> Result<Vec<Coin>> {
        let state = self.serve("/community_pool".to_string(), "")?;
        Ok(state.community_pool.clone())
    }

    async fn staking_pool(&self, _height: Option<i64>) -> Result<StakingPool> {
        let state = self.serve("/staking/pool".to_string(), "")?;
        state.staking_pool.clone().ok_or_else(|| QueryError::NotFound {
            path: "/staking/pool".to_string(),
        })
    }

    async fn validators(&self, _height: Option<i64>, request: PageRequest) -> Result<Page<Validator>> {
        let state = self.serve("/validators".to_string(), "")?;
        page(&state.validators, request)
    }

    async fn validator(&self, operator: &str, _height: Option<i64>) -> Result<Validator> {
        let path = format!("/validators/{operator}");
        let state = self.serve(path.clone(), operator)?;
        state
            .validators
            .iter()
            .find(|v| v.operator_address == operator)
            .cloned()
            .ok_or(QueryError::NotFound { path })
    }

    async fn validator_delegations(
        &self,
        validator: &str,
        _height: Option<i64>,
        request: PageRequest,
    ) -> Result<Page<DelegationResponse>> {
        let state = self.serve(format!("/validators/{validator}/delegations"), validator)?;
        let delegations: Vec<_> = state
            .delegations
            .iter()
            .filter(|d| d.delegation.validator_address == validator)
            .cloned()
            .collect();
        page(&delegations, request)
    }

    async fn delegator_delegations(
        &self,
        delegator: &str,
        _height: Option<i64>,
        request: PageRequest,
    ) -> Result<Page<DelegationResponse>> {
        let state = self.serve(format!("/delegations/{delegator}"), delegator)?;
        let delegations: Vec<_> = state
            .delegations
            .iter()
            .filter(|d| d.delegation.delegator_address == delegator)
            .cloned()
            .collect();
        page(&delegations, request)
    }

    async fn validator_commission(
        &self,
        validator: &str,
        _height: Option<i64>,
    ) -> Result<Vec<Coin>> {
        let state = self.serve(format!("/validators/{validator}/commission"), validator)?;
        Ok(state.commission.get(validator).cloned().unwrap_or_default())
    }

    async fn delegation_rewards(
        &self,
        delegator: &str,
        _height: Option<i64>,
    ) -> Result<Vec<DelegatorReward>> {
        let state = self.serve(format!("/delegators/{delegator}/rewards"), delegator)?;
        Ok(state.rewards.get(delegator).cloned().unwrap_or_default())
    }

    async fn validator_set(&self, height: i64, request: PageRequest) -> Result<Page<ValidatorPower>> {
        let state = self.serve(format!("/validatorsets/{height}"), "")?;
        page(&state.validator_set, request)
    }

    async fn evidence(&self, _height: Option<i64>, request: PageRequest) -> Result<Page<Evidence>> {
        let state = self.serve("/evidence".to_string(), "")?;
        page(&state.evidence, request)
    }

    async fn proposals(&self, _height: Option<i64>, request: PageRequest) -> Result<Page<Proposal>> {
        let state = self.serve("/proposals".to_string(), "")?;
        page(&state.proposals, request)
    }

    async fn tally(&self, proposal_id: u64, _height: Option<i64>) -> Result<TallyResult> {
        let path = format!("/proposals/{proposal_id}/tally");
        let state = self.serve(path.clone(), &proposal_id.to_string())?;
        state
            .tallies
            .get(&proposal_id)
            .cloned()
            .ok_or(QueryError::NotFound { path })
    }

    async fn deposits(
        &self,
        proposal_id: u64,
        _height: Option<i64>,
        request: PageRequest,
    ) -> Result<Page<Deposit>> {
        let state = self.serve(
            format!("/proposals/{proposal_id}/deposits"),
            &proposal_id.to_string(),
        )?;
        let deposits = state.deposits.get(&proposal_id).cloned().unwrap_or_default();
        page(&deposits, request)
    }

    async fn votes(
        &self,
        proposal_id: u64,
        _height: Option<i64>,
        request: PageRequest,
    ) -> Result<Page<Vote>> {
        let state = self.serve(
            format!("/proposals/{proposal_id}/votes"),
            &proposal_id.to_string(),
        )?;
        let votes = state.votes.get(&proposal_id).cloned().unwrap_or_default();
        page(&votes, request)
    }
}

/// A driver context over an in-memory store and a mock chain, with metrics registered against a
/// throwaway registry.
pub fn context(
    store: InMemoryStore,
    client: MockChainClient,
    writer: BatchWriter,
) -> Arc<Context<InMemoryStore, MockChainClient>> {
    Arc::new(Context {
        store,
        client: Arc::new(client),
        writer,
        dispatcher: Dispatcher::new(4),
        page_size: 100,
        prefixes: Bech32Prefixes::new("cosmos"),
        metrics: IndexerMetrics::new(&Registry::new()),
    })
}

/// The `n`-th test account address.
pub fn account(n: u32) -> String {
    address("cosmos", n)
}

/// The operator address controlled by the same key as [account] `n`.
pub fn operator(n: u32) -> String {
    address("cosmosvaloper", n)
}

/// A bonded validator with operator address [operator] `n` and an ed25519 consensus key derived
/// from `n`.
pub fn validator(n: u32) -> Validator {
    let mut key = [0u8; 32];
    key[..4].copy_from_slice(&n.to_be_bytes());

    Validator {
        operator_address: operator(n),
        consensus_pubkey: PubKey {
            type_url: "/cosmos.crypto.ed25519.PubKey".to_string(),
            key: STANDARD.encode(key),
        },
        jailed: false,
        status: BondStatus::Bonded,
        tokens: "1000".to_string(),
        delegator_shares: "1000.000000000000000000".to_string(),
        description: Description {
            moniker: format!("validator-{n}"),
            ..Description::default()
        },
        commission: Commission {
            commission_rates: CommissionRates {
                rate: "0.100000000000000000".to_string(),
                max_rate: "0.200000000000000000".to_string(),
                max_change_rate: "0.010000000000000000".to_string(),
            },
        },
        min_self_delegation: "1".to_string(),
    }
}

pub fn delegation(delegator: &str, validator: &str, amount: u64) -> DelegationResponse {
    DelegationResponse {
        delegation: Delegation {
            delegator_address: delegator.to_string(),
            validator_address: validator.to_string(),
            shares: format!("{amount}.000000000000000000"),
        },
        balance: stake(amount),
    }
}

pub fn stake(amount: u64) -> Coin {
    Coin {
        denom: "stake".to_string(),
        amount: amount.to_string(),
    }
}

pub fn block(height: i64) -> BlockInfo {
    BlockInfo {
        height,
        time: DateTime::<Utc>::from_timestamp(1_700_000_000 + height, 0).unwrap_or_default(),
    }
}

fn address(hrp: &str, n: u32) -> String {
    let mut bytes = [0u8; 20];
    bytes[16..].copy_from_slice(&n.to_be_bytes());
    encode(hrp, &bytes).unwrap_or_default()
}
