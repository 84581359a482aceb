// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use ledger_indexer_framework::pagination::{Cursor, Page, PageRequest};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::types::*;
use super::{ChainClient, QueryError, Result};

/// Header the REST gateway reads to serve a query against a historical height.
const HEIGHT_HEADER: &str = "x-cosmos-block-height";

#[derive(clap::Args, Debug, Clone)]
pub struct LcdArgs {
    /// Base URL of the chain's REST (LCD) query service.
    #[arg(long, default_value = "http://localhost:1317")]
    pub lcd_url: Url,

    /// Time to wait for a single query to complete.
    #[arg(
        long,
        default_value = "30000",
        value_name = "MILLISECONDS",
        value_parser = |s: &str| s.parse().map(Duration::from_millis)
    )]
    pub lcd_timeout: Duration,
}

/// [ChainClient] over the Cosmos SDK REST gateway. Queries are not retried: a failed query fails
/// the unit of work it belongs to, which is picked up again on the next sync.
#[derive(Clone)]
pub struct LcdClient {
    url: Url,
    client: Client,
}

impl LcdClient {
    pub fn new(args: LcdArgs) -> Result<Self> {
        Ok(Self {
            url: args.lcd_url,
            client: Client::builder().timeout(args.lcd_timeout).build()?,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        height: Option<i64>,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url.join(path).map_err(|source| QueryError::Url {
            path: path.to_owned(),
            source,
        })?;

        let mut request = self.client.get(url).query(query);
        if let Some(height) = height {
            request = request.header(HEIGHT_HEADER, height.to_string());
        }

        let response = request.send().await.map_err(|source| QueryError::Request {
            path: path.to_owned(),
            source,
        })?;

        match response.status() {
            code if code.is_success() => {
                debug!(path, ?height, "Query succeeded");
                response.json().await.map_err(|source| QueryError::Decode {
                    path: path.to_owned(),
                    source,
                })
            }

            StatusCode::NOT_FOUND => Err(QueryError::NotFound {
                path: path.to_owned(),
            }),

            status => {
                warn!(path, ?height, %status, "Query failed");
                Err(QueryError::Status {
                    path: path.to_owned(),
                    status,
                })
            }
        }
    }

    /// Like [Self::get], but passing the page request along as query parameters, and returning
    /// the records selected by `records` along with the decoded cursor for the next page.
    async fn get_page<R, T>(
        &self,
        path: &str,
        height: Option<i64>,
        page: PageRequest,
        records: impl FnOnce(R) -> (Vec<T>, Option<PageResponse>),
    ) -> Result<Page<T>>
    where
        R: DeserializeOwned,
    {
        let mut query = vec![("pagination.limit", page.limit.to_string())];
        if let Some(key) = &page.key {
            query.push(("pagination.key", STANDARD.encode(key.as_bytes())));
        }

        let response: R = self.get(path, height, &query).await?;
        let (records, pagination) = records(response);

        let next_key = match pagination.and_then(|p| p.next_key) {
            None => None,
            Some(key) => Cursor::new(STANDARD.decode(key).map_err(|source| {
                QueryError::Cursor {
                    path: path.to_owned(),
                    source,
                }
            })?),
        };

        Ok(Page { records, next_key })
    }
}

#[async_trait]
impl ChainClient for LcdClient {
    async fn latest_block(&self) -> Result<BlockInfo> {
        let response: BlockResponse = self
            .get("/cosmos/base/tendermint/v1beta1/blocks/latest", None, &[])
            .await?;

        let Header { height, time } = response.block.header;
        let height = height.parse().map_err(|_| QueryError::Height(height))?;
        Ok(BlockInfo { height, time })
    }

    async fn balances(
        &self,
        address: &str,
        height: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<Coin>> {
        let path = format!("/cosmos/bank/v1beta1/balances/{address}");
        self.get_page(&path, height, page, |r: BalancesResponse| {
            (r.balances, r.pagination)
        })
        .await
    }

    async fn supply(&self, height: Option<i64>, page: PageRequest) -> Result<Page<Coin>> {
        self.get_page(
            "/cosmos/bank/v1beta1/supply",
            height,
            page,
            |r: SupplyResponse| (r.supply, r.pagination),
        )
        .await
    }

    async fn community_pool(&self, height: Option<i64>) -> Result<Vec<Coin>> {
        let response: CommunityPoolResponse = self
            .get("/cosmos/distribution/v1beta1/community_pool", height, &[])
            .await?;
        Ok(response.pool)
    }

    async fn staking_pool(&self, height: Option<i64>) -> Result<StakingPool> {
        let response: StakingPoolResponse = self
            .get("/cosmos/staking/v1beta1/pool", height, &[])
            .await?;
        Ok(response.pool)
    }

    async fn validators(&self, height: Option<i64>, page: PageRequest) -> Result<Page<Validator>> {
        self.get_page(
            "/cosmos/staking/v1beta1/validators",
            height,
            page,
            |r: ValidatorsResponse| (r.validators, r.pagination),
        )
        .await
    }

    async fn validator(&self, operator: &str, height: Option<i64>) -> Result<Validator> {
        let path = format!("/cosmos/staking/v1beta1/validators/{operator}");
        let response: ValidatorResponse = self.get(&path, height, &[]).await?;
        Ok(response.validator)
    }

    async fn validator_delegations(
        &self,
        validator: &str,
        height: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<DelegationResponse>> {
        let path = format!("/cosmos/staking/v1beta1/validators/{validator}/delegations");
        self.get_page(&path, height, page, |r: DelegationsResponse| {
            (r.delegation_responses, r.pagination)
        })
        .await
    }

    async fn delegator_delegations(
        &self,
        delegator: &str,
        height: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<DelegationResponse>> {
        let path = format!("/cosmos/staking/v1beta1/delegations/{delegator}");
        self.get_page(&path, height, page, |r: DelegationsResponse| {
            (r.delegation_responses, r.pagination)
        })
        .await
    }

    async fn validator_commission(
        &self,
        validator: &str,
        height: Option<i64>,
    ) -> Result<Vec<Coin>> {
        let path = format!("/cosmos/distribution/v1beta1/validators/{validator}/commission");
        let response: CommissionResponse = self.get(&path, height, &[]).await?;
        Ok(response.commission.commission)
    }

    async fn delegation_rewards(
        &self,
        delegator: &str,
        height: Option<i64>,
    ) -> Result<Vec<DelegatorReward>> {
        let path = format!("/cosmos/distribution/v1beta1/delegators/{delegator}/rewards");
        let response: RewardsResponse = self.get(&path, height, &[]).await?;
        Ok(response.rewards)
    }

    async fn validator_set(&self, height: i64, page: PageRequest) -> Result<Page<ValidatorPower>> {
        let path = format!("/cosmos/base/tendermint/v1beta1/validatorsets/{height}");
        self.get_page(&path, None, page, |r: ValidatorSetResponse| {
            (r.validators, r.pagination)
        })
        .await
    }

    async fn evidence(&self, height: Option<i64>, page: PageRequest) -> Result<Page<Evidence>> {
        self.get_page(
            "/cosmos/evidence/v1beta1/evidence",
            height,
            page,
            |r: EvidenceResponse| (r.evidence, r.pagination),
        )
        .await
    }

    async fn proposals(&self, height: Option<i64>, page: PageRequest) -> Result<Page<Proposal>> {
        self.get_page(
            "/cosmos/gov/v1beta1/proposals",
            height,
            page,
            |r: ProposalsResponse| (r.proposals, r.pagination),
        )
        .await
    }

    async fn tally(&self, proposal_id: u64, height: Option<i64>) -> Result<TallyResult> {
        let path = format!("/cosmos/gov/v1beta1/proposals/{proposal_id}/tally");
        let response: TallyResponse = self.get(&path, height, &[]).await?;
        Ok(response.tally)
    }

    async fn deposits(
        &self,
        proposal_id: u64,
        height: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<Deposit>> {
        let path = format!("/cosmos/gov/v1beta1/proposals/{proposal_id}/deposits");
        self.get_page(&path, height, page, |r: DepositsResponse| {
            (r.deposits, r.pagination)
        })
        .await
    }

    async fn votes(
        &self,
        proposal_id: u64,
        height: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<Vote>> {
        let path = format!("/cosmos/gov/v1beta1/proposals/{proposal_id}/votes");
        self.get_page(&path, height, page, |r: VotesResponse| (r.votes, r.pagination))
            .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn test_client(uri: String) -> LcdClient {
        LcdClient::new(LcdArgs {
            lcd_url: Url::parse(&uri).unwrap(),
            lcd_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn first_page() -> PageRequest {
        PageRequest {
            key: None,
            limit: 100,
        }
    }

    #[tokio::test]
    async fn pins_height_and_decodes_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cosmos/bank/v1beta1/balances/cosmos1abc"))
            .and(header(HEIGHT_HEADER, "42"))
            .and(query_param("pagination.limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "balances": [{ "denom": "uatom", "amount": "10" }],
                "pagination": { "next_key": STANDARD.encode("next"), "total": "0" }
            })))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let page = client
            .balances("cosmos1abc", Some(42), first_page())
            .await
            .unwrap();

        assert_eq!(
            page.records,
            vec![Coin {
                denom: "uatom".to_string(),
                amount: "10".to_string()
            }]
        );
        assert_eq!(page.next_key, Cursor::new("next"));
    }

    #[tokio::test]
    async fn forwards_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cosmos/bank/v1beta1/supply"))
            .and(query_param("pagination.key", STANDARD.encode("k2")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "supply": [],
                "pagination": { "next_key": null }
            })))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let page = client
            .supply(
                None,
                PageRequest {
                    key: Cursor::new("k2"),
                    limit: 100,
                },
            )
            .await
            .unwrap();

        assert!(page.records.is_empty());
        assert_eq!(page.next_key, None);
    }

    #[tokio::test]
    async fn empty_next_key_is_exhaustion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cosmos/staking/v1beta1/validators/valoper1/delegations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "delegation_responses": [{
                    "delegation": {
                        "delegator_address": "cosmos1d",
                        "validator_address": "valoper1",
                        "shares": "100.000000000000000000"
                    },
                    "balance": { "denom": "uatom", "amount": "100" }
                }],
                "pagination": { "next_key": "" }
            })))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let page = client
            .validator_delegations("valoper1", Some(7), first_page())
            .await
            .unwrap();

        assert_eq!(page.records.len(), 1);
        assert_eq!(page.next_key, None);
    }

    #[tokio::test]
    async fn not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let err = client.community_pool(None).await.unwrap_err();
        assert!(matches!(err, QueryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let err = client.staking_pool(Some(1)).await.unwrap_err();
        assert!(matches!(
            err,
            QueryError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn undecodable_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let err = client.validators(None, first_page()).await.unwrap_err();
        assert!(matches!(err, QueryError::Decode { .. }));
    }

    #[tokio::test]
    async fn malformed_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "proposals": [],
                "pagination": { "next_key": "%%%" }
            })))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let err = client.proposals(None, first_page()).await.unwrap_err();
        assert!(matches!(err, QueryError::Cursor { .. }));
    }

    #[tokio::test]
    async fn single_validator() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cosmos/staking/v1beta1/validators/cosmosvaloper1xyz"))
            .and(header(HEIGHT_HEADER, "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "validator": {
                    "operator_address": "cosmosvaloper1xyz",
                    "consensus_pubkey": {
                        "@type": "/cosmos.crypto.ed25519.PubKey",
                        "key": STANDARD.encode([1u8; 32]),
                    },
                    "jailed": false,
                    "status": "BOND_STATUS_BONDED",
                    "tokens": "100",
                    "delegator_shares": "100.000000000000000000",
                    "description": { "moniker": "edited" },
                    "commission": {
                        "commission_rates": {
                            "rate": "0.1",
                            "max_rate": "0.2",
                            "max_change_rate": "0.01",
                        },
                    },
                    "min_self_delegation": "1",
                }
            })))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let validator = client.validator("cosmosvaloper1xyz", Some(7)).await.unwrap();
        assert_eq!(validator.description.moniker, "edited");
        assert_eq!(validator.commission.commission_rates.rate, "0.1");
    }

    #[tokio::test]
    async fn latest_block() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cosmos/base/tendermint/v1beta1/blocks/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "block": { "header": { "height": "1234", "time": "2024-05-01T12:00:00.5Z" } }
            })))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let block = client.latest_block().await.unwrap();
        assert_eq!(block.height, 1234);
    }
}
