//! Remote account data sources
//!
//! [`AccountSource`] is the seam between the sync loop and the blockchain
//! API; [`TonCenterClient`] implements it over the toncenter v2 HTTP API.

use crate::{Error, Result};
use async_trait::async_trait;
use num_bigint::BigUint;
use serde::Deserialize;
use std::time::Duration;
use tonhub_params::Network;
use tonhub_storage::{parse_balance, AccountAddress, AccountState, RawTransaction, TransactionId};
use tracing::debug;

/// Account state as reported by the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAccountState {
    /// Native balance in nanotons
    pub balance: BigUint,
    /// Contract state
    pub state: AccountState,
    /// Newest transaction, `None` for an account without history
    pub last_transaction: Option<TransactionId>,
    /// Server timestamp of the state (unix seconds)
    pub timestamp: u64,
}

/// Remote blockchain access used by the sync loop
#[async_trait]
pub trait AccountSource: Send + Sync {
    /// Fetch the current state of `address`
    async fn fetch_account_state(&self, address: &AccountAddress) -> Result<RemoteAccountState>;

    /// Fetch up to `limit` transactions, newest first, ending at and
    /// including `from`
    async fn fetch_transactions(
        &self,
        address: &AccountAddress,
        limit: usize,
        from: &TransactionId,
    ) -> Result<Vec<RawTransaction>>;
}

/// toncenter client configuration
#[derive(Debug, Clone)]
pub struct TonCenterConfig {
    /// API base URL, e.g. `https://toncenter.com/api/v2`
    pub endpoint: String,
    /// Optional API key sent as `X-API-Key`
    pub api_key: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl TonCenterConfig {
    /// Configuration for a known network
    pub fn for_network(network: &Network) -> Self {
        Self {
            endpoint: network.api_endpoint.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(20),
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

impl Default for TonCenterConfig {
    fn default() -> Self {
        Self::for_network(&Network::mainnet())
    }
}

/// toncenter v2 HTTP client
pub struct TonCenterClient {
    config: TonCenterConfig,
    client: reqwest::Client,
}

impl TonCenterClient {
    /// Create new client
    pub fn new(config: TonCenterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    /// Get current endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn call<R>(&self, method: &str, query: &[(&str, String)]) -> Result<R>
    where
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.config.endpoint.trim_end_matches('/'), method);
        let mut request = self.client.get(&url).query(query);
        if let Some(key) = &self.config.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("{method}: {e}")))?;
        let status = response.status();
        let body = response.text().await?;
        debug!("toncenter {} -> {} ({} bytes)", method, status, body.len());

        decode_envelope(&body).map_err(|e| match e {
            Error::Api(msg) if !status.is_success() => Error::Api(format!("HTTP {status}: {msg}")),
            other => other,
        })
    }
}

#[async_trait]
impl AccountSource for TonCenterClient {
    async fn fetch_account_state(&self, address: &AccountAddress) -> Result<RemoteAccountState> {
        let info: AddressInformation = self
            .call("getAddressInformation", &[("address", address.to_string())])
            .await?;
        info.into_remote()
    }

    async fn fetch_transactions(
        &self,
        address: &AccountAddress,
        limit: usize,
        from: &TransactionId,
    ) -> Result<Vec<RawTransaction>> {
        let txs: Vec<ApiTransaction> = self
            .call(
                "getTransactions",
                &[
                    ("address", address.to_string()),
                    ("limit", limit.to_string()),
                    ("lt", from.lt.to_string()),
                    ("hash", from.hash.clone()),
                    ("archival", "true".to_string()),
                ],
            )
            .await?;
        txs.into_iter().map(ApiTransaction::into_raw).collect()
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
    code: Option<i64>,
}

fn decode_envelope<R>(body: &str) -> Result<R>
where
    R: for<'de> Deserialize<'de>,
{
    let envelope: Envelope<R> = serde_json::from_str(body)
        .map_err(|e| Error::Api(format!("unexpected response: {e}")))?;
    match (envelope.ok, envelope.result) {
        (true, Some(result)) => Ok(result),
        (true, None) => Err(Error::Api("response without result".to_string())),
        (false, _) => Err(Error::Api(format!(
            "{} (code {})",
            envelope.error.unwrap_or_else(|| "unknown error".to_string()),
            envelope.code.map_or_else(|| "-".to_string(), |c| c.to_string())
        ))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

impl NumberOrString {
    fn as_decimal(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ApiTransactionId {
    lt: String,
    hash: String,
}

impl ApiTransactionId {
    fn into_id(self) -> Result<TransactionId> {
        let lt = self
            .lt
            .parse::<u64>()
            .map_err(|_| Error::Api(format!("invalid lt: {:?}", self.lt)))?;
        Ok(TransactionId::new(lt, self.hash))
    }
}

#[derive(Deserialize)]
struct AddressInformation {
    balance: NumberOrString,
    state: String,
    last_transaction_id: Option<ApiTransactionId>,
    sync_utime: u64,
}

impl AddressInformation {
    fn into_remote(self) -> Result<RemoteAccountState> {
        let raw_balance = self.balance.as_decimal();
        let balance = parse_balance(&raw_balance)
            .ok_or_else(|| Error::Api(format!("invalid balance: {raw_balance:?}")))?;
        let state = self
            .state
            .parse::<AccountState>()
            .map_err(|e| Error::Api(e.to_string()))?;
        // lt 0 is how the API reports "no transactions yet"
        let last_transaction = match self.last_transaction_id {
            Some(id) => Some(id.into_id()?).filter(|id| id.lt.0 != 0),
            None => None,
        };
        Ok(RemoteAccountState {
            balance,
            state,
            last_transaction,
            timestamp: self.sync_utime,
        })
    }
}

#[derive(Deserialize)]
struct ApiTransaction {
    transaction_id: ApiTransactionId,
    data: String,
}

impl ApiTransaction {
    fn into_raw(self) -> Result<RawTransaction> {
        Ok(RawTransaction {
            id: self.transaction_id.into_id()?,
            data: self.data,
        })
    }
}
