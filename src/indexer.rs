//! Indexer client
//!
//! The indexer watches source chains and reports transfers that still need
//! a relay. Its answers are advisory; the decision engine re-checks every
//! field against the ledger before acting.

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use eyre::{eyre, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::types::{ProtocolVariant, RelayCandidate, TransferRecord};

/// Selects the candidate stream of one provider on one route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayQuery {
    pub from_chain: String,
    pub to_chain: String,
    pub provider: Address,
    pub token: Address,
    pub variant: ProtocolVariant,
}

/// Liveness notice for one provider on one route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub provider: Address,
    pub token: Address,
    pub variant: ProtocolVariant,
}

#[async_trait]
pub trait Indexer: Send + Sync {
    /// Oldest transfer still awaiting a relay, if any
    async fn needs_relay(&self, query: &RelayQuery) -> Result<Option<RelayCandidate>>;

    async fn heartbeat(&self, beat: &Heartbeat) -> Result<()>;
}

const FIRST_RECORD_QUERY: &str = r#"
query firstHistoryRecord($fromChain: String, $toChain: String, $bridge: String, $relayer: String, $token: String) {
  firstHistoryRecord(
    fromChain: $fromChain
    toChain: $toChain
    bridge: $bridge
    relayer: $relayer
    token: $token
    results: [0]
    notsubmited: true
    order: "messageNonce_asc"
  ) {
    id
    sendAmount
    recvAmount
    startTime
    messageNonce
    recipient
    requestTxHash
  }
}
"#;

const PREVIOUS_RECORD_QUERY: &str = r#"
query previousHistoryRecord($fromChain: String, $toChain: String, $bridge: String, $relayer: String, $token: String, $nonce: Int) {
  previousHistoryRecord(
    fromChain: $fromChain
    toChain: $toChain
    bridge: $bridge
    relayer: $relayer
    token: $token
    nonce: $nonce
  ) {
    id
  }
}
"#;

const HEARTBEAT_MUTATION: &str = r#"
mutation lnBridgeHeartBeat($fromChainId: String, $toChainId: String, $version: String, $relayer: String, $tokenAddress: String) {
  lnBridgeHeartBeat(
    fromChainId: $fromChainId
    toChainId: $toChainId
    version: $version
    relayer: $relayer
    tokenAddress: $tokenAddress
  )
}
"#;

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirstRecordData {
    first_history_record: Option<TransferRecord>,
}

#[derive(Debug, Deserialize)]
struct RecordId {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreviousRecordData {
    previous_history_record: Option<RecordId>,
}

/// GraphQL-over-HTTP indexer client
#[derive(Debug, Clone)]
pub struct IndexerClient {
    http: reqwest::Client,
    url: String,
}

impl IndexerClient {
    pub fn new(url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.to_string(),
        }
    }

    async fn request<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<Option<T>> {
        let response = self
            .http
            .post(&self.url)
            .json(&GraphqlRequest { query, variables })
            .send()
            .await
            .map_err(|e| eyre!("Indexer request failed: {}", e))?
            .error_for_status()
            .map_err(|e| eyre!("Indexer returned error status: {}", e))?
            .json::<GraphqlResponse<T>>()
            .await
            .map_err(|e| eyre!("Invalid indexer response: {}", e))?;

        if let Some(error) = response.errors.first() {
            return Err(eyre!("Indexer query error: {}", error.message));
        }
        Ok(response.data)
    }

    /// Id of the provider's transfer preceding `nonce`, zero when first
    async fn previous_transfer_id(&self, query: &RelayQuery, nonce: &str) -> Result<B256> {
        let nonce: i64 = nonce
            .parse()
            .map_err(|e| eyre!("Invalid messageNonce {}: {}", nonce, e))?;
        let data: Option<PreviousRecordData> = self
            .request(
                PREVIOUS_RECORD_QUERY,
                json!({
                    "fromChain": query.from_chain,
                    "toChain": query.to_chain,
                    "bridge": query.variant.indexer_name(),
                    "relayer": address_lower(query.provider),
                    "token": address_lower(query.token),
                    "nonce": nonce,
                }),
            )
            .await?;

        match data.and_then(|d| d.previous_history_record) {
            Some(previous) => {
                let last = previous.id.rsplit('-').next().unwrap_or_default();
                last.parse::<B256>()
                    .map_err(|e| eyre!("Invalid previous record id {}: {}", previous.id, e))
            }
            None => Ok(B256::ZERO),
        }
    }
}

#[async_trait]
impl Indexer for IndexerClient {
    async fn needs_relay(&self, query: &RelayQuery) -> Result<Option<RelayCandidate>> {
        let data: Option<FirstRecordData> = self
            .request(
                FIRST_RECORD_QUERY,
                json!({
                    "fromChain": query.from_chain,
                    "toChain": query.to_chain,
                    "bridge": query.variant.indexer_name(),
                    "relayer": address_lower(query.provider),
                    "token": address_lower(query.token),
                }),
            )
            .await?;

        let Some(record) = data.and_then(|d| d.first_history_record) else {
            return Ok(None);
        };
        debug!(id = %record.id, from = %query.from_chain, to = %query.to_chain, "Indexer returned candidate");

        let last_transfer_id = if query.variant.uses_previous_transfer_id() {
            self.previous_transfer_id(query, &record.message_nonce).await?
        } else {
            B256::ZERO
        };

        Ok(Some(RelayCandidate {
            record,
            last_transfer_id,
        }))
    }

    async fn heartbeat(&self, beat: &Heartbeat) -> Result<()> {
        let _: Option<Value> = self
            .request(
                HEARTBEAT_MUTATION,
                json!({
                    "fromChainId": beat.from_chain_id.to_string(),
                    "toChainId": beat.to_chain_id.to_string(),
                    "version": beat.variant.indexer_name(),
                    "relayer": address_lower(beat.provider),
                    "tokenAddress": address_lower(beat.token),
                }),
            )
            .await?;
        Ok(())
    }
}

/// Indexer keys addresses in lowercase hex
fn address_lower(address: Address) -> String {
    address.to_string().to_lowercase()
}
