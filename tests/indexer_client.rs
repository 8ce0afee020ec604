//! GraphQL indexer client against a mock HTTP server

use alloy::primitives::{Address, TxHash, B256};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lnbridge_relayer::indexer::{Heartbeat, Indexer, IndexerClient, RelayQuery};
use lnbridge_relayer::types::ProtocolVariant;

const PROVIDER: &str = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01";

fn query(variant: ProtocolVariant) -> RelayQuery {
    RelayQuery {
        from_chain: "ethereum".to_string(),
        to_chain: "arbitrum".to_string(),
        provider: PROVIDER.parse().unwrap(),
        token: Address::ZERO,
        variant,
    }
}

fn record(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "sendAmount": "1000",
        "recvAmount": "990",
        "startTime": "1700000000",
        "messageNonce": "12",
        "recipient": "0x1111111111111111111111111111111111111111",
        "requestTxHash": "0x2222222222222222222222222222222222222222222222222222222222222222"
    })
}

#[tokio::test]
async fn test_lnv3_candidate() {
    let server = MockServer::start().await;
    let id = format!("lnv3-1-42161-{}", B256::repeat_byte(0x33));

    Mock::given(method("POST"))
        .and(body_string_contains("firstHistoryRecord"))
        .and(body_partial_json(json!({
            "variables": {
                "fromChain": "ethereum",
                "toChain": "arbitrum",
                "bridge": "lnv3",
                "relayer": PROVIDER.to_lowercase(),
                "token": "0x0000000000000000000000000000000000000000"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"firstHistoryRecord": record(&id)}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = IndexerClient::new(&server.uri());
    let candidate = client
        .needs_relay(&query(ProtocolVariant::Lnv3))
        .await
        .unwrap()
        .expect("candidate");

    assert_eq!(candidate.record.id, id);
    assert_eq!(candidate.record.request_tx_hash, TxHash::repeat_byte(0x22));
    assert_eq!(candidate.last_transfer_id, B256::ZERO);
}

#[tokio::test]
async fn test_lnv2_candidate_links_previous_transfer() {
    let server = MockServer::start().await;
    let previous = B256::repeat_byte(0x44);

    Mock::given(method("POST"))
        .and(body_string_contains("firstHistoryRecord"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"firstHistoryRecord": record("lnv2-opposite-1-42161-0x01")}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_string_contains("previousHistoryRecord"))
        .and(body_partial_json(json!({
            "variables": {"bridge": "lnv2-opposite", "nonce": 12}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"previousHistoryRecord": {"id": format!("lnv2-opposite-1-42161-{}", previous)}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = IndexerClient::new(&server.uri());
    let candidate = client
        .needs_relay(&query(ProtocolVariant::Opposite))
        .await
        .unwrap()
        .expect("candidate");
    assert_eq!(candidate.last_transfer_id, previous);
}

#[tokio::test]
async fn test_first_lnv2_transfer_has_zero_previous() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("firstHistoryRecord"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"firstHistoryRecord": record("lnv2-default-1-42161-0x01")}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_string_contains("previousHistoryRecord"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"previousHistoryRecord": null}
        })))
        .mount(&server)
        .await;

    let client = IndexerClient::new(&server.uri());
    let candidate = client
        .needs_relay(&query(ProtocolVariant::Default))
        .await
        .unwrap()
        .expect("candidate");
    assert_eq!(candidate.last_transfer_id, B256::ZERO);
}

#[tokio::test]
async fn test_no_candidate() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"firstHistoryRecord": null}
        })))
        .mount(&server)
        .await;

    let client = IndexerClient::new(&server.uri());
    assert!(client
        .needs_relay(&query(ProtocolVariant::Lnv3))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_graphql_error_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{"message": "unknown field"}]
        })))
        .mount(&server)
        .await;

    let client = IndexerClient::new(&server.uri());
    let err = client
        .needs_relay(&query(ProtocolVariant::Lnv3))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown field"));
}

#[tokio::test]
async fn test_http_error_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = IndexerClient::new(&server.uri());
    assert!(client.needs_relay(&query(ProtocolVariant::Lnv3)).await.is_err());
}

#[tokio::test]
async fn test_heartbeat_uses_chain_ids() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("lnBridgeHeartBeat"))
        .and(body_partial_json(json!({
            "variables": {
                "fromChainId": "1",
                "toChainId": "42161",
                "version": "lnv2-opposite",
                "relayer": PROVIDER.to_lowercase()
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"lnBridgeHeartBeat": null}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = IndexerClient::new(&server.uri());
    client
        .heartbeat(&Heartbeat {
            from_chain_id: 1,
            to_chain_id: 42161,
            provider: PROVIDER.parse().unwrap(),
            token: Address::ZERO,
            variant: ProtocolVariant::Opposite,
        })
        .await
        .unwrap();
}
