use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use address_indexer::gateway::{EtherscanClient, LedgerApi};
use address_indexer::indexer::AddressIndexer;
use address_indexer::models::common::{Network, NetworkFamily};
use address_indexer::models::errors::GatewayError;
use address_indexer::models::events::EventKind;
use address_indexer::storage::EventStore;
use address_indexer::utils::retry::RetryConfig;

const ADDRESS: &str = "0xabc0000000000000000000000000000000000001";

async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

fn client(server: &MockServer, max_attempts: u32) -> EtherscanClient {
    EtherscanClient::new("test-api-key", Duration::from_secs(5))
        .unwrap()
        .with_base_url(&format!("{}/api", server.uri()))
        .unwrap()
        .with_retry_config(RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
            exponential: 2.0,
        })
}

fn network() -> Network {
    Network::main(NetworkFamily::Ethereum)
}

#[tokio::test]
async fn test_fetch_page_success() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("module", "account"))
        .and(query_param("action", "tokentx"))
        .and(query_param("address", ADDRESS))
        .and(query_param("startblock", "101"))
        .and(query_param("page", "1"))
        .and(query_param("offset", "10000"))
        .and(query_param("sort", "asc"))
        .and(query_param("apikey", "test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "1",
            "message": "OK",
            "result": [
                {
                    "blockNumber": "101",
                    "hash": "0x01",
                    "from": "0x0000000000000000000000000000000000000002",
                    "to": ADDRESS,
                    "tokenName": "X",
                    "tokenDecimal": "2",
                    "value": "100"
                },
                {
                    "blockNumber": "105",
                    "hash": "0x02",
                    "from": ADDRESS,
                    "to": "0x0000000000000000000000000000000000000002",
                    "tokenName": "X",
                    "tokenDecimal": "2",
                    "value": "30"
                }
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let events = client(&mock_server, 1)
        .fetch_page(&network(), ADDRESS, EventKind::Erc20, 101, 1, 10_000)
        .await
        .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].get("hash"), Some("0x01"));
    assert_eq!(events[1].block_number(), Some(105));
    assert_eq!(events[1].get("value"), Some("30"));
}

#[tokio::test]
async fn test_no_transactions_found_is_empty() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "0",
            "message": "No transactions found",
            "result": []
        })))
        .mount(&mock_server)
        .await;

    let events = client(&mock_server, 1)
        .fetch_page(&network(), ADDRESS, EventKind::Normal, 1, 1, 10_000)
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_no_data_found_is_empty() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("action", "txlistinternal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "0",
            "message": "No data found",
            "result": []
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let events = client(&mock_server, 3)
        .fetch_page(&network(), ADDRESS, EventKind::Internal, 1, 1, 10_000)
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Max rate limit reached"
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "1",
            "message": "OK",
            "result": [{ "blockNumber": "7", "hash": "0x07" }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let events = client(&mock_server, 3)
        .fetch_page(&network(), ADDRESS, EventKind::Normal, 1, 1, 10_000)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].get("hash"), Some("0x07"));
}

#[tokio::test]
async fn test_rate_limit_gives_up_after_max_attempts() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Max calls per sec rate limit reached (5/sec)"
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    // Throttling is never mistaken for a missing mined-block listing
    let err = client(&mock_server, 2)
        .fetch_page(&network(), ADDRESS, EventKind::MinedBlock, 1, 1, 10_000)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::RateLimited(_)));
}

#[tokio::test]
async fn test_api_error_is_not_retried() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Invalid API Key"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server, 3)
        .fetch_page(&network(), ADDRESS, EventKind::Internal, 1, 1, 10_000)
        .await
        .unwrap_err();

    match err {
        GatewayError::Api { status, message } => {
            assert_eq!(status, "0");
            assert!(message.contains("Invalid API Key"));
        }
        other => panic!("expected an API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_mined_blocks_api_error_is_empty() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("action", "getminedblocks"))
        .and(query_param("blocktype", "blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Error! Invalid action"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let events = client(&mock_server, 1)
        .fetch_page(&network(), ADDRESS, EventKind::MinedBlock, 1, 1, 10_000)
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_http_error_is_retried_then_transport_error() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(
            ResponseTemplate::new(502)
                .set_body_string("<html><body><h1>502 Bad Gateway</h1></body></html>"),
        )
        .expect(2)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server, 2)
        .fetch_page(&network(), ADDRESS, EventKind::Normal, 1, 1, 10_000)
        .await
        .unwrap_err();

    assert!(err.is_transport());
    assert!(err.to_string().contains("502"));
}

#[tokio::test]
async fn test_non_json_body_is_decode_error() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server, 3)
        .fetch_page(&network(), ADDRESS, EventKind::Normal, 1, 1, 10_000)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Decode(_)));
}

#[tokio::test]
async fn test_fetch_balance() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("action", "balance"))
        .and(query_param("tag", "latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "1",
            "message": "OK",
            "result": "2500000000000000000"
        })))
        .mount(&mock_server)
        .await;

    let balance = client(&mock_server, 1)
        .fetch_balance(&network(), ADDRESS)
        .await
        .unwrap();
    assert_eq!(balance.to_string(), "2.500000000000000000");
}

#[tokio::test]
async fn test_mined_blocks_are_filtered_and_sorted() {
    let mock_server = setup_mock_server().await;

    // Newest first, as the listing is served
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("action", "getminedblocks"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "1",
            "message": "OK",
            "result": [
                { "blockNumber": "9", "timeStamp": "900", "blockReward": "2" },
                { "blockNumber": "8", "timeStamp": "800", "blockReward": "2" }
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("action", "getminedblocks"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "1",
            "message": "OK",
            "result": [{ "blockNumber": "5", "timeStamp": "500", "blockReward": "2" }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(&mock_server, 1);
    let blocks = client
        .fetch_page(&network(), ADDRESS, EventKind::MinedBlock, 6, 1, 2)
        .await
        .unwrap();
    let numbers: Vec<Option<u64>> = blocks.iter().map(|b| b.block_number()).collect();
    assert_eq!(numbers, vec![Some(8), Some(9)]);

    // The whole listing came back on the first page
    let rest = client
        .fetch_page(&network(), ADDRESS, EventKind::MinedBlock, 6, 2, 2)
        .await
        .unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_mined_blocks_resync_is_idempotent() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("action", "getminedblocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "1",
            "message": "OK",
            "result": [{ "blockNumber": "5", "timeStamp": "500", "blockReward": "2" }]
        })))
        .mount(&mock_server)
        .await;

    let store = EventStore::in_memory().await.unwrap();
    let indexer = AddressIndexer::new(network(), ADDRESS, client(&mock_server, 1), store).unwrap();

    let first = indexer.sync(EventKind::MinedBlock).await.unwrap();
    assert_eq!(first.stored, 1);

    let second = indexer.sync(EventKind::MinedBlock).await.unwrap();
    assert_eq!(second.start_block, 6);
    assert_eq!(second.stored, 0);
    assert_eq!(
        indexer
            .get_cached_events(EventKind::MinedBlock)
            .await
            .unwrap()
            .len(),
        1
    );
}
