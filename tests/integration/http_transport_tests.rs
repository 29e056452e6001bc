//! HTTP Transport Integration Tests
//!
//! Runs the real reqwest transport and the RPC client against mockito servers.

use hive_client::rpc::{HttpTransport, Transport};
use hive_client::{ErrorClass, NodePool, ObjectKind, RetryPolicy, RpcClient, RpcError};
use mockito::{Matcher, Server};
use serde_json::json;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn method(name: &str) -> Matcher {
    Matcher::Regex(format!(r#""method":"{name}""#))
}

fn policy(num_retries: u32, num_retries_call: u32) -> RetryPolicy {
    RetryPolicy {
        num_retries,
        num_retries_call,
        timeout: TIMEOUT,
        ..RetryPolicy::default()
    }
    .without_backoff()
}

#[tokio::test]
async fn test_http_transport_returns_reply_text() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_header("content-type", "application/json")
        .with_status(200)
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":true}"#)
        .create_async()
        .await;

    let mut transport = HttpTransport::new(&server.url(), TIMEOUT).unwrap();
    let reply = transport.request(r#"{"jsonrpc":"2.0","id":1}"#).await.unwrap();

    assert_eq!(reply, r#"{"jsonrpc":"2.0","id":1,"result":true}"#);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_http_status_classification() {
    let mut server = Server::new_async().await;
    let mut transport = HttpTransport::new(&server.url(), TIMEOUT).unwrap();

    let busy = server.mock("POST", "/").with_status(503).create_async().await;
    let err = transport.request("{}").await.unwrap_err();
    assert_eq!(err, RpcError::ServerBusy { status: 503 });
    assert_eq!(err.class(), ErrorClass::NodeRetry);
    busy.remove_async().await;

    let permanent = server.mock("POST", "/").with_status(501).create_async().await;
    let err = transport.request("{}").await.unwrap_err();
    assert_eq!(err, RpcError::ServerPermanent { status: 501 });
    assert_eq!(err.class(), ErrorClass::Permanent);
    permanent.remove_async().await;

    // JSON-RPC errors behind a client error status still reach the parser
    let json_error = server
        .mock("POST", "/")
        .with_status(400)
        .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Invalid parameters"}}"#)
        .create_async()
        .await;
    assert!(transport.request("{}").await.unwrap().contains("Invalid parameters"));
    json_error.remove_async().await;

    server
        .mock("POST", "/")
        .with_status(404)
        .with_body("<html>not found</html>")
        .create_async()
        .await;
    let err = transport.request("{}").await.unwrap_err();
    assert!(matches!(err, RpcError::TransportUnreachable { .. }));
}

#[tokio::test]
async fn test_client_over_http_appbase_node() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/")
        .match_body(method("database_api.get_config"))
        .with_status(200)
        .with_body(json!({"jsonrpc": "2.0", "result": {"HIVE_BLOCKCHAIN_VERSION": "1.27.0"}}).to_string())
        .create_async()
        .await;
    let lookup = server
        .mock("POST", "/")
        .match_body(Matcher::AllOf(vec![
            method("database_api.find_accounts"),
            Matcher::Regex(r#""accounts":\["gtg"\]"#.to_string()),
        ]))
        .with_status(200)
        .with_body(
            json!({"jsonrpc": "2.0", "result": {"accounts": [{"name": "gtg", "post_count": 4100}]}})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let pool = NodePool::new([server.url()]).unwrap();
    let mut client = RpcClient::with_connector(
        pool,
        policy(0, 0),
        std::sync::Arc::new(hive_client::rpc::DefaultConnector),
    );

    let gtg = client.lookup(ObjectKind::Account, "gtg").await.unwrap().unwrap();

    assert_eq!(gtg["post_count"], 4100);
    assert!(client.is_appbase());
    lookup.assert_async().await;
}

#[tokio::test]
async fn test_client_retries_garbage_on_same_node() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/")
        .match_body(method("database_api.get_config"))
        .with_status(200)
        .with_body(json!({"jsonrpc": "2.0", "result": {"HIVE_BLOCKCHAIN_VERSION": "1.27.0"}}).to_string())
        .create_async()
        .await;
    let garbage = server
        .mock("POST", "/")
        .match_body(method("database_api.find_accounts"))
        .with_status(200)
        .with_body("<html><body>upgrading</body></html>")
        .expect(3)
        .create_async()
        .await;

    let pool = NodePool::new([server.url()]).unwrap();
    let mut client = RpcClient::new(pool, policy(0, 2));

    let err = client.lookup(ObjectKind::Account, "gtg").await.unwrap_err();

    assert_eq!(err, RpcError::CallRetriesReached);
    garbage.assert_async().await;
}

#[tokio::test]
async fn test_client_over_http_refused_connection() {
    let pool = NodePool::new(["http://127.0.0.1:9"]).unwrap();
    let mut client = RpcClient::new(pool, policy(1, 0));

    let err = client.connect().await.unwrap_err();

    assert_eq!(err, RpcError::NumRetriesReached);
    assert!(err.is_exhaustion());
}
