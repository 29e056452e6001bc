//! WebSocket Transport Integration Tests
//!
//! Runs the real tokio-tungstenite transport against a local server that
//! answers, hangs up, or stays silent.

use futures_util::{SinkExt, StreamExt};
use hive_client::rpc::{Transport, WsTransport};
use hive_client::{NodePool, ObjectKind, RetryPolicy, RpcClient, RpcError};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Debug, Clone, Copy)]
enum Behavior {
    /// Answer every request like an appbase node
    Answer,
    /// Close the socket on the first request
    HangUp,
    /// Read requests and never reply
    Silent,
}

/// Serve one WebSocket connection on a random port, returning its URL
async fn serve(behavior: Behavior) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else { return };
        let Ok(ws_stream) = accept_async(stream).await else { return };
        let (mut write, mut read) = ws_stream.split();

        while let Some(Ok(message)) = read.next().await {
            let Message::Text(text) = message else { continue };
            match behavior {
                Behavior::Answer => {
                    let reply = answer(text.as_str());
                    if write.send(Message::Text(reply.into())).await.is_err() {
                        return;
                    }
                }
                Behavior::HangUp => {
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
                Behavior::Silent => {}
            }
        }
    });

    format!("ws://{addr}")
}

fn answer(request: &str) -> String {
    let request: Value = serde_json::from_str(request).unwrap();
    let result = match request["method"].as_str().unwrap_or_default() {
        "database_api.get_config" => json!({"HIVE_BLOCKCHAIN_VERSION": "1.27.0"}),
        "database_api.find_accounts" => json!({"accounts": [{"name": "gtg", "post_count": 4100}]}),
        other => json!({"echo": other}),
    };
    json!({"jsonrpc": "2.0", "id": request["id"], "result": result}).to_string()
}

#[tokio::test]
async fn test_ws_round_trip() {
    let url = serve(Behavior::Answer).await;
    let mut transport = WsTransport::connect(&url, Duration::from_secs(5)).await.unwrap();

    let reply = transport
        .request(r#"{"jsonrpc":"2.0","id":3,"method":"condenser_api.get_version"}"#)
        .await
        .unwrap();
    let reply: Value = serde_json::from_str(&reply).unwrap();

    assert_eq!(reply["id"], 3);
    assert_eq!(reply["result"]["echo"], "condenser_api.get_version");
    transport.close().await;
}

#[tokio::test]
async fn test_ws_closed_socket_is_unreachable() {
    let url = serve(Behavior::HangUp).await;
    let mut transport = WsTransport::connect(&url, Duration::from_secs(5)).await.unwrap();

    let err = transport.request(r#"{"jsonrpc":"2.0","id":1}"#).await.unwrap_err();

    assert!(matches!(err, RpcError::TransportUnreachable { .. }));
}

#[tokio::test]
async fn test_ws_silent_node_times_out() {
    let url = serve(Behavior::Silent).await;
    let mut transport = WsTransport::connect(&url, Duration::from_millis(200)).await.unwrap();

    let err = transport.request(r#"{"jsonrpc":"2.0","id":1}"#).await.unwrap_err();

    assert!(matches!(err, RpcError::TransportTimeout { .. }));
}

#[tokio::test]
async fn test_ws_refused_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = WsTransport::connect(&format!("ws://{addr}"), Duration::from_secs(5))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, RpcError::TransportUnreachable { .. }));
}

#[tokio::test]
async fn test_client_over_ws_node() {
    let url = serve(Behavior::Answer).await;
    let pool = NodePool::new([url.as_str()]).unwrap();
    let policy = RetryPolicy {
        num_retries: 0,
        num_retries_call: 0,
        timeout: Duration::from_secs(5),
        ..RetryPolicy::default()
    }
    .without_backoff();
    let mut client = RpcClient::new(pool, policy);

    let gtg = client.lookup(ObjectKind::Account, "gtg").await.unwrap().unwrap();

    assert_eq!(gtg["post_count"], 4100);
    assert!(client.is_appbase());
}
