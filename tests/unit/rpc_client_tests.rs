//! RPC Client Unit Tests
//!
//! Tests the retry and failover state machine against in-process nodes:
//! - Node budget exhaustion after exactly N rotations
//! - Same-node call retries and escalation
//! - Permanent errors are never retried
//! - Legacy and appbase nodes give the same decoded objects

use crate::support::{account, Fault, MockNetwork, MockNode};
use hive_client::rpc::ConnectionState;
use hive_client::{CallParams, Dialect, ErrorClass, ObjectKind, RpcError};
use serde_json::{json, Map};

const A: &str = "https://a.example";
const B: &str = "https://b.example";

fn garbage() -> Fault {
    Fault::Raw("<html><body>maintenance</body></html>".to_string())
}

#[tokio::test]
async fn test_unreachable_nodes_exhaust_after_n_rotations() {
    let network = MockNetwork::new();
    network.add(A, MockNode::unreachable());
    network.add(B, MockNode::unreachable());
    let mut client = network.client(&[A, B], 3, 5);

    let err = client.call(None, "get_config", CallParams::none()).await.unwrap_err();

    assert_eq!(err, RpcError::NumRetriesReached);
    // One initial attempt plus three rotations
    assert_eq!(network.total_opens(), 4);
    assert_eq!(client.state(), ConnectionState::Exhausted);

    // Exhausted is terminal for further calls
    let err = client.call(None, "get_config", CallParams::none()).await.unwrap_err();
    assert_eq!(err, RpcError::NumRetriesReached);
    assert_eq!(network.total_opens(), 4);
}

#[tokio::test]
async fn test_zero_retries_tries_one_node() {
    let network = MockNetwork::new();
    network.add(A, MockNode::unreachable());
    network.add(B, MockNode::new(Dialect::Appbase));
    let mut client = network.client(&[A, B], 0, 5);

    assert_eq!(client.connect().await.unwrap_err(), RpcError::NumRetriesReached);
    assert_eq!(network.node(A).lock().opens, 1);
    assert_eq!(network.node(B).lock().opens, 0);
}

#[tokio::test]
async fn test_explicit_connect_leaves_exhausted_state() {
    let network = MockNetwork::new();
    let node = network.add(A, MockNode::unreachable());
    let mut client = network.client(&[A], 1, 5);

    assert!(client.connect().await.is_err());
    assert_eq!(client.state(), ConnectionState::Exhausted);

    node.lock().reachable = true;
    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.dialect(), Some(Dialect::Appbase));
}

#[tokio::test]
async fn test_failover_to_next_node() {
    let network = MockNetwork::new();
    network.add(A, MockNode::unreachable());
    network.add(B, MockNode::new(Dialect::Appbase).with_account(account("alice")));
    let mut client = network.client(&[A, B], 5, 5);

    let found = client.lookup(ObjectKind::Account, "alice").await.unwrap();

    assert!(found.is_some());
    assert_eq!(client.url(), B);
    assert_eq!(client.nodes().current_index(), 1);
}

#[tokio::test]
async fn test_call_retries_on_same_node() {
    let network = MockNetwork::new();
    let node = network.add(A, MockNode::new(Dialect::Appbase).with_account(account("alice")));
    node.lock().faults.extend([garbage(), garbage()]);
    let mut client = network.client(&[A], 5, 5);

    let found = client.lookup(ObjectKind::Account, "alice").await.unwrap();

    assert!(found.is_some());
    assert_eq!(node.lock().opens, 1);
    assert_eq!(node.lock().count("find_accounts"), 3);
}

#[tokio::test]
async fn test_call_retries_reached_on_single_node() {
    let network = MockNetwork::new();
    let node = network.add(A, MockNode::new(Dialect::Appbase).with_account(account("alice")));
    node.lock().faults.extend((0..10).map(|_| garbage()));
    let mut client = network.client(&[A], 5, 5);

    let err = client.lookup(ObjectKind::Account, "alice").await.unwrap_err();

    assert_eq!(err, RpcError::CallRetriesReached);
    // First attempt plus five repeats
    assert_eq!(node.lock().count("find_accounts"), 6);
    assert_eq!(node.lock().opens, 1);
}

#[tokio::test]
async fn test_call_retries_escalate_to_rotation() {
    let network = MockNetwork::new();
    let a = network.add(A, MockNode::new(Dialect::Appbase));
    a.lock().faults.extend((0..10).map(|_| garbage()));
    network.add(B, MockNode::new(Dialect::Appbase).with_account(account("alice")));
    let mut client = network.client(&[A, B], 5, 2);

    let found = client.lookup(ObjectKind::Account, "alice").await.unwrap();

    assert!(found.is_some());
    assert_eq!(client.url(), B);
    assert_eq!(a.lock().count("find_accounts"), 3);
}

#[tokio::test]
async fn test_server_busy_rotates() {
    let network = MockNetwork::new();
    let a = network.add(A, MockNode::new(Dialect::Appbase));
    a.lock()
        .faults
        .push_back(Fault::Error(RpcError::ServerBusy { status: 503 }));
    network.add(B, MockNode::new(Dialect::Appbase).with_account(account("alice")));
    let mut client = network.client(&[A, B], 5, 5);

    let found = client.lookup(ObjectKind::Account, "alice").await.unwrap();

    assert!(found.is_some());
    assert_eq!(client.url(), B);
}

#[tokio::test]
async fn test_permanent_errors_are_not_retried() {
    let network = MockNetwork::new();
    let a = network.add(A, MockNode::new(Dialect::Appbase));
    network.add(B, MockNode::new(Dialect::Appbase));
    let mut client = network.client(&[A, B], 5, 5);

    let err = client
        .call(Some("database_api"), "get_wrong_command", Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::NoMethodWithName(_)));
    assert_eq!(err.class(), ErrorClass::Permanent);
    assert_eq!(a.lock().count("get_wrong_command"), 1);

    a.lock()
        .faults
        .push_back(Fault::Error(RpcError::ServerPermanent { status: 501 }));
    let err = client.lookup(ObjectKind::Account, "alice").await.unwrap_err();
    assert_eq!(err, RpcError::ServerPermanent { status: 501 });
    assert_eq!(client.url(), A);
    assert_eq!(network.total_opens(), 1);
}

#[tokio::test]
async fn test_dialect_transparency() {
    let network = MockNetwork::new();
    network.add(A, MockNode::new(Dialect::Legacy).with_account(account("alice")));
    network.add(B, MockNode::new(Dialect::Appbase).with_account(account("alice")));
    let mut legacy = network.client(&[A], 0, 0);
    let mut appbase = network.client(&[B], 0, 0);

    let from_legacy = legacy.lookup(ObjectKind::Account, "alice").await.unwrap();
    let from_appbase = appbase.lookup(ObjectKind::Account, "alice").await.unwrap();

    assert_eq!(legacy.dialect(), Some(Dialect::Legacy));
    assert_eq!(appbase.dialect(), Some(Dialect::Appbase));
    assert!(!legacy.is_appbase());
    assert!(from_legacy.is_some());
    assert_eq!(from_legacy, from_appbase);
    assert!(legacy.chain_properties().unwrap().get("STEEMIT_BLOCKCHAIN_VERSION").is_some());
}

#[tokio::test]
async fn test_missing_object_is_not_an_error_at_rpc_level() {
    let network = MockNetwork::new();
    network.add(A, MockNode::new(Dialect::Legacy));
    network.add(B, MockNode::new(Dialect::Appbase));
    let mut legacy = network.client(&[A], 0, 0);
    let mut appbase = network.client(&[B], 0, 0);

    assert_eq!(legacy.lookup(ObjectKind::Witness, "nobody").await.unwrap(), None);
    assert_eq!(appbase.lookup(ObjectKind::Witness, "nobody").await.unwrap(), None);
}

#[tokio::test]
async fn test_get_methods_filters_by_api() {
    let network = MockNetwork::new();
    network.add(A, MockNode::new(Dialect::Appbase));
    let mut client = network.client(&[A], 0, 0);

    let all = client.get_methods(None).await.unwrap();
    assert_eq!(all.len(), 4);

    let database = client.get_methods(Some("database")).await.unwrap();
    assert_eq!(database, ["database_api.find_accounts", "database_api.get_config"]);

    let signature = client.get_signature("database_api.find_accounts").await.unwrap();
    assert_eq!(signature.args, json!({"accounts": []}));
}

#[tokio::test]
async fn test_close_and_reconnect() {
    let network = MockNetwork::new();
    network.add(A, MockNode::new(Dialect::Appbase));
    let mut client = network.client(&[A], 0, 0);

    client.connect().await.unwrap();
    client.close().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.dialect(), None);

    // A call on a closed client connects again
    client.get_config().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(network.total_opens(), 2);
}

#[tokio::test]
async fn test_lookup_failover_across_dialects() {
    let network = MockNetwork::new();
    let a = network.add(A, MockNode::new(Dialect::Appbase));
    a.lock()
        .faults
        .push_back(Fault::Error(RpcError::ServerBusy { status: 503 }));
    let b = network.add(B, MockNode::new(Dialect::Legacy).with_account(account("alice")));
    let mut client = network.client(&[A, B], 5, 5);

    let found = client.lookup(ObjectKind::Account, "alice").await.unwrap().unwrap();

    assert_eq!(found["name"], "alice");
    assert_eq!(client.dialect(), Some(Dialect::Legacy));
    assert_eq!(b.lock().count("get_accounts"), 1);
    assert_eq!(b.lock().count("find_accounts"), 0);

    // Nothing extra to fetch from a legacy node
    assert_eq!(client.lookup_extended(ObjectKind::Account, "alice").await.unwrap(), None);
}

#[tokio::test]
async fn test_promote_node_after_manual_switch() {
    let network = MockNetwork::new();
    network.add(A, MockNode::new(Dialect::Appbase));
    network.add(B, MockNode::new(Dialect::Appbase));
    let mut client = network.client(&[A, B], 0, 0);

    client.connect().await.unwrap();
    client.next_node().await.unwrap();
    assert_eq!(client.url(), B);

    client.promote_current_node();
    assert_eq!(client.nodes().current_index(), 0);
    assert_eq!(client.nodes().nodes(), [B, A]);
    assert_eq!(client.url(), B);
}
