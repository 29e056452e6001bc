//! In-process mock nodes for client tests
//!
//! `MockNetwork` implements `Connector`; each URL maps to a `MockNode` that
//! answers either the appbase or the legacy wire shape from the same data.

#![allow(dead_code)]

use async_trait::async_trait;
use hive_client::rpc::{Connector, Transport};
use hive_client::{Dialect, RetryPolicy, RpcClient, RpcError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

pub const ZERO_CHAIN_ID: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Injected outcome for one request other than `get_config`
#[derive(Debug, Clone)]
pub enum Fault {
    /// Raw reply text returned as is
    Raw(String),
    /// Transport-level failure
    Error(RpcError),
}

#[derive(Debug)]
pub struct MockNode {
    pub dialect: Dialect,
    pub reachable: bool,
    pub accounts: HashMap<String, Value>,
    pub witnesses: HashMap<String, Value>,
    pub faults: VecDeque<Fault>,
    pub opens: usize,
    /// Method names of every request received, `get_config` included
    pub requests: Vec<String>,
}

impl MockNode {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            reachable: true,
            accounts: HashMap::new(),
            witnesses: HashMap::new(),
            faults: VecDeque::new(),
            opens: 0,
            requests: Vec::new(),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new(Dialect::Appbase)
        }
    }

    pub fn with_account(mut self, account: Value) -> Self {
        let name = account["name"].as_str().unwrap().to_string();
        self.accounts.insert(name, account);
        self
    }

    pub fn with_witness(mut self, witness: Value) -> Self {
        let owner = witness["owner"].as_str().unwrap().to_string();
        self.witnesses.insert(owner, witness);
        self
    }

    /// Number of received requests whose method contains `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.requests.iter().filter(|m| m.contains(needle)).count()
    }

    fn handle(&mut self, body: &str) -> Result<String, RpcError> {
        let request: Value = serde_json::from_str(body).unwrap();
        let id = request["id"].clone();
        let (method, params) = flatten_call(&request);
        self.requests.push(method.clone());

        if !method.ends_with("get_config") {
            if let Some(fault) = self.faults.pop_front() {
                return match fault {
                    Fault::Raw(text) => Ok(text),
                    Fault::Error(e) => Err(e),
                };
            }
        }

        let reply = match self.dialect {
            Dialect::Appbase => self.appbase(&method, &params),
            Dialect::Legacy => self.legacy(&method, &params),
        };
        let envelope = match reply {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err(message) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": message}
            }),
        };
        Ok(envelope.to_string())
    }

    fn appbase(&self, method: &str, params: &Value) -> Result<Value, String> {
        match method {
            "database_api.get_config" => Ok(json!({
                "HIVE_BLOCKCHAIN_VERSION": "1.27.0",
                "HIVE_CHAIN_ID": ZERO_CHAIN_ID,
            })),
            "database_api.find_accounts" => {
                let found = self.select(&self.accounts, &params["accounts"]);
                Ok(json!({ "accounts": found }))
            }
            "database_api.find_witnesses" => {
                let found = self.select(&self.witnesses, &params["owners"]);
                Ok(json!({ "witnesses": found }))
            }
            "rc_api.find_rc_accounts" => {
                let names = params["accounts"].as_array().cloned().unwrap_or_default();
                let found: Vec<Value> = names
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|n| self.accounts.contains_key(*n))
                    .map(|n| json!({"account": n, "max_rc": "1000000"}))
                    .collect();
                Ok(json!({ "rc_accounts": found }))
            }
            "jsonrpc.get_methods" => Ok(json!([
                "condenser_api.get_accounts",
                "database_api.find_accounts",
                "database_api.get_config",
                "rc_api.find_rc_accounts",
            ])),
            "jsonrpc.get_signature" => Ok(json!({"args": {"accounts": []}, "ret": {"accounts": []}})),
            other => Err(format!("Could not find method {other}")),
        }
    }

    fn legacy(&self, method: &str, params: &Value) -> Result<Value, String> {
        match method {
            "get_config" => Ok(json!({
                "STEEMIT_BLOCKCHAIN_VERSION": "0.19.2",
                "STEEMIT_CHAIN_ID": ZERO_CHAIN_ID,
            })),
            "get_accounts" => Ok(json!(self.select(&self.accounts, &params[0]))),
            "get_witness_by_account" => {
                let owner = params[0].as_str().unwrap_or_default();
                Ok(self.witnesses.get(owner).cloned().unwrap_or(Value::Null))
            }
            other => Err(format!("Could not find method {other}")),
        }
    }

    fn select(&self, table: &HashMap<String, Value>, names: &Value) -> Vec<Value> {
        names
            .as_array()
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|n| table.get(n).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Method name and argument value of a request in either envelope shape
fn flatten_call(request: &Value) -> (String, Value) {
    let method = request["method"].as_str().unwrap_or_default();
    if method == "call" {
        let api = request["params"][0].as_str().unwrap_or_default();
        let name = request["params"][1].as_str().unwrap_or_default();
        let args = request["params"][2].clone();
        let qualified = if api.is_empty() {
            name.to_string()
        } else {
            format!("{api}.{name}")
        };
        (qualified, args)
    } else {
        (method.to_string(), request["params"].clone())
    }
}

/// URL-indexed set of mock nodes
#[derive(Debug, Clone, Default)]
pub struct MockNetwork {
    nodes: Arc<Mutex<HashMap<String, Arc<Mutex<MockNode>>>>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, url: &str, node: MockNode) -> Arc<Mutex<MockNode>> {
        let node = Arc::new(Mutex::new(node));
        self.nodes.lock().insert(url.to_string(), Arc::clone(&node));
        node
    }

    pub fn node(&self, url: &str) -> Arc<Mutex<MockNode>> {
        Arc::clone(&self.nodes.lock()[url])
    }

    pub fn total_opens(&self) -> usize {
        self.nodes.lock().values().map(|n| n.lock().opens).sum()
    }

    /// Client over `urls` talking to this network, without backoff sleeps
    pub fn client(&self, urls: &[&str], num_retries: u32, num_retries_call: u32) -> RpcClient {
        let policy = RetryPolicy {
            num_retries,
            num_retries_call,
            timeout: Duration::from_secs(5),
            ..RetryPolicy::default()
        }
        .without_backoff();
        let pool = hive_client::NodePool::new(urls.iter().copied()).unwrap();
        RpcClient::with_connector(pool, policy, Arc::new(self.clone()))
    }
}

struct MockTransport {
    url: String,
    node: Arc<Mutex<MockNode>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&mut self, body: &str) -> Result<String, RpcError> {
        let mut node = self.node.lock();
        if !node.reachable {
            return Err(RpcError::TransportUnreachable {
                url: self.url.clone(),
                reason: "connection reset".to_string(),
            });
        }
        node.handle(body)
    }
}

#[async_trait]
impl Connector for MockNetwork {
    async fn open(&self, url: &str, _timeout: Duration) -> Result<Box<dyn Transport>, RpcError> {
        let node = self
            .nodes
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| RpcError::TransportUnreachable {
                url: url.to_string(),
                reason: "unknown host".to_string(),
            })?;
        {
            let mut guard = node.lock();
            guard.opens += 1;
            if !guard.reachable {
                return Err(RpcError::TransportUnreachable {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
        }
        Ok(Box::new(MockTransport {
            url: url.to_string(),
            node,
        }))
    }
}

pub fn account(name: &str) -> Value {
    json!({
        "name": name,
        "balance": "12.345 HIVE",
        "hbd_balance": "1.000 HBD",
        "reputation": "95832978796820",
        "created": "2016-06-30T17:22:21",
        "json_metadata": "",
    })
}

pub fn witness(owner: &str, signing_key: &str) -> Value {
    json!({
        "owner": owner,
        "votes": "123456789012345",
        "virtual_position": "0",
        "signing_key": signing_key,
        "url": "https://hive.blog",
        "created": "2016-06-30T17:22:21",
    })
}
