//! Resilient multi-node JSON-RPC client
//!
//! Two independent retry budgets:
//! - call retries: repeat the identical call against the same node
//!   (malformed replies, transient node-side errors)
//! - node retries: rotate to the next candidate and reconnect
//!   (timeouts, unreachable nodes, 500/502/503/504, node faults)
//!
//! Permanent errors propagate immediately. Exhausting the call budget on a
//! single-node pool raises [`RpcError::CallRetriesReached`]; exhausting the
//! node budget raises [`RpcError::NumRetriesReached`].

pub mod classify;
pub mod dialect;
pub mod transport;

pub use dialect::{normalize_api, CallParams, Dialect, Lookup};
pub use transport::{Connector, DefaultConnector, HttpTransport, Transport, WsTransport};

use crate::config::RpcConfig;
use crate::error::{ErrorClass, ObjectKind, RpcError};
use crate::metrics::MetricsState;
use crate::nodes::NodePool;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Retry budgets, timeout and backoff of an [`RpcClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Node rotations allowed per call (or per connect)
    pub num_retries: u32,
    /// Same-node repeats allowed per call
    pub num_retries_call: u32,
    /// Per-request timeout
    pub timeout: Duration,
    /// Sleep after the first consecutive failure
    pub backoff_initial: Duration,
    /// Added per further consecutive failure
    pub backoff_step: Duration,
    /// Upper bound on any single sleep
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RpcConfig::default())
    }
}

impl From<&RpcConfig> for RetryPolicy {
    fn from(config: &RpcConfig) -> Self {
        Self {
            num_retries: config.num_retries,
            num_retries_call: config.num_retries_call,
            timeout: Duration::from_millis(config.timeout_ms),
            backoff_initial: Duration::from_millis(config.backoff_initial_ms),
            backoff_step: Duration::from_millis(config.backoff_step_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
        }
    }
}

impl RetryPolicy {
    /// Sleep before the next attempt after `failures` consecutive failures
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let delay = self
            .backoff_initial
            .saturating_add(self.backoff_step.saturating_mul(failures - 1));
        delay.min(self.backoff_max)
    }

    /// Same budgets without any sleeping
    pub fn without_backoff(mut self) -> Self {
        self.backoff_initial = Duration::ZERO;
        self.backoff_step = Duration::ZERO;
        self.backoff_max = Duration::ZERO;
        self
    }
}

/// Connection state of an [`RpcClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    CallInFlight,
    /// Node budget spent; only an explicit reconnect leaves this state
    Exhausted,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::CallInFlight => write!(f, "CALL_IN_FLIGHT"),
            Self::Exhausted => write!(f, "EXHAUSTED"),
        }
    }
}

/// Signature of a remote method as reported by `jsonrpc.get_signature`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MethodSignature {
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub ret: Value,
}

/// What a [`RpcClient`] is asked to send
#[derive(Clone, Copy)]
enum Request<'a> {
    Raw {
        api: Option<&'a str>,
        method: &'a str,
        params: &'a CallParams,
    },
    /// Shaped by the dialect of whichever node serves the attempt
    Lookup {
        kind: ObjectKind,
        identifier: &'a str,
        extended: bool,
    },
}

/// JSON-RPC client over a pool of nodes
pub struct RpcClient {
    pool: NodePool,
    policy: RetryPolicy,
    connector: Arc<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    state: ConnectionState,
    dialect: Option<Dialect>,
    chain_properties: Option<Value>,
    next_id: u64,
    metrics: Option<Arc<MetricsState>>,
}

impl RpcClient {
    /// Create a disconnected client using HTTP/WebSocket transports
    pub fn new(pool: NodePool, policy: RetryPolicy) -> Self {
        Self::with_connector(pool, policy, Arc::new(DefaultConnector))
    }

    /// Create a disconnected client with a custom connector
    pub fn with_connector(pool: NodePool, policy: RetryPolicy, connector: Arc<dyn Connector>) -> Self {
        Self {
            pool,
            policy,
            connector,
            transport: None,
            state: ConnectionState::Disconnected,
            dialect: None,
            chain_properties: None,
            next_id: 1,
            metrics: None,
        }
    }

    /// Create a client and connect it right away
    pub async fn open(pool: NodePool, policy: RetryPolicy) -> Result<Self, RpcError> {
        let mut client = Self::new(pool, policy);
        client.connect().await?;
        Ok(client)
    }

    /// Report call outcomes, retries and latency into `metrics`
    pub fn set_metrics(&mut self, metrics: Arc<MetricsState>) {
        self.metrics = Some(metrics);
    }

    /// URL of the node in use
    pub fn url(&self) -> &str {
        self.pool.current()
    }

    pub fn nodes(&self) -> &NodePool {
        &self.pool
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Dialect of the current connection, once connected
    pub fn dialect(&self) -> Option<Dialect> {
        self.dialect
    }

    pub fn is_appbase(&self) -> bool {
        self.dialect == Some(Dialect::Appbase)
    }

    /// `get_config` result recorded while connecting
    pub fn chain_properties(&self) -> Option<&Value> {
        self.chain_properties.as_ref()
    }

    /// Connect to the current node, rotating on failure
    ///
    /// Also leaves the `Exhausted` state with a fresh budget.
    pub async fn connect(&mut self) -> Result<(), RpcError> {
        let mut failures = 0;
        self.connect_with_retries(&mut failures, false).await
    }

    /// Close the connection
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        self.dialect = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Switch to the next candidate node and connect to it
    pub async fn next_node(&mut self) -> Result<(), RpcError> {
        let mut failures = 0;
        self.connect_with_retries(&mut failures, true).await
    }

    /// Make the node in use the first candidate
    pub fn promote_current_node(&mut self) {
        self.pool.move_current_to_front();
    }

    /// Call `method` on `api` (default `database_api`)
    ///
    /// The envelope is shaped for the dialect of the current node.
    pub async fn call(
        &mut self,
        api: Option<&str>,
        method: &str,
        params: impl Into<CallParams>,
    ) -> Result<Value, RpcError> {
        let params = params.into();
        let (result, _) = self.dispatch(Request::Raw { api, method, params: &params }).await?;
        Ok(result)
    }

    /// Fetch one object of `kind`; `Ok(None)` when the node reports it absent
    pub async fn lookup(
        &mut self,
        kind: ObjectKind,
        identifier: &str,
    ) -> Result<Option<Map<String, Value>>, RpcError> {
        let request = Request::Lookup { kind, identifier, extended: false };
        let (result, dialect) = self.dispatch(request).await?;
        Ok(dialect.unwrap_lookup(kind, result))
    }

    /// Fetch the extra data of an object's full representation, if the dialect has any
    pub async fn lookup_extended(
        &mut self,
        kind: ObjectKind,
        identifier: &str,
    ) -> Result<Option<Value>, RpcError> {
        let request = Request::Lookup { kind, identifier, extended: true };
        let (result, dialect) = self.dispatch(request).await?;
        Ok(dialect.unwrap_extended(kind, result))
    }

    /// Chain properties of the connected node
    pub async fn get_config(&mut self) -> Result<Value, RpcError> {
        let properties = self.call(None, "get_config", CallParams::none()).await?;
        self.chain_properties = Some(properties.clone());
        Ok(properties)
    }

    /// Methods served by the node, optionally only those of `api`
    pub async fn get_methods(&mut self, api: Option<&str>) -> Result<Vec<String>, RpcError> {
        let result = self.call(Some("jsonrpc"), "get_methods", Map::new()).await?;
        let methods: Vec<String> = serde_json::from_value(result)
            .map_err(|e| RpcError::InvalidResponse(format!("get_methods: {e}")))?;
        Ok(match api {
            None => methods,
            Some(api) => {
                let prefix = format!("{}.", normalize_api(api));
                methods.into_iter().filter(|m| m.starts_with(&prefix)).collect()
            }
        })
    }

    /// Argument and return shapes of `method` (`api.method`)
    pub async fn get_signature(&mut self, method: &str) -> Result<MethodSignature, RpcError> {
        let mut params = Map::new();
        params.insert("method".to_string(), json!(method));
        let result = self.call(Some("jsonrpc"), "get_signature", params).await?;
        serde_json::from_value(result).map_err(|e| RpcError::InvalidResponse(format!("get_signature: {e}")))
    }

    /// Retry loop shared by all calls
    ///
    /// The request is shaped again for every attempt, so a failover to a node
    /// of the other dialect sends that dialect's method. Returns the result
    /// with the dialect it was requested in.
    async fn dispatch(&mut self, request: Request<'_>) -> Result<(Value, Dialect), RpcError> {
        let mut node_failures = 0;
        let mut call_failures = 0;

        match self.state {
            ConnectionState::Exhausted => return Err(RpcError::NumRetriesReached),
            _ if self.transport.is_none() => {
                self.connect_with_retries(&mut node_failures, false).await?;
            }
            _ => {}
        }

        loop {
            let dialect = self.dialect.unwrap_or(Dialect::Appbase);
            let shaped;
            let (api, method, params) = match request {
                Request::Raw { api, method, params } => (api, method, params),
                Request::Lookup { kind, identifier, extended } => {
                    shaped = if extended {
                        dialect.extended_lookup(kind, identifier)
                    } else {
                        dialect.lookup(kind, identifier)
                    };
                    match &shaped {
                        Some(lookup) => (lookup.api, lookup.method, &lookup.params),
                        // Nothing to ask a node of this dialect
                        None => return Ok((Value::Null, dialect)),
                    }
                }
            };

            let error = match self.attempt(dialect, api, method, params).await {
                Ok(result) => {
                    self.record_outcome("ok");
                    return Ok((result, dialect));
                }
                Err(e) => e,
            };

            match error.class() {
                ErrorClass::Permanent => {
                    self.record_outcome(error.as_str());
                    return Err(error);
                }
                ErrorClass::CallRetry if call_failures < self.policy.num_retries_call => {
                    call_failures += 1;
                    tracing::warn!(
                        node = %self.url(),
                        method = method,
                        attempt = call_failures,
                        error = %error,
                        "Retrying call on the same node"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.call_retries.inc();
                    }
                    tokio::time::sleep(self.policy.backoff(call_failures)).await;
                    continue;
                }
                ErrorClass::CallRetry if self.pool.len() <= 1 => {
                    tracing::error!(node = %self.url(), method = method, "Call retries reached");
                    self.record_outcome(RpcError::CallRetriesReached.as_str());
                    return Err(RpcError::CallRetriesReached);
                }
                ErrorClass::CallRetry | ErrorClass::NodeRetry => {}
            }

            node_failures += 1;
            if node_failures > self.policy.num_retries {
                return Err(self.exhaust(method));
            }
            tracing::warn!(
                node = %self.url(),
                method = method,
                attempt = node_failures,
                error = %error,
                "Switching to next node"
            );
            tokio::time::sleep(self.policy.backoff(node_failures)).await;
            call_failures = 0;
            self.connect_with_retries(&mut node_failures, true).await?;
        }
    }

    /// One request/reply exchange on the current connection
    async fn attempt(
        &mut self,
        dialect: Dialect,
        api: Option<&str>,
        method: &str,
        params: &CallParams,
    ) -> Result<Value, RpcError> {
        let id = self.take_id();
        let envelope = dialect.envelope(id, api, method, params);
        self.state = ConnectionState::CallInFlight;
        let started = Instant::now();
        let result = self.exchange(&envelope, id).await;
        self.state = ConnectionState::Connected;
        if let Some(metrics) = &self.metrics {
            metrics
                .rpc_latency
                .with_label_values(&[self.pool.current()])
                .observe(started.elapsed().as_secs_f64() * 1000.0);
        }
        result
    }

    async fn exchange(&mut self, envelope: &Value, id: u64) -> Result<Value, RpcError> {
        let url = self.pool.current().to_string();
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| RpcError::TransportUnreachable {
                url,
                reason: "not connected".to_string(),
            })?;
        let reply = transport.request(&envelope.to_string()).await?;
        classify::parse_reply(&reply, id)
    }

    /// Connection-level retry loop: open the current (or next) node and probe it
    async fn connect_with_retries(&mut self, failures: &mut u32, advance: bool) -> Result<(), RpcError> {
        let mut advance = advance;
        loop {
            if advance {
                self.pool.next();
                if let Some(metrics) = &self.metrics {
                    metrics.node_switches.inc();
                }
            }
            self.state = ConnectionState::Connecting;
            match self.open_current().await {
                Ok(dialect) => {
                    self.state = ConnectionState::Connected;
                    tracing::info!(node = %self.url(), dialect = %dialect, "Connected to node");
                    return Ok(());
                }
                Err(e) => {
                    *failures += 1;
                    tracing::warn!(
                        node = %self.url(),
                        attempt = *failures,
                        error = %e,
                        "Failed to connect to node"
                    );
                    if *failures > self.policy.num_retries {
                        return Err(self.exhaust("connect"));
                    }
                    tokio::time::sleep(self.policy.backoff(*failures)).await;
                    advance = true;
                }
            }
        }
    }

    /// Open a transport to the current node and detect its dialect
    async fn open_current(&mut self) -> Result<Dialect, RpcError> {
        if let Some(mut old) = self.transport.take() {
            old.close().await;
        }
        self.dialect = None;

        let url = self.pool.current().to_string();
        tracing::debug!(node = %url, "Trying to connect to node");
        self.transport = Some(self.connector.open(&url, self.policy.timeout).await?);

        let (properties, dialect) = match self.probe(Dialect::Appbase).await {
            Ok(properties) => {
                let dialect = Dialect::from_properties(&properties);
                (properties, dialect)
            }
            Err(e) if is_remote(&e) => {
                tracing::debug!(node = %url, error = %e, "Appbase probe rejected, trying legacy");
                // Only the positional API answered
                (self.probe(Dialect::Legacy).await?, Dialect::Legacy)
            }
            Err(e) => return Err(e),
        };

        self.chain_properties = Some(properties);
        self.dialect = Some(dialect);
        Ok(dialect)
    }

    async fn probe(&mut self, dialect: Dialect) -> Result<Value, RpcError> {
        let id = self.take_id();
        let envelope = dialect.envelope(id, None, "get_config", &CallParams::none());
        let properties = self.exchange(&envelope, id).await?;
        if !properties.is_object() {
            return Err(RpcError::InvalidResponse("get_config returned no properties".to_string()));
        }
        Ok(properties)
    }

    fn exhaust(&mut self, method: &str) -> RpcError {
        self.state = ConnectionState::Exhausted;
        tracing::error!(
            node = %self.url(),
            method = method,
            num_retries = self.policy.num_retries,
            "Number of retries reached"
        );
        self.record_outcome(RpcError::NumRetriesReached.as_str());
        RpcError::NumRetriesReached
    }

    fn record_outcome(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.rpc_calls.with_label_values(&[outcome]).inc();
        }
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("url", &self.url())
            .field("state", &self.state)
            .field("dialect", &self.dialect)
            .finish()
    }
}

/// Errors that carry a node's own answer rather than a transport failure
fn is_remote(error: &RpcError) -> bool {
    matches!(
        error,
        RpcError::NoMethodWithName(_)
            | RpcError::NoApiWithName(_)
            | RpcError::NodeFault(_)
            | RpcError::Unhandled { .. }
    )
}
