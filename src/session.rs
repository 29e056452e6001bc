//! Session context: one RPC client, one object cache
//!
//! A [`Hive`] owns the RPC client behind an async mutex, so calls made through
//! one session are strictly sequential. Object loads go cache-first; a miss
//! takes the RPC lock and looks at the cache again before fetching, so loads
//! of the same object that queued behind each other cost one round trip.

use crate::cache::ObjectCache;
use crate::chains::{self, ChainParams};
use crate::config::{AppConfig, CacheConfig};
use crate::error::{AppError, AppResult, ObjectKind};
use crate::metrics::MetricsState;
use crate::objects::{Account, Asset, Witness};
use crate::rpc::{RetryPolicy, RpcClient};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Snapshot of a remote object
pub type ObjectData = Map<String, Value>;

/// Cache identity of an object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub kind: ObjectKind,
    pub identifier: String,
    /// Full and plain representations are cached separately
    pub full: bool,
}

impl ObjectKey {
    pub fn new(kind: ObjectKind, identifier: impl Into<String>, full: bool) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            full,
        }
    }
}

/// Fields delivered as decimal strings that hold integers
const INT_FIELDS: &[(ObjectKind, &[&str])] = &[
    (
        ObjectKind::Account,
        &[
            "hbd_seconds",
            "savings_hbd_seconds",
            "sbd_seconds",
            "savings_sbd_seconds",
            "average_bandwidth",
            "lifetime_bandwidth",
            "lifetime_market_bandwidth",
            "reputation",
            "withdrawn",
            "to_withdraw",
        ],
    ),
    (
        ObjectKind::Witness,
        &[
            "votes",
            "virtual_last_update",
            "virtual_position",
            "virtual_scheduled_time",
        ],
    ),
];

/// Connection to a Hive network
pub struct Hive {
    rpc: Mutex<RpcClient>,
    cache: ObjectCache<ObjectKey, Arc<ObjectData>>,
    metrics: Arc<MetricsState>,
}

impl Hive {
    /// Build a session from configuration and connect to the first reachable node
    pub async fn connect(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;
        let pool = config.node_pool()?;
        let mut client = RpcClient::new(pool, RetryPolicy::from(&config.rpc));
        client.connect().await?;
        Ok(Self::with_client(client, &config.cache))
    }

    /// Build a session around an existing client
    pub fn with_client(mut client: RpcClient, cache: &CacheConfig) -> Self {
        let metrics = Arc::new(MetricsState::new());
        client.set_metrics(Arc::clone(&metrics));
        Self {
            rpc: Mutex::new(client),
            cache: ObjectCache::new(cache.default_expiration(), cache.auto_clean),
            metrics,
        }
    }

    /// Exclusive access to the RPC client for raw calls
    pub async fn rpc(&self) -> MutexGuard<'_, RpcClient> {
        self.rpc.lock().await
    }

    pub fn cache(&self) -> &ObjectCache<ObjectKey, Arc<ObjectData>> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<MetricsState> {
        &self.metrics
    }

    /// Swap the RPC client; cached objects from the old node are dropped
    pub async fn set_client(&self, mut client: RpcClient) {
        client.set_metrics(Arc::clone(&self.metrics));
        let mut rpc = self.rpc.lock().await;
        rpc.close().await;
        *rpc = client;
        self.cache.clear();
        tracing::info!(node = %rpc.url(), "RPC client replaced");
    }

    /// Drop every cached object of every kind
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Chain the connected node belongs to
    pub async fn chain(&self) -> &'static ChainParams {
        let rpc = self.rpc.lock().await;
        chains::detect(rpc.chain_properties(), rpc.dialect())
    }

    pub async fn account(self: &Arc<Self>, name: &str) -> AppResult<Account> {
        Account::new(Arc::clone(self), name).await
    }

    pub async fn witness(self: &Arc<Self>, owner: &str) -> AppResult<Witness> {
        Witness::new(Arc::clone(self), owner).await
    }

    pub async fn asset(self: &Arc<Self>, symbol: &str) -> AppResult<Asset> {
        Asset::new(Arc::clone(self), symbol).await
    }

    /// Object from the cache, fetched on a miss
    pub async fn load_object(
        &self,
        kind: ObjectKind,
        identifier: &str,
        full: bool,
    ) -> AppResult<Arc<ObjectData>> {
        let key = ObjectKey::new(kind, identifier, full);
        if let Some(data) = self.cached(&key) {
            return Ok(data);
        }

        let mut rpc = self.rpc.lock().await;
        // A load queued ahead of us may have filled the entry
        if let Some(data) = self.cache.get(&key) {
            tracing::trace!(kind = %kind, identifier = identifier, "Cache filled while waiting");
            return Ok(data);
        }
        self.metrics.cache_misses.inc();
        tracing::trace!(kind = %kind, identifier = identifier, "Cache miss");
        let data = Arc::new(Self::fetch_with(&mut rpc, kind, identifier, full).await?);
        self.cache.set(key, Arc::clone(&data));
        Ok(data)
    }

    /// Object fetched from the node, replacing any cached copy
    pub async fn fetch_object(
        &self,
        kind: ObjectKind,
        identifier: &str,
        full: bool,
    ) -> AppResult<Arc<ObjectData>> {
        let mut rpc = self.rpc.lock().await;
        tracing::debug!(kind = %kind, identifier = identifier, node = %rpc.url(), "Refreshing object");
        let data = Arc::new(Self::fetch_with(&mut rpc, kind, identifier, full).await?);
        self.cache
            .set(ObjectKey::new(kind, identifier, full), Arc::clone(&data));
        Ok(data)
    }

    fn cached(&self, key: &ObjectKey) -> Option<Arc<ObjectData>> {
        let hit = self.cache.get(key);
        if hit.is_some() {
            self.metrics.cache_hits.inc();
            tracing::trace!(kind = %key.kind, identifier = %key.identifier, "Cache hit");
        }
        hit
    }

    async fn fetch_with(
        rpc: &mut RpcClient,
        kind: ObjectKind,
        identifier: &str,
        full: bool,
    ) -> AppResult<ObjectData> {
        if kind == ObjectKind::Asset {
            return Self::resolve_asset(rpc, identifier).await;
        }

        let mut data = rpc
            .lookup(kind, identifier)
            .await?
            .ok_or_else(|| AppError::does_not_exist(kind, identifier))?;

        if full {
            if let Some(Value::Object(extra)) = rpc.lookup_extended(kind, identifier).await? {
                for (field, value) in extra {
                    data.entry(field).or_insert(value);
                }
            }
        }

        postprocess(kind, &mut data);
        Ok(data)
    }

    async fn resolve_asset(rpc: &mut RpcClient, identifier: &str) -> AppResult<ObjectData> {
        if rpc.chain_properties().is_none() {
            rpc.get_config().await?;
        }
        let chain = chains::detect(rpc.chain_properties(), rpc.dialect());
        let asset = chain
            .find_asset(identifier)
            .ok_or_else(|| AppError::does_not_exist(ObjectKind::Asset, identifier))?;

        let mut data = ObjectData::new();
        data.insert("asset".to_string(), json!(asset.asset));
        data.insert("symbol".to_string(), json!(asset.symbol));
        data.insert("precision".to_string(), json!(asset.precision));
        data.insert("id".to_string(), json!(asset.id));
        Ok(data)
    }
}

impl std::fmt::Debug for Hive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hive").field("cache", &self.cache).finish()
    }
}

/// Coerce string-encoded integers of known fields to numbers
fn postprocess(kind: ObjectKind, data: &mut ObjectData) {
    let Some((_, fields)) = INT_FIELDS.iter().find(|(k, _)| *k == kind) else {
        return;
    };
    for field in *fields {
        let parsed = match data.get(*field) {
            Some(Value::String(s)) => s.parse::<i64>().ok(),
            _ => None,
        };
        if let Some(n) = parsed {
            data.insert(field.to_string(), json!(n));
        }
    }
}
