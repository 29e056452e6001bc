//! Read views of chain objects
//!
//! A [`BlockchainObject`] is a snapshot of one remote object plus the session
//! it came from. Field access reads the snapshot and never re-fetches;
//! [`BlockchainObject::refresh`] always goes to the node.

use crate::error::{AppResult, ObjectKind};
use crate::session::{Hive, ObjectData};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Wire format of chain timestamps
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Signing key of a witness that stopped producing
const NULL_SIGNING_KEY_SUFFIX: &str = "1111111111111111111111111111111114T1Anm";

/// Identity-keyed snapshot of a remote object
#[derive(Clone)]
pub struct BlockchainObject {
    hive: Arc<Hive>,
    kind: ObjectKind,
    identifier: String,
    full: bool,
    data: Option<Arc<ObjectData>>,
}

impl BlockchainObject {
    /// Load through the session cache, fetching on a miss
    pub async fn load(hive: Arc<Hive>, kind: ObjectKind, identifier: &str, full: bool) -> AppResult<Self> {
        let mut object = Self::lazy(hive, kind, identifier, full);
        object.ensure_loaded().await?;
        Ok(object)
    }

    /// Create without any network call; the first [`field`](Self::field) loads it
    pub fn lazy(hive: Arc<Hive>, kind: ObjectKind, identifier: &str, full: bool) -> Self {
        Self {
            hive,
            kind,
            identifier: identifier.to_string(),
            full,
            data: None,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    pub fn hive(&self) -> &Arc<Hive> {
        &self.hive
    }

    /// Re-fetch from the node and replace the cached copy
    ///
    /// On failure the previous snapshot is kept and the error surfaces.
    pub async fn refresh(&mut self) -> AppResult<()> {
        let data = self
            .hive
            .fetch_object(self.kind, &self.identifier, self.full)
            .await?;
        self.data = Some(data);
        Ok(())
    }

    /// Load the snapshot if this object was created lazily
    pub async fn ensure_loaded(&mut self) -> AppResult<()> {
        if self.data.is_none() {
            let data = self
                .hive
                .load_object(self.kind, &self.identifier, self.full)
                .await?;
            self.data = Some(data);
        }
        Ok(())
    }

    /// Field value, loading a lazy object first
    pub async fn field(&mut self, name: &str) -> AppResult<Option<&Value>> {
        self.ensure_loaded().await?;
        Ok(self.get_field(name))
    }

    /// Field value from the current snapshot; `None` before the first load
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.data.as_deref().and_then(|data| data.get(name))
    }

    /// The whole snapshot
    pub fn as_map(&self) -> Option<&ObjectData> {
        self.data.as_deref()
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get_field(name).and_then(Value::as_str)
    }

    /// Integer field, also accepting decimal strings
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get_field(name)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Timestamp field in the chain's `%Y-%m-%dT%H:%M:%S` format
    pub fn get_time(&self, name: &str) -> Option<DateTime<Utc>> {
        let raw = self.get_str(name)?;
        NaiveDateTime::parse_from_str(raw, TIME_FORMAT)
            .ok()
            .map(|t| t.and_utc())
    }
}

impl std::fmt::Debug for BlockchainObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainObject")
            .field("kind", &self.kind)
            .field("identifier", &self.identifier)
            .field("full", &self.full)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

macro_rules! object_wrapper {
    ($name:ident, $kind:expr) => {
        impl $name {
            /// Load without the extended representation
            pub async fn new(hive: Arc<Hive>, identifier: &str) -> AppResult<Self> {
                Self::load(hive, identifier, false).await
            }

            pub async fn load(hive: Arc<Hive>, identifier: &str, full: bool) -> AppResult<Self> {
                let identifier = Self::normalize(identifier);
                BlockchainObject::load(hive, $kind, &identifier, full).await.map(Self)
            }

            pub fn lazy(hive: Arc<Hive>, identifier: &str) -> Self {
                let identifier = Self::normalize(identifier);
                Self(BlockchainObject::lazy(hive, $kind, &identifier, false))
            }
        }

        impl Deref for $name {
            type Target = BlockchainObject;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "<{} {}>", stringify!($name), self.0.identifier())
            }
        }
    };
}

/// A chain account
#[derive(Debug, Clone)]
pub struct Account(BlockchainObject);

object_wrapper!(Account, ObjectKind::Account);

impl Account {
    fn normalize(name: &str) -> String {
        name.trim().trim_start_matches('@').to_lowercase()
    }

    pub fn name(&self) -> &str {
        self.identifier()
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.get_time("created")
    }
}

/// A block producer
#[derive(Debug, Clone)]
pub struct Witness(BlockchainObject);

object_wrapper!(Witness, ObjectKind::Witness);

impl Witness {
    fn normalize(owner: &str) -> String {
        owner.trim().trim_start_matches('@').to_lowercase()
    }

    pub fn owner(&self) -> &str {
        self.get_str("owner").unwrap_or_else(|| self.identifier())
    }

    /// Whether the witness has a real signing key set
    pub fn is_active(&self) -> bool {
        self.get_str("signing_key")
            .and_then(|key| key.get(3..))
            .is_some_and(|rest| !rest.is_empty() && rest != NULL_SIGNING_KEY_SUFFIX)
    }

    pub fn votes(&self) -> Option<i64> {
        self.get_i64("votes")
    }
}

/// A native asset of the connected chain
#[derive(Debug, Clone)]
pub struct Asset(BlockchainObject);

object_wrapper!(Asset, ObjectKind::Asset);

impl Asset {
    fn normalize(symbol: &str) -> String {
        symbol.trim().to_string()
    }

    pub fn symbol(&self) -> &str {
        self.get_str("symbol").unwrap_or_else(|| self.identifier())
    }

    /// Wire representation (NAI like `@@000000021` or a legacy symbol)
    pub fn asset_id(&self) -> Option<&str> {
        self.get_str("asset")
    }

    pub fn precision(&self) -> Option<u8> {
        self.get_i64("precision").and_then(|p| u8::try_from(p).ok())
    }
}

impl PartialEq for Asset {
    fn eq(&self, other: &Self) -> bool {
        self.symbol() == other.symbol()
            && self.asset_id() == other.asset_id()
            && self.precision() == other.precision()
    }
}
