//! API dialects
//!
//! Nodes speak either the legacy positional API or the appbase API with
//! namespaced methods and named arguments. The dialect is picked once per
//! connection; every dialect difference (envelope shape, object lookups,
//! reply unwrapping) is answered here so call sites never branch on it.

use crate::error::ObjectKind;
use serde_json::{json, Map, Value};

/// API namespaces served by full nodes
pub const KNOWN_APIS: &[&str] = &[
    "account_by_key_api",
    "account_history_api",
    "block_api",
    "bridge",
    "condenser_api",
    "database_api",
    "debug_node_api",
    "follow_api",
    "jsonrpc",
    "market_history_api",
    "network_broadcast_api",
    "rc_api",
    "reputation_api",
    "tags_api",
    "transaction_status_api",
    "witness_api",
];

/// API used when the caller names none
pub const DEFAULT_API: &str = "database_api";

/// Arguments of a remote call
#[derive(Debug, Clone, PartialEq)]
pub enum CallParams {
    /// Positional argument list
    Positional(Vec<Value>),
    /// A single object of named arguments
    Named(Map<String, Value>),
}

impl CallParams {
    /// No arguments
    pub fn none() -> Self {
        Self::Positional(Vec::new())
    }

    /// Named arguments from a JSON object; any other value becomes one positional arg
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Named(map),
            Value::Array(args) => Self::Positional(args),
            Value::Null => Self::none(),
            other => Self::Positional(vec![other]),
        }
    }

    fn as_positional(&self) -> Vec<Value> {
        match self {
            Self::Positional(args) => args.clone(),
            Self::Named(map) => vec![Value::Object(map.clone())],
        }
    }
}

impl Default for CallParams {
    fn default() -> Self {
        Self::none()
    }
}

impl From<Vec<Value>> for CallParams {
    fn from(args: Vec<Value>) -> Self {
        Self::Positional(args)
    }
}

impl From<Map<String, Value>> for CallParams {
    fn from(map: Map<String, Value>) -> Self {
        Self::Named(map)
    }
}

/// Normalize an API name the way appbase expects it (`database` -> `database_api`)
pub fn normalize_api(api: &str) -> String {
    if api == "jsonrpc" || api == "bridge" || api.ends_with("_api") {
        api.to_string()
    } else {
        format!("{api}_api")
    }
}

/// A dialect-shaped object lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub api: Option<&'static str>,
    pub method: &'static str,
    pub params: CallParams,
}

/// Wire dialect of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Pre-appbase positional API
    Legacy,
    /// Namespaced appbase API
    Appbase,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Appbase => write!(f, "appbase"),
        }
    }
}

impl Dialect {
    /// Decide the dialect from the chain properties returned by `get_config`
    pub fn from_properties(properties: &Value) -> Self {
        let has = |key: &str| properties.get(key).is_some();
        if has("HIVE_BLOCKCHAIN_VERSION") || has("STEEM_BLOCKCHAIN_VERSION") {
            Self::Appbase
        } else if has("STEEMIT_BLOCKCHAIN_VERSION") {
            Self::Legacy
        } else {
            Self::Appbase
        }
    }

    /// Build the JSON-RPC request object for a call
    pub fn envelope(self, id: u64, api: Option<&str>, method: &str, params: &CallParams) -> Value {
        match self {
            Self::Legacy => match api {
                None => json!({
                    "jsonrpc": "2.0",
                    "method": method,
                    "params": params.as_positional(),
                    "id": id,
                }),
                Some(api) => json!({
                    "jsonrpc": "2.0",
                    "method": "call",
                    "params": [normalize_api(api), method, params.as_positional()],
                    "id": id,
                }),
            },
            Self::Appbase => {
                let api = normalize_api(api.unwrap_or(DEFAULT_API));
                match params {
                    CallParams::Named(map) => json!({
                        "jsonrpc": "2.0",
                        "method": format!("{api}.{method}"),
                        "params": map,
                        "id": id,
                    }),
                    CallParams::Positional(args) if args.is_empty() => json!({
                        "jsonrpc": "2.0",
                        "method": format!("{api}.{method}"),
                        "params": {},
                        "id": id,
                    }),
                    CallParams::Positional(args) => json!({
                        "jsonrpc": "2.0",
                        "method": "call",
                        "params": [api, method, args],
                        "id": id,
                    }),
                }
            }
        }
    }

    /// The call that fetches one object of `kind`
    ///
    /// `None` for kinds resolved locally (assets).
    pub fn lookup(self, kind: ObjectKind, identifier: &str) -> Option<Lookup> {
        let lookup = match (self, kind) {
            (_, ObjectKind::Asset) => return None,
            (Self::Legacy, ObjectKind::Account) => Lookup {
                api: None,
                method: "get_accounts",
                params: CallParams::Positional(vec![json!([identifier])]),
            },
            (Self::Legacy, ObjectKind::Witness) => Lookup {
                api: None,
                method: "get_witness_by_account",
                params: CallParams::Positional(vec![json!(identifier)]),
            },
            (Self::Appbase, ObjectKind::Account) => Lookup {
                api: Some("database_api"),
                method: "find_accounts",
                params: named(json!({ "accounts": [identifier] })),
            },
            (Self::Appbase, ObjectKind::Witness) => Lookup {
                api: Some("database_api"),
                method: "find_witnesses",
                params: named(json!({ "owners": [identifier] })),
            },
        };
        Some(lookup)
    }

    /// Extra call made for the full representation of an object
    pub fn extended_lookup(self, kind: ObjectKind, identifier: &str) -> Option<Lookup> {
        match (self, kind) {
            (Self::Appbase, ObjectKind::Account) => Some(Lookup {
                api: Some("rc_api"),
                method: "find_rc_accounts",
                params: named(json!({ "accounts": [identifier] })),
            }),
            _ => None,
        }
    }

    /// Pull the single object out of a lookup reply; `None` means "not found"
    pub fn unwrap_lookup(self, kind: ObjectKind, result: Value) -> Option<Map<String, Value>> {
        let item = match (self, kind) {
            (_, ObjectKind::Asset) => return None,
            (Self::Legacy, ObjectKind::Account) => first(result),
            (Self::Legacy, ObjectKind::Witness) => Some(result),
            (Self::Appbase, ObjectKind::Account) => first(field(result, "accounts")),
            (Self::Appbase, ObjectKind::Witness) => first(field(result, "witnesses")),
        };
        match item {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// Pull the extended data out of an [`extended_lookup`](Self::extended_lookup) reply
    pub fn unwrap_extended(self, kind: ObjectKind, result: Value) -> Option<Value> {
        match (self, kind) {
            (Self::Appbase, ObjectKind::Account) => first(field(result, "rc_accounts")),
            _ => None,
        }
    }
}

fn named(value: Value) -> CallParams {
    CallParams::from_value(value)
}

fn field(value: Value, name: &str) -> Value {
    match value {
        Value::Object(mut map) => map.remove(name).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn first(value: Value) -> Option<Value> {
    match value {
        Value::Array(items) => items.into_iter().next(),
        _ => None,
    }
}
