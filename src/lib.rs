//! Hive Client Library
//!
//! Multi-node JSON-RPC client for Hive/Steem style chains with an
//! identity-keyed object cache on top.

pub mod cache;
pub mod chains;
pub mod config;
pub mod error;
pub mod metrics;
pub mod nodes;
pub mod objects;
pub mod rpc;
pub mod session;

// Re-export commonly used types
pub use cache::ObjectCache;
pub use config::{AppConfig, CacheConfig, RpcConfig};
pub use error::{AppError, AppResult, ErrorClass, ObjectKind, RpcError};
pub use metrics::MetricsState;
pub use nodes::{NodeFilter, NodeInfo, NodeList, NodePool, NodeType, Weights};
pub use objects::{Account, Asset, BlockchainObject, Witness};
pub use rpc::{CallParams, ConnectionState, Dialect, RetryPolicy, RpcClient};
pub use session::{Hive, ObjectData, ObjectKey};
