//! Error types for the Hive client
//!
//! Transport and server failures are classified once, in the RPC layer, into
//! [`RpcError`]. Everything above it (session, object wrappers, CLI) sees
//! either data, a kind-specific "does not exist" error, or one of the two
//! retry-exhaustion errors.

use thiserror::Error;

/// How the RPC client reacts to a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Retry the identical call against the same node
    CallRetry,
    /// Give up on the current node and rotate to the next candidate
    NodeRetry,
    /// Never retried, propagated to the caller immediately
    Permanent,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CallRetry => write!(f, "call_retry"),
            Self::NodeRetry => write!(f, "node_retry"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Classified RPC failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RpcError {
    /// The request did not complete within the configured timeout
    #[error("Request to {url} timed out")]
    TransportTimeout { url: String },

    /// The node could not be reached or dropped the connection
    #[error("Node {url} unreachable: {reason}")]
    TransportUnreachable { url: String, reason: String },

    /// 500/502/503/504: the endpoint is unhealthy right now
    #[error("Server busy (HTTP {status})")]
    ServerBusy { status: u16 },

    /// 501/505-511: the request can never succeed against this server
    #[error("Server error (HTTP {status})")]
    ServerPermanent { status: u16 },

    /// Success status but the body was not a JSON-RPC reply
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The node answered, but is in no state to serve this call
    #[error("Node fault: {0}")]
    NodeFault(String),

    /// Transient node-side error worth repeating against the same node
    #[error("Retryable RPC error: {0}")]
    RetryableRemote(String),

    /// The remote API has no such method
    #[error("No method with name: {0}")]
    NoMethodWithName(String),

    /// The remote API namespace does not exist
    #[error("No API with name: {0}")]
    NoApiWithName(String),

    /// Any other error object returned by the node
    #[error("Unhandled RPC error ({code}): {message}")]
    Unhandled { code: i64, message: String },

    /// Call-level retry budget spent against the current node
    #[error("Call retries reached")]
    CallRetriesReached,

    /// Node rotation budget spent across all candidates
    #[error("Number of retries reached")]
    NumRetriesReached,

    /// The node pool was built from zero usable URLs
    #[error("No usable nodes given")]
    NoNodes,

    /// A node URL is not http(s) or ws(s)
    #[error("Invalid node url: {0}")]
    InvalidNodeUrl(String),
}

impl RpcError {
    /// Retry policy that applies to this failure
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidResponse(_) | Self::RetryableRemote(_) => ErrorClass::CallRetry,
            Self::TransportTimeout { .. }
            | Self::TransportUnreachable { .. }
            | Self::ServerBusy { .. }
            | Self::NodeFault(_) => ErrorClass::NodeRetry,
            Self::ServerPermanent { .. }
            | Self::NoMethodWithName(_)
            | Self::NoApiWithName(_)
            | Self::Unhandled { .. }
            | Self::CallRetriesReached
            | Self::NumRetriesReached
            | Self::NoNodes
            | Self::InvalidNodeUrl(_) => ErrorClass::Permanent,
        }
    }

    /// Returns `true` for the two retry-exhaustion outcomes
    #[must_use]
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, Self::CallRetriesReached | Self::NumRetriesReached)
    }

    /// Short label used for metrics
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransportTimeout { .. } => "timeout",
            Self::TransportUnreachable { .. } => "unreachable",
            Self::ServerBusy { .. } => "server_busy",
            Self::ServerPermanent { .. } => "server_permanent",
            Self::InvalidResponse(_) => "invalid_response",
            Self::NodeFault(_) => "node_fault",
            Self::RetryableRemote(_) => "retryable_remote",
            Self::NoMethodWithName(_) => "no_method",
            Self::NoApiWithName(_) => "no_api",
            Self::Unhandled { .. } => "unhandled",
            Self::CallRetriesReached => "call_retries_reached",
            Self::NumRetriesReached => "num_retries_reached",
            Self::NoNodes => "no_nodes",
            Self::InvalidNodeUrl(_) => "invalid_node_url",
        }
    }
}

/// Which kind of chain object a lookup was for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Account,
    Witness,
    Asset,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Account => write!(f, "account"),
            Self::Witness => write!(f, "witness"),
            Self::Asset => write!(f, "asset"),
        }
    }
}

/// Library-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Classified RPC failure
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// The node answered that the account does not exist
    #[error("Account does not exist: {0}")]
    AccountDoesNotExist(String),

    /// The node answered that the witness does not exist
    #[error("Witness does not exist: {0}")]
    WitnessDoesNotExist(String),

    /// The asset is not known on the connected chain
    #[error("Asset does not exist: {0}")]
    AssetDoesNotExist(String),
}

impl AppError {
    /// The not-found error for an object kind
    pub fn does_not_exist(kind: ObjectKind, identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        match kind {
            ObjectKind::Account => Self::AccountDoesNotExist(identifier),
            ObjectKind::Witness => Self::WitnessDoesNotExist(identifier),
            ObjectKind::Asset => Self::AssetDoesNotExist(identifier),
        }
    }

    /// Returns `true` if the remote API answered "not found"
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::AccountDoesNotExist(_) | Self::WitnessDoesNotExist(_) | Self::AssetDoesNotExist(_)
        )
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
