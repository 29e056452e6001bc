//! Prometheus metrics for the Hive client
//!
//! Tracks:
//! - RPC call outcomes, call retries and node switches
//! - RPC latency per node
//! - Object cache hits and misses

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Metrics state
pub struct MetricsState {
    /// Prometheus registry
    registry: Registry,
    /// RPC calls by outcome ("ok" or an error label)
    pub rpc_calls: IntCounterVec,
    /// Same-node call retries
    pub call_retries: IntCounter,
    /// Rotations to another node
    pub node_switches: IntCounter,
    /// RPC latency histogram (in milliseconds)
    pub rpc_latency: HistogramVec,
    /// Object cache hits
    pub cache_hits: IntCounter,
    /// Object cache misses
    pub cache_misses: IntCounter,
}

impl MetricsState {
    /// Create a new metrics state with all metrics registered
    pub fn new() -> Self {
        let registry = Registry::new();

        let rpc_calls = IntCounterVec::new(
            Opts::new("hive_rpc_calls_total", "RPC calls by outcome"),
            &["outcome"],
        )
        .expect("Failed to create rpc_calls counter");
        registry
            .register(Box::new(rpc_calls.clone()))
            .expect("Failed to register rpc_calls");

        let call_retries = IntCounter::with_opts(Opts::new(
            "hive_rpc_call_retries_total",
            "Calls repeated against the same node",
        ))
        .expect("Failed to create call_retries counter");
        registry
            .register(Box::new(call_retries.clone()))
            .expect("Failed to register call_retries");

        let node_switches = IntCounter::with_opts(Opts::new(
            "hive_rpc_node_switches_total",
            "Rotations to the next candidate node",
        ))
        .expect("Failed to create node_switches counter");
        registry
            .register(Box::new(node_switches.clone()))
            .expect("Failed to register node_switches");

        let rpc_latency = HistogramVec::new(
            HistogramOpts::new("hive_rpc_latency_ms", "RPC call latency in milliseconds"),
            &["node"],
        )
        .expect("Failed to create rpc_latency histogram");
        registry
            .register(Box::new(rpc_latency.clone()))
            .expect("Failed to register rpc_latency");

        let cache_hits = IntCounter::with_opts(Opts::new(
            "hive_cache_hits_total",
            "Object lookups served from the cache",
        ))
        .expect("Failed to create cache_hits counter");
        registry
            .register(Box::new(cache_hits.clone()))
            .expect("Failed to register cache_hits");

        let cache_misses = IntCounter::with_opts(Opts::new(
            "hive_cache_misses_total",
            "Object lookups that went to the node",
        ))
        .expect("Failed to create cache_misses counter");
        registry
            .register(Box::new(cache_misses.clone()))
            .expect("Failed to register cache_misses");

        Self {
            registry,
            rpc_calls,
            call_retries,
            node_switches,
            rpc_latency,
            cache_hits,
            cache_misses,
        }
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsState")
            .field("node_switches", &self.node_switches.get())
            .field("call_retries", &self.call_retries.get())
            .finish()
    }
}
