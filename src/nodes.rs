//! Candidate RPC nodes
//!
//! [`NodePool`] is the ordered list the RPC client rotates through on
//! failure. [`NodeList`] is the bundled table of known public nodes with
//! scores, which can be re-ranked from the benchmark report published by the
//! `fullnodeupdate` account.

use crate::error::RpcError;
use crate::objects::Account;
use crate::session::Hive;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Account whose `json_metadata` carries the node benchmark report
pub const NODE_REPORT_ACCOUNT: &str = "fullnodeupdate";

/// Attempts at reading the report before giving up
const REPORT_FETCH_ATTEMPTS: u32 = 5;

/// Ordered candidate endpoints with a "current" pointer
///
/// Insertion order is priority order. The pool is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePool {
    nodes: Vec<String>,
    current: usize,
}

impl NodePool {
    /// Build a pool from a list of URLs
    ///
    /// Blank entries are skipped. Fails with [`RpcError::InvalidNodeUrl`] on a
    /// URL that is not http(s)/ws(s), and with [`RpcError::NoNodes`] when
    /// nothing usable is left.
    pub fn new<I, S>(urls: I) -> Result<Self, RpcError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut nodes = Vec::new();
        for url in urls {
            let url = url.as_ref().trim();
            if url.is_empty() {
                continue;
            }
            validate_node_url(url)?;
            nodes.push(url.to_string());
        }
        if nodes.is_empty() {
            return Err(RpcError::NoNodes);
        }
        Ok(Self { nodes, current: 0 })
    }

    /// Build a pool from a `;` or `,` delimited string
    pub fn parse(list: &str) -> Result<Self, RpcError> {
        Self::new(list.split([';', ',']))
    }

    /// Pool seeded from the bundled node table
    pub fn from_default() -> Self {
        let urls = NodeList::new().get_nodes(&NodeFilter::default());
        Self {
            nodes: urls,
            current: 0,
        }
    }

    /// URL in active use
    pub fn current(&self) -> &str {
        &self.nodes[self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Advance to the next candidate, wrapping around, and return it
    pub fn next(&mut self) -> &str {
        self.current = (self.current + 1) % self.nodes.len();
        &self.nodes[self.current]
    }

    /// Reorder so the current URL becomes the first candidate
    pub fn move_current_to_front(&mut self) {
        if self.current == 0 {
            return;
        }
        let url = self.nodes.remove(self.current);
        self.nodes.insert(0, url);
        self.current = 0;
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl FromStr for NodePool {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Check that a node URL uses a scheme the client can speak
pub fn validate_node_url(url: &str) -> Result<(), RpcError> {
    let parsed = url::Url::parse(url).map_err(|_| RpcError::InvalidNodeUrl(url.to_string()))?;
    match parsed.scheme() {
        "http" | "https" | "ws" | "wss" if parsed.host_str().is_some() => Ok(()),
        _ => Err(RpcError::InvalidNodeUrl(url.to_string())),
    }
}

/// API family of a public node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Normal,
    Appbase,
    AppbaseDev,
    AppbaseLimited,
    Testnet,
    TestnetDev,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Appbase => write!(f, "appbase"),
            Self::AppbaseDev => write!(f, "appbase-dev"),
            Self::AppbaseLimited => write!(f, "appbase-limited"),
            Self::Testnet => write!(f, "testnet"),
            Self::TestnetDev => write!(f, "testnet-dev"),
        }
    }
}

/// One entry of the node table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub url: String,
    pub version: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub owner: String,
    pub score: f64,
}

impl NodeInfo {
    fn new(url: &str, version: &str, node_type: NodeType, owner: &str, score: f64) -> Self {
        Self {
            url: url.to_string(),
            version: version.to_string(),
            node_type,
            owner: owner.to_string(),
            score,
        }
    }
}

/// Which nodes [`NodeList::get_nodes`] returns
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeFilter {
    /// Drop `appbase-limited` nodes
    #[serde(default)]
    pub exclude_limited: bool,
    /// Include `appbase-dev` nodes
    #[serde(default)]
    pub dev: bool,
    /// Include `testnet` nodes
    #[serde(default)]
    pub testnet: bool,
    /// Include `testnet-dev` nodes
    #[serde(default)]
    pub testnet_dev: bool,
    /// Include `wss://` nodes
    #[serde(default = "default_true")]
    pub wss: bool,
    /// Include `https://` nodes
    #[serde(default = "default_true")]
    pub https: bool,
    /// Include nodes with a negative score
    #[serde(default)]
    pub not_working: bool,
    /// Include `normal` nodes
    #[serde(default = "default_true")]
    pub normal: bool,
    /// Include `appbase` nodes
    #[serde(default = "default_true")]
    pub appbase: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NodeFilter {
    fn default() -> Self {
        Self {
            exclude_limited: false,
            dev: false,
            testnet: false,
            testnet_dev: false,
            wss: true,
            https: true,
            not_working: false,
            normal: true,
            appbase: true,
        }
    }
}

impl NodeFilter {
    /// Filter selecting only testnet nodes
    pub fn testnet_only(testnet_dev: bool) -> Self {
        Self {
            normal: false,
            appbase: false,
            testnet: true,
            testnet_dev,
            dev: false,
            exclude_limited: true,
            ..Self::default()
        }
    }

    fn accepts_type(&self, node_type: NodeType) -> bool {
        match node_type {
            NodeType::Normal => self.normal,
            NodeType::Appbase => self.appbase,
            NodeType::AppbaseDev => self.dev,
            NodeType::AppbaseLimited => !self.exclude_limited,
            NodeType::Testnet => self.testnet,
            NodeType::TestnetDev => self.testnet_dev,
        }
    }
}

/// Per-benchmark weighting used when re-scoring nodes
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Weights {
    /// Every benchmark weighs the same
    #[default]
    Equal,
    /// Weights in benchmark order; missing entries weigh 0
    List(Vec<f64>),
    /// Weights by benchmark name; missing names weigh 0
    Named(HashMap<String, f64>),
}

impl Weights {
    /// Normalized weight per benchmark (summing to 1 unless all are 0)
    pub fn normalize(&self, benchmarks: &[String]) -> HashMap<String, f64> {
        let raw: Vec<f64> = match self {
            Self::Equal => vec![1.0; benchmarks.len()],
            Self::List(weights) => (0..benchmarks.len())
                .map(|i| weights.get(i).copied().unwrap_or(0.0))
                .collect(),
            Self::Named(weights) => benchmarks
                .iter()
                .map(|b| weights.get(b).copied().unwrap_or(0.0))
                .collect(),
        };
        // List/Named weights are normalized by every weight given, as published
        let sum: f64 = match self {
            Self::Equal => raw.iter().sum(),
            Self::List(weights) => weights.iter().sum(),
            Self::Named(weights) => weights.values().sum(),
        };
        benchmarks
            .iter()
            .zip(raw)
            .map(|(b, w)| (b.clone(), if sum > 0.0 { w / sum } else { 0.0 }))
            .collect()
    }
}

/// Benchmark outcome for one node
#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkResult {
    pub rank: i64,
    pub ok: bool,
}

/// One node's entry in the published report
#[derive(Debug, Clone, Deserialize)]
pub struct ReportedNode {
    pub node: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Benchmark name -> result object
    #[serde(flatten)]
    pub results: HashMap<String, serde_json::Value>,
}

impl ReportedNode {
    fn benchmark(&self, name: &str) -> Option<BenchmarkResult> {
        self.results
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportParameters {
    pub benchmarks: Vec<String>,
}

/// Node benchmark report as published in `fullnodeupdate`'s metadata
#[derive(Debug, Clone, Deserialize)]
pub struct NodeReport {
    pub report: Vec<ReportedNode>,
    #[serde(default)]
    pub failing_nodes: Vec<String>,
    pub parameter: ReportParameters,
}

/// Table of known public nodes
#[derive(Debug, Clone, PartialEq)]
pub struct NodeList {
    nodes: Vec<NodeInfo>,
}

impl Default for NodeList {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeList {
    /// Table seeded with the bundled default nodes
    pub fn new() -> Self {
        Self {
            nodes: vec![
                NodeInfo::new("https://api.openhive.network", "0.23.0", NodeType::Appbase, "hiveio", 40.0),
                NodeInfo::new("https://api.hive.blog", "0.23.0", NodeType::Appbase, "hiveio", 40.0),
                NodeInfo::new("https://api.hivekings.com", "0.23.0", NodeType::Appbase, "hivekings", 25.0),
                NodeInfo::new("https://anyx.io", "0.23.0", NodeType::Appbase, "anyx", 70.0),
            ],
        }
    }

    pub fn from_nodes(nodes: Vec<NodeInfo>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// URLs matching `filter`, best score first
    pub fn get_nodes(&self, filter: &NodeFilter) -> Vec<String> {
        let mut selected: Vec<&NodeInfo> = self
            .nodes
            .iter()
            .filter(|n| filter.accepts_type(n.node_type))
            .filter(|n| n.score >= 0.0 || filter.not_working)
            .filter(|n| filter.https || !n.url.starts_with("https"))
            .filter(|n| filter.wss || !n.url.starts_with("wss"))
            .collect();
        // Stable sort keeps table order among equal scores
        selected.sort_by(|a, b| b.score.total_cmp(&a.score));
        selected.into_iter().map(|n| n.url.clone()).collect()
    }

    /// Testnet URLs only
    pub fn get_testnet(&self, testnet_dev: bool) -> Vec<String> {
        self.get_nodes(&NodeFilter::testnet_only(testnet_dev))
    }

    /// Recompute scores from a benchmark report
    ///
    /// Each benchmark contributes `(max_score - rank) / (max_score - 1) * 100`
    /// times its weight, with `max_score = report.len() + 1`. A failed benchmark
    /// ranks `max_score + 1`. Nodes listed as failing score `-1`.
    pub fn apply_report(&mut self, report: &NodeReport, weights: &Weights) {
        let benchmarks = &report.parameter.benchmarks;
        let weights = weights.normalize(benchmarks);
        let max_score = report.report.len() as f64 + 1.0;

        for node in &mut self.nodes {
            if let Some(reported) = report.report.iter().find(|r| r.node == node.url) {
                if let Some(version) = &reported.version {
                    node.version = version.clone();
                }
                let mut total = 0.0;
                for benchmark in benchmarks {
                    let rank = match reported.benchmark(benchmark) {
                        Some(result) if result.ok => result.rank as f64,
                        _ => max_score + 1.0,
                    };
                    let score = (max_score - rank) / (max_score - 1.0) * 100.0;
                    total += score * weights.get(benchmark).copied().unwrap_or(0.0);
                }
                node.score = total;
            }
            if report.failing_nodes.iter().any(|f| f == &node.url) {
                node.score = -1.0;
            }
        }
    }

    /// Parse a report out of an account's `json_metadata` string
    pub fn parse_report(json_metadata: &str) -> Option<NodeReport> {
        serde_json::from_str(json_metadata).ok()
    }

    /// Re-rank the table from the report published on chain
    ///
    /// Returns `false` and leaves the table untouched when no report could be
    /// read within a few attempts.
    pub async fn update_nodes(&mut self, hive: &Arc<Hive>, weights: &Weights) -> bool {
        let mut report = None;
        for attempt in 1..=REPORT_FETCH_ATTEMPTS {
            let mut account = Account::lazy(Arc::clone(hive), NODE_REPORT_ACCOUNT);
            match account.refresh().await {
                Ok(()) => {
                    report = account
                        .get_str("json_metadata")
                        .and_then(Self::parse_report);
                    if report.is_some() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt, error = %e, "Failed to read node report");
                }
            }
            if attempt == REPORT_FETCH_ATTEMPTS {
                break;
            }
            if let Err(e) = hive.rpc().await.next_node().await {
                tracing::warn!(error = %e, "No node left to read the node report from");
                break;
            }
        }

        let Some(report) = report else {
            return false;
        };
        self.apply_report(&report, weights);
        tracing::info!(nodes = self.nodes.len(), "Node scores updated");
        true
    }
}
