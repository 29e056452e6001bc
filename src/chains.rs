//! Known chains and their native assets

use crate::rpc::Dialect;
use serde_json::Value;

/// A native asset of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainAsset {
    /// Asset string as used on the wire (NAI or legacy symbol)
    pub asset: &'static str,
    pub symbol: &'static str,
    pub precision: u8,
    pub id: u32,
}

/// Static parameters of a known chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    pub name: &'static str,
    pub chain_id: &'static str,
    pub min_version: &'static str,
    pub prefix: &'static str,
    pub assets: &'static [ChainAsset],
}

const MAINNET_ID: &str = "0000000000000000000000000000000000000000000000000000000000000000";

pub const HIVE_APPBASE: ChainParams = ChainParams {
    name: "HIVEAPPBASE",
    chain_id: MAINNET_ID,
    min_version: "0.23.0",
    prefix: "STM",
    assets: &[
        ChainAsset { asset: "@@000000013", symbol: "SBD", precision: 3, id: 0 },
        ChainAsset { asset: "@@000000021", symbol: "STEEM", precision: 3, id: 1 },
        ChainAsset { asset: "@@000000013", symbol: "HBD", precision: 3, id: 0 },
        ChainAsset { asset: "@@000000021", symbol: "HIVE", precision: 3, id: 1 },
        ChainAsset { asset: "@@000000037", symbol: "VESTS", precision: 6, id: 2 },
    ],
};

pub const HIVE_LEGACY: ChainParams = ChainParams {
    name: "HIVE",
    chain_id: MAINNET_ID,
    min_version: "0.23.0",
    prefix: "STM",
    assets: &[
        ChainAsset { asset: "SBD", symbol: "HBD", precision: 3, id: 0 },
        ChainAsset { asset: "HIVE", symbol: "HIVE", precision: 3, id: 1 },
        ChainAsset { asset: "VESTS", symbol: "VESTS", precision: 6, id: 2 },
    ],
};

pub const TESTNET: ChainParams = ChainParams {
    name: "TESTNET",
    chain_id: "79276aea5d4877d9a25892eaa01b0adf019d3e5cb12a97478df3298ccdd01673",
    min_version: "0.20.0",
    prefix: "STX",
    assets: &[
        ChainAsset { asset: "@@000000013", symbol: "SBD", precision: 3, id: 0 },
        ChainAsset { asset: "@@000000021", symbol: "HIVE", precision: 3, id: 1 },
        ChainAsset { asset: "@@000000037", symbol: "VESTS", precision: 6, id: 2 },
    ],
};

pub const KNOWN_CHAINS: &[ChainParams] = &[HIVE_APPBASE, HIVE_LEGACY, TESTNET];

impl ChainParams {
    /// Find an asset by symbol, asset string or numeric id
    pub fn find_asset(&self, identifier: &str) -> Option<&'static ChainAsset> {
        let id = identifier.parse::<u32>().ok();
        self.assets
            .iter()
            .find(|a| a.symbol == identifier || a.asset == identifier || Some(a.id) == id)
    }
}

pub fn by_name(name: &str) -> Option<&'static ChainParams> {
    KNOWN_CHAINS.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

/// Pick the chain a node belongs to from its `get_config` properties
///
/// Mainnet nodes resolve by dialect; without properties the appbase mainnet is assumed.
pub fn detect(properties: Option<&Value>, dialect: Option<Dialect>) -> &'static ChainParams {
    let chain_id = properties.and_then(|props| {
        ["HIVE_CHAIN_ID", "STEEM_CHAIN_ID", "STEEMIT_CHAIN_ID"]
            .iter()
            .find_map(|key| props.get(*key).and_then(Value::as_str))
    });

    if let Some(id) = chain_id {
        if id == TESTNET.chain_id {
            return &KNOWN_CHAINS[2];
        }
        if id != MAINNET_ID {
            tracing::warn!(chain_id = id, "Unknown chain id, assuming Hive mainnet");
        }
    }

    match dialect {
        Some(Dialect::Legacy) => &KNOWN_CHAINS[1],
        _ => &KNOWN_CHAINS[0],
    }
}
