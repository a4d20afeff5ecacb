//! Domain vocabulary shared across workers, plus the flat string-map
//! encodings used on the Redis streams.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::TitanError;

pub const CHAIN_ETHEREUM: &str = "ethereum";
pub const CHAIN_BSC: &str = "bsc";
pub const REQUIRED_CHAINS: [&str; 2] = [CHAIN_ETHEREUM, CHAIN_BSC];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    pub fn parse(raw: &str) -> Option<Side> {
        match raw.trim().to_lowercase().as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Ocean,
    Shadow,
    Titan,
    Ignore,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Ocean => "ocean",
            Tier::Shadow => "shadow",
            Tier::Titan => "titan",
            Tier::Ignore => "ignore",
        }
    }

    pub fn parse(raw: &str) -> Result<Tier, TitanError> {
        match raw.trim().to_lowercase().as_str() {
            "ocean" => Ok(Tier::Ocean),
            "shadow" => Ok(Tier::Shadow),
            "titan" => Ok(Tier::Titan),
            "ignore" => Ok(Tier::Ignore),
            other => Err(TitanError::Config(format!("unknown tier: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletSource {
    Autopilot,
    SeedPack,
    Manual,
}

impl WalletSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletSource::Autopilot => "autopilot",
            WalletSource::SeedPack => "seed_pack",
            WalletSource::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    TradeConviction,
    PoolActivity,
    WalletTier,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::TradeConviction => "trade_conviction",
            AlertType::PoolActivity => "pool_activity",
            AlertType::WalletTier => "wallet_tier",
        }
    }
}

/// A raw chain log as it travels on `titan:raw_events`. Stream messages are
/// flat string maps; `topics` rides as a JSON-encoded array.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLogEvent {
    pub chain: String,
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: Option<u64>,
    pub tx_hash: String,
    pub log_index: u64,
}

impl RawLogEvent {
    pub fn dedupe_key(&self) -> String {
        format!("{}|{}|{}", self.chain, self.tx_hash, self.log_index)
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("chain".into(), self.chain.clone()),
            ("address".into(), self.address.clone()),
            (
                "topics".into(),
                serde_json::to_string(&self.topics).unwrap_or_else(|_| "[]".into()),
            ),
            ("data".into(), self.data.clone()),
            (
                "blockNumber".into(),
                self.block_number.map(|n| n.to_string()).unwrap_or_default(),
            ),
            ("txHash".into(), self.tx_hash.clone()),
            ("logIndex".into(), self.log_index.to_string()),
        ]
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, TitanError> {
        let tx_hash = fields
            .get("txHash")
            .or_else(|| fields.get("tx_hash"))
            .filter(|v| !v.is_empty())
            .ok_or_else(|| TitanError::Decode("missing tx_hash".into()))?
            .to_lowercase();
        let chain = fields
            .get("chain")
            .cloned()
            .unwrap_or_else(|| CHAIN_ETHEREUM.into())
            .to_lowercase();
        let topics = fields
            .get("topics")
            .map(|raw| parse_topics(raw))
            .unwrap_or_default();
        let log_index = fields
            .get("logIndex")
            .or_else(|| fields.get("log_index"))
            .and_then(|raw| parse_quantity(raw))
            .unwrap_or(0);
        let block_number = fields
            .get("blockNumber")
            .or_else(|| fields.get("block_number"))
            .and_then(|raw| parse_quantity(raw));
        Ok(Self {
            chain,
            address: fields
                .get("address")
                .cloned()
                .unwrap_or_default()
                .to_lowercase(),
            topics,
            data: fields.get("data").cloned().unwrap_or_default(),
            block_number,
            tx_hash,
            log_index,
        })
    }
}

/// The slice of a decoded trade the risk worker needs.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTradeMsg {
    pub chain: String,
    pub tx_hash: String,
    pub log_index: u64,
    pub token_address: Option<String>,
    pub wallet_address: Option<String>,
    pub pair_address: Option<String>,
}

impl DecodedTradeMsg {
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, TitanError> {
        let tx_hash = fields
            .get("tx_hash")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| TitanError::Decode("missing tx_hash".into()))?
            .to_lowercase();
        let non_empty = |key: &str| fields.get(key).filter(|v| !v.is_empty()).cloned();
        Ok(Self {
            chain: fields
                .get("chain")
                .cloned()
                .unwrap_or_else(|| CHAIN_ETHEREUM.into())
                .to_lowercase(),
            tx_hash,
            log_index: fields
                .get("log_index")
                .and_then(|raw| parse_quantity(raw))
                .unwrap_or(0),
            token_address: non_empty("token_address").map(|a| a.to_lowercase()),
            wallet_address: non_empty("wallet_address").map(|a| a.to_lowercase()),
            pair_address: non_empty("pair_address").map(|a| a.to_lowercase()),
        })
    }
}

/// Parses `0x`-hex or decimal quantities as they appear in RPC payloads.
pub fn parse_quantity(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or(trimmed.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        trimmed.parse().ok()
    }
}

fn parse_topics(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(topics) => topics.into_iter().map(|t| t.to_lowercase()).collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_parses_hex_and_decimal() {
        assert_eq!(parse_quantity("0x10"), Some(16));
        assert_eq!(parse_quantity("42"), Some(42));
        assert_eq!(parse_quantity(""), None);
        assert_eq!(parse_quantity("0xzz"), None);
    }

    #[test]
    fn raw_event_round_trips_through_fields() {
        let event = RawLogEvent {
            chain: "ethereum".into(),
            address: "0xpool".into(),
            topics: vec!["0xaa".into(), "0xbb".into()],
            data: "0x01".into(),
            block_number: Some(19_000_000),
            tx_hash: "0xdead".into(),
            log_index: 7,
        };
        let fields: HashMap<String, String> = event.to_fields().into_iter().collect();
        let parsed = RawLogEvent::from_fields(&fields).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.dedupe_key(), "ethereum|0xdead|7");
    }

    #[test]
    fn raw_event_requires_tx_hash() {
        let fields = HashMap::from([("chain".to_string(), "bsc".to_string())]);
        assert!(RawLogEvent::from_fields(&fields).is_err());
    }

    #[test]
    fn side_and_tier_parse_case_insensitively() {
        assert_eq!(Side::parse("BUY"), Some(Side::Buy));
        assert_eq!(Side::parse("nope"), None);
        assert_eq!(Tier::parse("Shadow").unwrap(), Tier::Shadow);
        assert!(Tier::parse("whale").is_err());
    }
}
