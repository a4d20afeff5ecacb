//! Swap payload reconstruction. Pure over a raw log plus resolved pool
//! tokens, so the whole decode path is testable without RPC or Redis.
//!
//! Confidence accumulates: 0.5 when topic and registry agree, +0.2 when both
//! pool tokens resolved (+0.1 for one), +0.2 once the payload decodes. Only
//! trades at or above 0.6 are republished downstream.

use titan_core::address::address_from_word;
use titan_core::types::{RawLogEvent, Side};

use crate::registry::{DexRegistryEntry, PoolStrategy};
use crate::topics::{UNISWAP_V2_SWAP_TOPIC, UNISWAP_V2_SYNC_TOPIC, UNISWAP_V3_SWAP_TOPIC};

pub const MIN_PUBLISH_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone, Default)]
pub struct ResolvedTokens {
    pub token0: Option<String>,
    pub token1: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DecodedSwap {
    pub chain: String,
    pub tx_hash: String,
    pub log_index: u64,
    pub block_number: Option<u64>,
    pub wallet_address: Option<String>,
    pub token_address: Option<String>,
    pub side: Option<Side>,
    pub amount: Option<f64>,
    pub dex: Option<String>,
    pub pair_address: Option<String>,
    pub decode_confidence: f64,
}

/// One 32-byte ABI word, sign-aware. Magnitudes fold into f64, which is
/// lossy above 2^53 but sufficient for side attribution and sizing.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AbiWord {
    magnitude: f64,
    negative: bool,
    zero: bool,
}

fn word_bytes(payload: &str, index: usize) -> Option<[u8; 32]> {
    let raw = payload.as_bytes();
    let start = index * 64;
    let end = start + 64;
    if raw.len() < end {
        return None;
    }
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(&raw[start..end], &mut bytes).ok()?;
    Some(bytes)
}

fn fold_bytes(bytes: &[u8; 32]) -> f64 {
    bytes.iter().fold(0.0, |acc, b| acc * 256.0 + f64::from(*b))
}

fn unsigned_word(payload: &str, index: usize) -> Option<AbiWord> {
    let bytes = word_bytes(payload, index)?;
    let zero = bytes.iter().all(|b| *b == 0);
    Some(AbiWord {
        magnitude: fold_bytes(&bytes),
        negative: false,
        zero,
    })
}

fn signed_word(payload: &str, index: usize) -> Option<AbiWord> {
    let mut bytes = word_bytes(payload, index)?;
    let zero = bytes.iter().all(|b| *b == 0);
    let negative = !zero && bytes[0] & 0x80 != 0;
    if negative {
        // Two's complement magnitude.
        for b in bytes.iter_mut() {
            *b = !*b;
        }
        for b in bytes.iter_mut().rev() {
            let (sum, carry) = b.overflowing_add(1);
            *b = sum;
            if !carry {
                break;
            }
        }
    }
    Some(AbiWord {
        magnitude: fold_bytes(&bytes),
        negative,
        zero,
    })
}

fn strip_data(data: &str) -> &str {
    data.strip_prefix("0x").unwrap_or(data)
}

fn topic_address(topics: &[String], index: usize) -> Option<String> {
    topics.get(index).and_then(|t| address_from_word(t))
}

pub fn decode_raw_event(
    event: &RawLogEvent,
    registry_entry: Option<&DexRegistryEntry>,
    tokens: &ResolvedTokens,
) -> DecodedSwap {
    let mut decoded = DecodedSwap {
        chain: event.chain.clone(),
        tx_hash: event.tx_hash.clone(),
        log_index: event.log_index,
        block_number: event.block_number,
        wallet_address: None,
        token_address: None,
        side: None,
        amount: None,
        dex: None,
        pair_address: None,
        decode_confidence: 0.0,
    };

    let topic0 = match event.topics.first() {
        Some(topic) => topic.as_str(),
        None => return decoded,
    };
    let Some(entry) = registry_entry else {
        return decoded;
    };

    let is_v2_swap = topic0 == UNISWAP_V2_SWAP_TOPIC.as_str();
    let is_v3_swap = topic0 == UNISWAP_V3_SWAP_TOPIC.as_str();

    if is_v2_swap || is_v3_swap {
        decoded.dex = Some(entry.dex.to_string());
        decoded.pair_address = Some(event.address.clone());
        decoded.decode_confidence = 0.5;

        match (&tokens.token0, &tokens.token1) {
            (Some(_), Some(_)) => decoded.decode_confidence += 0.2,
            (Some(_), None) | (None, Some(_)) => decoded.decode_confidence += 0.1,
            (None, None) => {}
        }

        decoded.wallet_address = topic_address(&event.topics, 1)
            .or_else(|| topic_address(&event.topics, 2));

        let payload = strip_data(&event.data);
        if is_v2_swap {
            if let (Some(a0_in), Some(a1_in), Some(a0_out), Some(a1_out)) = (
                unsigned_word(payload, 0),
                unsigned_word(payload, 1),
                unsigned_word(payload, 2),
                unsigned_word(payload, 3),
            ) {
                if !a0_out.zero || !a1_in.zero {
                    decoded.side = Some(Side::Buy);
                    decoded.amount = Some(if !a0_out.zero {
                        a0_out.magnitude
                    } else {
                        a1_in.magnitude
                    });
                } else {
                    decoded.side = Some(Side::Sell);
                    decoded.amount = Some(if !a0_in.zero {
                        a0_in.magnitude
                    } else {
                        a1_out.magnitude
                    });
                }
                decoded.token_address =
                    tokens.token0.clone().or_else(|| tokens.token1.clone());
                decoded.decode_confidence += 0.2;
            }
        } else if let (Some(amount0), Some(amount1)) =
            (signed_word(payload, 0), signed_word(payload, 1))
        {
            decoded.side = Some(if amount0.negative {
                Side::Buy
            } else {
                Side::Sell
            });
            if !amount0.zero {
                decoded.token_address = tokens.token0.clone();
                decoded.amount = Some(amount0.magnitude);
            } else {
                decoded.token_address = tokens.token1.clone();
                decoded.amount = Some(amount1.magnitude);
            }
            decoded.decode_confidence += 0.2;
        }
    }

    // Known sync events register without emitting a trade.
    if topic0 == UNISWAP_V2_SYNC_TOPIC.as_str() && entry.strategy == PoolStrategy::V2Pair {
        decoded.decode_confidence = decoded.decode_confidence.max(0.3);
        decoded.pair_address = Some(event.address.clone());
        decoded.dex = Some(entry.dex.to_string());
    }

    decoded.decode_confidence = decoded.decode_confidence.min(1.0);
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::lookup_dex;

    const PAIR: &str = "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc";
    const V3_POOL: &str = "0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640";
    const SENDER_TOPIC: &str =
        "0x0000000000000000000000001111111111111111111111111111111111111111";

    fn word(value: u128) -> String {
        format!("{value:064x}")
    }

    fn tokens() -> ResolvedTokens {
        ResolvedTokens {
            token0: Some("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into()),
            token1: Some("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".into()),
        }
    }

    fn v2_event(data: String) -> RawLogEvent {
        RawLogEvent {
            chain: "ethereum".into(),
            address: PAIR.into(),
            topics: vec![
                UNISWAP_V2_SWAP_TOPIC.clone(),
                SENDER_TOPIC.into(),
            ],
            data: format!("0x{data}"),
            block_number: Some(19_000_000),
            tx_hash: "0xfeed".into(),
            log_index: 3,
        }
    }

    #[test]
    fn v2_amount0_out_is_a_buy() {
        // amount0Out = 1e18, everything else zero.
        let data = format!("{}{}{}{}", word(0), word(0), word(10u128.pow(18)), word(0));
        let event = v2_event(data);
        let entry = lookup_dex("ethereum", PAIR);
        let decoded = decode_raw_event(&event, entry, &tokens());

        assert_eq!(decoded.side, Some(Side::Buy));
        assert_eq!(decoded.dex.as_deref(), Some("uniswap_v2"));
        assert_eq!(decoded.pair_address.as_deref(), Some(PAIR));
        assert_eq!(decoded.amount, Some(1e18));
        assert_eq!(
            decoded.token_address.as_deref(),
            Some("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        );
        assert_eq!(
            decoded.wallet_address.as_deref(),
            Some("0x1111111111111111111111111111111111111111")
        );
        assert!(decoded.decode_confidence >= 0.7);
    }

    #[test]
    fn v2_amount0_in_is_a_sell() {
        let data = format!("{}{}{}{}", word(500), word(0), word(0), word(0));
        let decoded = decode_raw_event(&v2_event(data), lookup_dex("ethereum", PAIR), &tokens());
        assert_eq!(decoded.side, Some(Side::Sell));
        assert_eq!(decoded.amount, Some(500.0));
    }

    #[test]
    fn partial_token_resolution_degrades_confidence() {
        let data = format!("{}{}{}{}", word(0), word(0), word(7), word(0));
        let one_token = ResolvedTokens {
            token0: Some("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into()),
            token1: None,
        };
        let decoded =
            decode_raw_event(&v2_event(data), lookup_dex("ethereum", PAIR), &one_token);
        // 0.5 base + 0.1 one token + 0.2 payload.
        assert!((decoded.decode_confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn v3_negative_amount0_is_a_buy() {
        // amount0 = -1000 (two's complement), amount1 = 2000.
        let neg: String = {
            // two's complement of 1000 in 256 bits
            let mut bytes = [0u8; 32];
            bytes[16..].copy_from_slice(&1000u128.to_be_bytes());
            for b in bytes.iter_mut() {
                *b = !*b;
            }
            for b in bytes.iter_mut().rev() {
                let (sum, carry) = b.overflowing_add(1);
                *b = sum;
                if !carry {
                    break;
                }
            }
            hex::encode(bytes)
        };
        let data = format!("{neg}{}", word(2000));
        let event = RawLogEvent {
            chain: "ethereum".into(),
            address: V3_POOL.into(),
            topics: vec![UNISWAP_V3_SWAP_TOPIC.clone(), SENDER_TOPIC.into()],
            data: format!("0x{data}"),
            block_number: None,
            tx_hash: "0xbeef".into(),
            log_index: 0,
        };
        let decoded = decode_raw_event(&event, lookup_dex("ethereum", V3_POOL), &tokens());
        assert_eq!(decoded.side, Some(Side::Buy));
        assert_eq!(decoded.amount, Some(1000.0));
        assert_eq!(decoded.dex.as_deref(), Some("uniswap_v3"));
        assert_eq!(
            decoded.token_address.as_deref(),
            Some("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        );
    }

    #[test]
    fn sync_event_floors_confidence_without_trade() {
        let event = RawLogEvent {
            chain: "ethereum".into(),
            address: PAIR.into(),
            topics: vec![UNISWAP_V2_SYNC_TOPIC.clone()],
            data: format!("0x{}{}", word(1), word(2)),
            block_number: None,
            tx_hash: "0xsync".into(),
            log_index: 1,
        };
        let decoded = decode_raw_event(&event, lookup_dex("ethereum", PAIR), &tokens());
        assert_eq!(decoded.side, None);
        assert!((decoded.decode_confidence - 0.3).abs() < 1e-9);
        assert!(decoded.decode_confidence < MIN_PUBLISH_CONFIDENCE);
    }

    #[test]
    fn unregistered_pool_decodes_nothing() {
        let data = format!("{}{}{}{}", word(0), word(0), word(7), word(0));
        let mut event = v2_event(data);
        event.address = "0x0000000000000000000000000000000000000009".into();
        let decoded = decode_raw_event(&event, None, &tokens());
        assert_eq!(decoded.decode_confidence, 0.0);
        assert_eq!(decoded.side, None);
        assert!(decoded.pair_address.is_none());
    }
}
