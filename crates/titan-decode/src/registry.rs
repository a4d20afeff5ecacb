//! Registry of known pool contracts. Decoding only proceeds when both the
//! event topic and this registry recognize the emitting address.

pub const DEX_UNISWAP_V2: &str = "uniswap_v2";
pub const DEX_UNISWAP_V3: &str = "uniswap_v3";
pub const DEX_PANCAKESWAP_V2: &str = "pancakeswap_v2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStrategy {
    V2Pair,
    V3Pool,
}

#[derive(Debug, Clone, Copy)]
pub struct DexRegistryEntry {
    pub dex: &'static str,
    pub strategy: PoolStrategy,
}

// Address keys are lowercased.
const REGISTRY: &[(&str, &str, DexRegistryEntry)] = &[
    // Ethereum
    (
        "ethereum",
        "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc",
        DexRegistryEntry {
            dex: DEX_UNISWAP_V2,
            strategy: PoolStrategy::V2Pair,
        },
    ),
    (
        "ethereum",
        "0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640",
        DexRegistryEntry {
            dex: DEX_UNISWAP_V3,
            strategy: PoolStrategy::V3Pool,
        },
    ),
    // BSC
    (
        "bsc",
        "0x16b9a828a7d7c2f6ec0f3b7e6754a672032b337d",
        DexRegistryEntry {
            dex: DEX_PANCAKESWAP_V2,
            strategy: PoolStrategy::V2Pair,
        },
    ),
];

pub fn lookup_dex(chain: &str, address: &str) -> Option<&'static DexRegistryEntry> {
    if address.is_empty() {
        return None;
    }
    let chain = chain.to_lowercase();
    let address = address.to_lowercase();
    REGISTRY
        .iter()
        .find(|(c, a, _)| *c == chain && *a == address)
        .map(|(_, _, entry)| entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let entry = lookup_dex("Ethereum", "0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc")
            .expect("registered pair");
        assert_eq!(entry.dex, DEX_UNISWAP_V2);
        assert_eq!(entry.strategy, PoolStrategy::V2Pair);
    }

    #[test]
    fn unknown_pool_misses() {
        assert!(lookup_dex("ethereum", "0x0000000000000000000000000000000000000001").is_none());
        assert!(lookup_dex("ethereum", "").is_none());
    }
}
