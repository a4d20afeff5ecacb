//! Canonical event signatures and their Keccak-256 topics, computed once at
//! startup and dispatched on `topics[0]`.

use std::sync::LazyLock;

use sha3::{Digest, Keccak256};

pub const UNISWAP_V2_SWAP_SIGNATURE: &str =
    "Swap(address,uint256,uint256,uint256,uint256,address)";
pub const UNISWAP_V2_SYNC_SIGNATURE: &str = "Sync(uint112,uint112)";
pub const UNISWAP_V3_SWAP_SIGNATURE: &str =
    "Swap(address,address,int256,int256,uint160,uint128,int24)";

pub fn event_topic(signature: &str) -> String {
    let digest = Keccak256::digest(signature.as_bytes());
    format!("0x{}", hex::encode(digest))
}

pub static UNISWAP_V2_SWAP_TOPIC: LazyLock<String> =
    LazyLock::new(|| event_topic(UNISWAP_V2_SWAP_SIGNATURE));
pub static UNISWAP_V2_SYNC_TOPIC: LazyLock<String> =
    LazyLock::new(|| event_topic(UNISWAP_V2_SYNC_SIGNATURE));
pub static UNISWAP_V3_SWAP_TOPIC: LazyLock<String> =
    LazyLock::new(|| event_topic(UNISWAP_V3_SWAP_SIGNATURE));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_swap_topic_matches_known_constant() {
        assert_eq!(
            *UNISWAP_V2_SWAP_TOPIC,
            "0xd78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822"
        );
    }

    #[test]
    fn v2_sync_topic_matches_known_constant() {
        assert_eq!(
            *UNISWAP_V2_SYNC_TOPIC,
            "0x1c411e9a96e071241c2f21f7726b17ae89e3cab4c78be50e062b03a9fffbbad1"
        );
    }

    #[test]
    fn v3_swap_topic_matches_known_constant() {
        assert_eq!(
            *UNISWAP_V3_SWAP_TOPIC,
            "0xc42079f94a6350d7e6235f29174924f928cc2ac818eb64fed8004e115fbcca67"
        );
    }
}
