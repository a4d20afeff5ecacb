//! EVM address normalization. Everything persisted or compared is lowercase
//! `0x` + 40 hex characters.

/// Lowercases and 0x-prefixes the input, returning `None` when the result is
/// not a well-formed EVM address.
pub fn normalize_evm_address(value: &str) -> Option<String> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() {
        return None;
    }
    let with_prefix = if trimmed.starts_with("0x") {
        trimmed
    } else {
        format!("0x{trimmed}")
    };
    let hex = &with_prefix[2..];
    if hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(with_prefix)
    } else {
        None
    }
}

pub fn is_valid_evm_address(value: &str) -> bool {
    normalize_evm_address(value).is_some()
}

/// Extracts the address packed into the low 20 bytes of a 32-byte topic or
/// ABI word.
pub fn address_from_word(word: &str) -> Option<String> {
    let payload = word.trim().strip_prefix("0x").unwrap_or(word.trim());
    if payload.len() < 40 {
        return None;
    }
    normalize_evm_address(&payload[payload.len() - 40..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_prefix() {
        let addr = "C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
        assert_eq!(
            normalize_evm_address(addr).unwrap(),
            "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"
        );
        assert!(is_valid_evm_address("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"));
    }

    #[test]
    fn rejects_bad_lengths_and_digits() {
        assert!(normalize_evm_address("0x1234").is_none());
        assert!(normalize_evm_address("").is_none());
        assert!(normalize_evm_address("0xzz2aaa39b223fe8d0a0e5c4f27ead9083c756cc2").is_none());
    }

    #[test]
    fn extracts_address_from_topic_word() {
        let topic = "0x000000000000000000000000c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
        assert_eq!(
            address_from_word(topic).unwrap(),
            "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"
        );
        assert!(address_from_word("0x01").is_none());
    }
}
