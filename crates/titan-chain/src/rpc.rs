//! Minimal JSON-RPC client over the shared HTTP stack. Only the calls the
//! workers actually make: `eth_call` for pool token resolution and
//! `eth_getTransactionReceipt` for gas accounting.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::json;

use titan_core::http::HttpClient;

pub const TOKEN0_SELECTOR: &str = "0x0dfe1681";
pub const TOKEN1_SELECTOR: &str = "0xd21220a7";

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub gas_used: Option<String>,
    pub effective_gas_price: Option<String>,
    #[serde(default)]
    pub gas_price: Option<String>,
}

impl TxReceipt {
    /// Wei paid for the transaction, when the receipt carries both parts.
    pub fn fee_wei(&self) -> Option<u128> {
        let gas_used = parse_hex_u128(self.gas_used.as_deref()?)?;
        let price = self
            .effective_gas_price
            .as_deref()
            .or(self.gas_price.as_deref())?;
        Some(gas_used.checked_mul(parse_hex_u128(price)?)?)
    }

    pub fn gas_used(&self) -> Option<u128> {
        parse_hex_u128(self.gas_used.as_deref()?)
    }

    pub fn effective_gas_price_wei(&self) -> Option<u128> {
        let price = self
            .effective_gas_price
            .as_deref()
            .or(self.gas_price.as_deref())?;
        parse_hex_u128(price)
    }
}

pub fn parse_hex_u128(raw: &str) -> Option<u128> {
    let trimmed = raw.trim();
    let hex = trimmed.strip_prefix("0x").or(trimmed.strip_prefix("0X"))?;
    u128::from_str_radix(hex, 16).ok()
}

pub struct RpcClient<'a> {
    http: &'a HttpClient,
    url: String,
}

impl<'a> RpcClient<'a> {
    pub fn new(http: &'a HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self.http.post_json(&self.url, &body).await?;
        let envelope: RpcEnvelope<T> = serde_json::from_value(response)?;
        if let Some(error) = envelope.error {
            return Err(anyhow!("rpc {method} error: {error}"));
        }
        Ok(envelope.result)
    }

    /// `eth_call` against `latest`; returns the raw hex result.
    pub async fn eth_call(&self, to: &str, data: &str) -> Result<Option<String>> {
        self.call("eth_call", json!([{"to": to, "data": data}, "latest"]))
            .await
    }

    pub async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>> {
        self.call("eth_getTransactionReceipt", json!([tx_hash])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex_u128("0x5208"), Some(21_000));
        assert_eq!(parse_hex_u128("0x0"), Some(0));
        assert_eq!(parse_hex_u128("21000"), None);
    }

    #[test]
    fn receipt_fee_math() {
        let receipt = TxReceipt {
            gas_used: Some("0x5208".into()),
            effective_gas_price: Some("0x3b9aca00".into()),
            gas_price: None,
        };
        // 21_000 gas at 1 gwei.
        assert_eq!(receipt.fee_wei(), Some(21_000u128 * 1_000_000_000));
    }

    #[test]
    fn receipt_falls_back_to_gas_price() {
        let receipt = TxReceipt {
            gas_used: Some("0x2".into()),
            effective_gas_price: None,
            gas_price: Some("0x3".into()),
        };
        assert_eq!(receipt.fee_wei(), Some(6));

        let incomplete = TxReceipt {
            gas_used: None,
            effective_gas_price: Some("0x3".into()),
            gas_price: None,
        };
        assert_eq!(incomplete.fee_wei(), None);
    }
}
