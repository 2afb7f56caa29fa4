//! Wallet balance probe over Ethereum JSON-RPC

use mender_core::config::FinanceConfig;
use mender_core::{MenderError, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const WEI_PER_ETH: f64 = 1e18;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// `0x` followed by 40 hex digits
pub fn is_hex_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Convert a `0x`-prefixed hex wei quantity to ETH
pub fn wei_hex_to_eth(quantity: &str) -> Result<f64> {
    let digits = quantity
        .strip_prefix("0x")
        .ok_or_else(|| MenderError::Finance(format!("not a hex quantity: {}", quantity)))?;
    if digits.is_empty() {
        return Ok(0.0);
    }
    let wei = u128::from_str_radix(digits, 16)
        .map_err(|e| MenderError::Finance(format!("bad quantity {}: {}", quantity, e)))?;
    Ok(wei as f64 / WEI_PER_ETH)
}

/// Reads one wallet's balance
#[derive(Debug, Clone)]
pub struct WalletProbe {
    rpc_url: String,
    address: String,
    client: reqwest::Client,
}

impl WalletProbe {
    /// Build a probe; ENS names and malformed addresses are rejected
    pub fn new(config: &FinanceConfig, timeout: Duration) -> Result<Self> {
        let address = config.wallet.trim();
        if !is_hex_address(address) {
            return Err(MenderError::Finance(format!(
                "wallet {:?} is not a 0x hex address (ENS names are not resolved)",
                address
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MenderError::Finance(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            rpc_url: config.rpc_url.clone(),
            address: address.to_string(),
            client,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Current balance in ETH
    pub async fn balance_eth(&self) -> Result<f64> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "eth_getBalance",
            "params": [self.address, "latest"],
            "id": 1
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MenderError::Finance(format!("RPC request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(MenderError::Finance(format!(
                "RPC error {}",
                response.status()
            )));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| MenderError::Finance(format!("Failed to parse RPC response: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(MenderError::Finance(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        let quantity = parsed
            .result
            .ok_or_else(|| MenderError::Finance("RPC response has no result".to_string()))?;
        let eth = wei_hex_to_eth(&quantity)?;
        debug!("Wallet {} => {} ETH", self.address, eth);
        Ok(eth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WALLET: &str = "0x00000000219ab540356cBB839Cbe05303d7705Fa";

    fn config(rpc_url: &str, wallet: &str) -> FinanceConfig {
        FinanceConfig {
            enabled: true,
            rpc_url: rpc_url.to_string(),
            wallet: wallet.to_string(),
            ..FinanceConfig::default()
        }
    }

    #[test]
    fn test_is_hex_address() {
        assert!(is_hex_address(WALLET));
        assert!(!is_hex_address("vitalik.eth"));
        assert!(!is_hex_address("0x1234"));
        assert!(!is_hex_address(""));
    }

    #[test]
    fn test_wei_hex_to_eth() {
        assert_eq!(wei_hex_to_eth("0xde0b6b3a7640000").unwrap(), 1.0);
        assert_eq!(wei_hex_to_eth("0x0").unwrap(), 0.0);
        assert!(wei_hex_to_eth("12").is_err());
        assert!(wei_hex_to_eth("0xzz").is_err());
    }

    #[test]
    fn test_ens_name_rejected() {
        let err = WalletProbe::new(&config("http://localhost", "me.eth"), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, MenderError::Finance(_)));
    }

    #[tokio::test]
    async fn test_balance_eth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "method": "eth_getBalance",
                "params": [WALLET, "latest"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": "0x6f05b59d3b20000"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let probe =
            WalletProbe::new(&config(&server.uri(), WALLET), Duration::from_secs(5)).unwrap();
        assert_eq!(probe.balance_eth().await.unwrap(), 0.5);
    }

    #[tokio::test]
    async fn test_rpc_error_is_finance_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1,
                "error": {"code": -32602, "message": "invalid address"}
            })))
            .mount(&server)
            .await;

        let probe =
            WalletProbe::new(&config(&server.uri(), WALLET), Duration::from_secs(5)).unwrap();
        let err = probe.balance_eth().await.unwrap_err();
        assert!(err.to_string().contains("invalid address"));
    }
}
