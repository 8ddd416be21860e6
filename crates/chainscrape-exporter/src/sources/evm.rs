//! Ethereum JSON-RPC adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chainscrape_core::address::EvmAddress;
use chainscrape_core::amount::Amount;
use chainscrape_core::error::{ExporterError, Result};

use super::{http, EvmQuery};

/// `balanceOf(address)`.
const BALANCE_OF_SELECTOR: &str = "0x70a08231";

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

pub struct EthRpc {
    client: reqwest::Client,
    url: String,
}

impl EthRpc {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    async fn quantity(&self, method: &str, params: Value) -> Result<Amount> {
        let req = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let resp: RpcResponse = http::post_json(&self.client, &self.url, &req).await?;
        if let Some(err) = resp.error {
            return Err(ExporterError::SourceUnavailable(format!(
                "{method}: rpc error {}: {}",
                err.code, err.message
            )));
        }
        let hex = resp
            .result
            .ok_or_else(|| ExporterError::DecodeFailure(format!("{method}: response has no result")))?;
        Amount::parse_hex(&hex)
    }
}

#[async_trait]
impl EvmQuery for EthRpc {
    async fn balance_at(&self, address: &EvmAddress) -> Result<Amount> {
        self.quantity("eth_getBalance", json!([address.to_string(), "latest"]))
            .await
    }

    async fn erc20_balance_of(&self, token: &EvmAddress, holder: &EvmAddress) -> Result<Amount> {
        let call = json!({
            "to": token.to_string(),
            "data": format!("{BALANCE_OF_SELECTOR}{}", holder.abi_word()),
        });
        self.quantity("eth_call", json!([call, "latest"])).await
    }
}
