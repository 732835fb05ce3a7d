use async_trait::async_trait;
use reqwest::Proxy;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::traits::{NodeConnection, OperationId, Recipient, RpcRequest, RpcTransport, UnspentOutput};
use crate::config::NodeConfig;
use crate::error::{AppError, AppResult};

/// Verification progress below this means the node is still catching up
const SYNCED_PROGRESS: f64 = 0.9999;

/// JSON-RPC client for a zcashd-compatible full node
pub struct RpcNodeClient {
    http: reqwest::Client,
    rpc_url: String,
    rpc_user: Option<String>,
    rpc_password: Option<String>,
    next_id: AtomicU64,
}

// JSON-RPC request/response types
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// Entry of listunspent / z_listunspent
#[derive(Debug, Deserialize)]
struct ListUnspentEntry {
    address: String,
    txid: String,
    amount: f64,
    confirmations: i64,
    #[serde(default = "default_spendable")]
    spendable: bool,
}

fn default_spendable() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct BlockchainInfo {
    blocks: u64,
    verificationprogress: f64,
}

fn coins_to_decimal(amount: f64) -> Decimal {
    Decimal::from_str(&format!("{:.8}", amount)).unwrap_or(Decimal::ZERO)
}

impl From<ListUnspentEntry> for UnspentOutput {
    fn from(entry: ListUnspentEntry) -> Self {
        UnspentOutput {
            address: entry.address,
            txid: entry.txid,
            amount: coins_to_decimal(entry.amount),
            confirmations: entry.confirmations.max(0) as u32,
            spendable: entry.spendable,
        }
    }
}

/// Per-address sum of outputs with at least one confirmation
pub fn confirmed_balances_from(outputs: &[UnspentOutput]) -> HashMap<String, Decimal> {
    let mut balances: HashMap<String, Decimal> = HashMap::new();
    for output in outputs.iter().filter(|o| o.confirmations > 0) {
        *balances.entry(output.address.clone()).or_insert(Decimal::ZERO) += output.amount;
    }
    balances
}

/// Build the z_sendmany parameter array
pub fn z_sendmany_params(
    from_address: &str,
    recipients: &[Recipient],
    fee: Decimal,
) -> serde_json::Value {
    let outputs: Vec<serde_json::Value> = recipients
        .iter()
        .map(|recipient| {
            // Amounts go over the wire as 8dp strings; more places are rejected by the node
            let mut output = serde_json::json!({
                "address": recipient.address,
                "amount": recipient.amount.round_dp(8).to_string(),
            });
            if let Some(memo) = &recipient.memo {
                if recipient.address.starts_with('z') && !memo.trim().is_empty() {
                    output["memo"] = serde_json::json!(memo);
                }
            }
            output
        })
        .collect();

    serde_json::json!([
        from_address,
        outputs,
        1,
        fee.round_dp(8).to_f64().unwrap_or_default()
    ])
}

impl RpcNodeClient {
    /// Create a reqwest client with optional proxy support
    fn create_http_client(proxy_url: &Option<String>, timeout: Duration) -> AppResult<reqwest::Client> {
        let mut client_builder = reqwest::Client::builder().timeout(timeout);

        if let Some(proxy) = proxy_url {
            if !proxy.is_empty() {
                let proxy = Proxy::all(proxy)
                    .map_err(|e| AppError::BlockchainError(format!("Invalid proxy URL: {}", e)))?;
                client_builder = client_builder.proxy(proxy);
                tracing::debug!("Node RPC proxy configured");
            }
        }

        client_builder
            .build()
            .map_err(|e| AppError::BlockchainError(format!("Failed to create HTTP client: {}", e)))
    }

    pub fn new(config: &NodeConfig) -> AppResult<Self> {
        tracing::info!("Initializing node client with RPC: {}", config.rpc_url);

        if config.rpc_proxy.is_some() {
            tracing::info!("Node RPC proxy enabled");
        }

        Ok(Self {
            http: Self::create_http_client(
                &config.rpc_proxy,
                Duration::from_secs(config.timeout_secs),
            )?,
            rpc_url: config.rpc_url.clone(),
            rpc_user: config.rpc_user.clone(),
            rpc_password: config.rpc_password.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn rpc_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> AppResult<T> {
        let value = self.call(RpcRequest::with_params(method, params)).await?;
        serde_json::from_value(value).map_err(|e| {
            AppError::BlockchainError(format!("Failed to parse {} response: {}", method, e))
        })
    }

    async fn list_unspent(&self, method: &'static str) -> AppResult<Vec<UnspentOutput>> {
        // minconf 0 so pending outputs are visible to the caller
        let entries: Vec<ListUnspentEntry> = self.rpc_call(method, serde_json::json!([0])).await?;
        Ok(entries.into_iter().map(UnspentOutput::from).collect())
    }

    async fn blockchain_info(&self) -> AppResult<BlockchainInfo> {
        self.rpc_call("getblockchaininfo", serde_json::json!([])).await
    }
}

#[async_trait]
impl RpcTransport for RpcNodeClient {
    async fn call(&self, request: RpcRequest) -> AppResult<serde_json::Value> {
        let body = JsonRpcRequest {
            jsonrpc: "1.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: request.method,
            params: &request.params,
        };

        let mut request_builder = self.http.post(&self.rpc_url);

        // Add basic auth if configured
        if let (Some(user), Some(pass)) = (&self.rpc_user, &self.rpc_password) {
            request_builder = request_builder.basic_auth(user, Some(pass));
        }

        let response = request_builder
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::BlockchainError(format!("RPC request failed: {}", e)))?;

        // The node answers errors with a non-2xx status but still a JSON body
        let rpc_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| AppError::BlockchainError(format!("Failed to parse RPC response: {}", e)))?;

        if let Some(error) = rpc_response.error {
            return Err(AppError::BlockchainError(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        rpc_response
            .result
            .ok_or_else(|| AppError::BlockchainError("Empty RPC response".to_string()))
    }
}

#[async_trait]
impl NodeConnection for RpcNodeClient {
    async fn submit_send(
        &self,
        from_address: &str,
        recipients: &[Recipient],
        fee: Decimal,
    ) -> AppResult<OperationId> {
        let params = z_sendmany_params(from_address, recipients, fee);
        let opid: String = self.rpc_call("z_sendmany", params).await?;

        tracing::info!("z_sendmany from {} accepted as {}", from_address, opid);
        Ok(opid)
    }

    async fn confirmed_balances(&self) -> AppResult<HashMap<String, Decimal>> {
        let outputs = self.unspent_outputs().await?;
        Ok(confirmed_balances_from(&outputs))
    }

    async fn unspent_outputs(&self) -> AppResult<Vec<UnspentOutput>> {
        let mut outputs = self.list_unspent("listunspent").await?;
        outputs.extend(self.list_unspent("z_listunspent").await?);

        tracing::debug!("Node reports {} unspent outputs", outputs.len());
        Ok(outputs)
    }

    async fn block_height(&self) -> AppResult<u64> {
        // Try getblockcount first
        if let Ok(count) = self.rpc_call::<u64>("getblockcount", serde_json::json!([])).await {
            return Ok(count);
        }

        Ok(self.blockchain_info().await?.blocks)
    }

    async fn is_syncing(&self) -> AppResult<bool> {
        let info = self.blockchain_info().await?;
        Ok(info.verificationprogress < SYNCED_PROGRESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(address: &str, amount: Decimal, confirmations: u32) -> UnspentOutput {
        UnspentOutput {
            address: address.to_string(),
            txid: "ab".repeat(32),
            amount,
            confirmations,
            spendable: true,
        }
    }

    #[test]
    fn test_confirmed_balances_skip_pending_outputs() {
        let outputs = vec![
            output("zcA", Decimal::new(5, 1), 3),
            output("zcA", Decimal::new(25, 2), 1),
            output("zcA", Decimal::new(1, 0), 0),
            output("t1B", Decimal::new(2, 0), 0),
        ];

        let balances = confirmed_balances_from(&outputs);

        assert_eq!(balances.get("zcA"), Some(&Decimal::new(75, 2)));
        assert!(!balances.contains_key("t1B"));
    }

    #[test]
    fn test_z_sendmany_params_layout() {
        let mut shielded = Recipient::new("zsDest", Decimal::new(123456789123, 11));
        shielded.memo = Some("migration".to_string());
        let mut transparent = Recipient::new("t1Dest", Decimal::new(5, 1));
        transparent.memo = Some("ignored".to_string());

        let params = z_sendmany_params("zcSource", &[shielded, transparent], Decimal::new(1, 4));

        assert_eq!(params[0], "zcSource");
        assert_eq!(params[1][0]["amount"], "1.23456789");
        assert_eq!(params[1][0]["memo"], "migration");
        assert!(params[1][1].get("memo").is_none());
        assert_eq!(params[2], 1);
        assert!((params[3].as_f64().unwrap() - 0.0001).abs() < 1e-12);
    }

    #[test]
    fn test_unspent_entry_conversion() {
        let entry: ListUnspentEntry = serde_json::from_value(serde_json::json!({
            "address": "zcA",
            "txid": "ff",
            "amount": 0.12345678,
            "confirmations": 0,
            "spendable": true
        }))
        .unwrap();

        let output = UnspentOutput::from(entry);
        assert_eq!(output.amount, Decimal::new(12345678, 8));
        assert!(output.is_pending_spendable());
    }
}
