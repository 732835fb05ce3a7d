use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::AppResult;

/// Opaque handle returned by an asynchronous send, resolved later by a watcher
pub type OperationId = String;

/// A single JSON-RPC request, independent of any particular transport
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub method: &'static str,
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(method: &'static str) -> Self {
        Self {
            method,
            params: serde_json::Value::Array(Vec::new()),
        }
    }

    pub fn with_params(method: &'static str, params: serde_json::Value) -> Self {
        Self { method, params }
    }
}

/// One output of a send
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub address: String,
    pub amount: Decimal,
    pub memo: Option<String>,
}

impl Recipient {
    pub fn new(address: impl Into<String>, amount: Decimal) -> Self {
        Self {
            address: address.into(),
            amount,
            memo: None,
        }
    }
}

/// Unspent output as reported by the node, transparent or shielded
#[derive(Debug, Clone, PartialEq)]
pub struct UnspentOutput {
    pub address: String,
    pub txid: String,
    pub amount: Decimal,
    pub confirmations: u32,
    pub spendable: bool,
}

impl UnspentOutput {
    /// Spendable but not yet mined
    pub fn is_pending_spendable(&self) -> bool {
        self.confirmations == 0 && self.spendable
    }
}

/// Raw request/response channel to the node
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, request: RpcRequest) -> AppResult<serde_json::Value>;
}

/// Node operations the migration engine depends on.
/// Implement this trait to drive the engine against a different backend.
#[async_trait]
pub trait NodeConnection: RpcTransport {
    /// Submit a send; returns once the node has accepted it for processing
    async fn submit_send(
        &self,
        from_address: &str,
        recipients: &[Recipient],
        fee: Decimal,
    ) -> AppResult<OperationId>;

    /// Per-address balance of mined outputs
    async fn confirmed_balances(&self) -> AppResult<HashMap<String, Decimal>>;

    /// All unspent outputs, including zero-confirmation ones
    async fn unspent_outputs(&self) -> AppResult<Vec<UnspentOutput>>;

    async fn block_height(&self) -> AppResult<u64>;

    async fn is_syncing(&self) -> AppResult<bool>;
}
