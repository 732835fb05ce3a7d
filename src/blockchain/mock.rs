use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

use super::traits::{NodeConnection, OperationId, Recipient, RpcRequest, RpcTransport, UnspentOutput};
use crate::error::{AppError, AppResult};

/// A send the mock node accepted
#[derive(Debug, Clone, PartialEq)]
pub struct SentTx {
    pub from_address: String,
    pub recipients: Vec<Recipient>,
    pub fee: Decimal,
}

#[derive(Default)]
struct MockState {
    height: u64,
    syncing: bool,
    balances: HashMap<String, Decimal>,
    outputs: Vec<UnspentOutput>,
    sends: Vec<SentTx>,
    reject_sends: bool,
    fail_address_allocation: bool,
    next_address: usize,
}

/// In-memory node whose chain state is driven by the test
pub struct MockNode {
    state: Mutex<MockState>,
}

impl MockNode {
    pub fn new(height: u64) -> Self {
        Self {
            state: Mutex::new(MockState {
                height,
                ..MockState::default()
            }),
        }
    }

    pub fn set_height(&self, height: u64) {
        self.state.lock().unwrap().height = height;
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.state.lock().unwrap().syncing = syncing;
    }

    pub fn set_balance(&self, address: &str, amount: Decimal) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(address.to_string(), amount);
    }

    pub fn clear_balance(&self, address: &str) {
        self.state.lock().unwrap().balances.remove(address);
    }

    /// Add a spendable zero-confirmation output at `address`
    pub fn add_unconfirmed(&self, address: &str, amount: Decimal) {
        self.state.lock().unwrap().outputs.push(UnspentOutput {
            address: address.to_string(),
            txid: format!("pending-{}", address),
            amount,
            confirmations: 0,
            spendable: true,
        });
    }

    pub fn clear_outputs(&self) {
        self.state.lock().unwrap().outputs.clear();
    }

    pub fn reject_sends(&self, reject: bool) {
        self.state.lock().unwrap().reject_sends = reject;
    }

    pub fn fail_address_allocation(&self, fail: bool) {
        self.state.lock().unwrap().fail_address_allocation = fail;
    }

    pub fn sends(&self) -> Vec<SentTx> {
        self.state.lock().unwrap().sends.clone()
    }
}

#[async_trait]
impl RpcTransport for MockNode {
    async fn call(&self, request: RpcRequest) -> AppResult<serde_json::Value> {
        let mut state = self.state.lock().unwrap();
        match request.method {
            "getnewaddress" if state.fail_address_allocation => Err(AppError::BlockchainError(
                "RPC error -12: Keypool ran out".to_string(),
            )),
            "getnewaddress" => {
                state.next_address += 1;
                Ok(serde_json::json!(format!("tmIntermediate{}", state.next_address)))
            }
            other => Err(AppError::BlockchainError(format!(
                "RPC error -32601: Method not found: {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl NodeConnection for MockNode {
    async fn submit_send(
        &self,
        from_address: &str,
        recipients: &[Recipient],
        fee: Decimal,
    ) -> AppResult<OperationId> {
        let mut state = self.state.lock().unwrap();
        if state.reject_sends {
            return Err(AppError::BlockchainError(
                "RPC error -6: Insufficient funds".to_string(),
            ));
        }

        state.sends.push(SentTx {
            from_address: from_address.to_string(),
            recipients: recipients.to_vec(),
            fee,
        });
        Ok(format!("opid-{}", state.sends.len()))
    }

    async fn confirmed_balances(&self) -> AppResult<HashMap<String, Decimal>> {
        Ok(self.state.lock().unwrap().balances.clone())
    }

    async fn unspent_outputs(&self) -> AppResult<Vec<UnspentOutput>> {
        Ok(self.state.lock().unwrap().outputs.clone())
    }

    async fn block_height(&self) -> AppResult<u64> {
        Ok(self.state.lock().unwrap().height)
    }

    async fn is_syncing(&self) -> AppResult<bool> {
        Ok(self.state.lock().unwrap().syncing)
    }
}
