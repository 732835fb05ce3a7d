use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use super::traits::{RpcRequest, RpcTransport};
use crate::error::{AppError, AppResult};

/// Fan-out/fan-in over a transport: one request per key, one completion
/// callback once every key has a response.
pub struct BatchJoin<'a, T: ?Sized> {
    transport: &'a T,
}

impl<'a, T: RpcTransport + ?Sized> BatchJoin<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Issue one request per distinct key and hand the key -> response map to
    /// `on_complete`. Failed requests keep their slot as an `Err` entry.
    pub async fn run<K, B, C, O>(
        &self,
        keys: impl IntoIterator<Item = K>,
        build_request: B,
        on_complete: C,
    ) -> O
    where
        K: Eq + Hash,
        B: Fn(&K) -> RpcRequest,
        C: FnOnce(HashMap<K, AppResult<serde_json::Value>>) -> O,
    {
        let keys: HashSet<K> = keys.into_iter().collect();
        let expected = keys.len();
        if expected == 0 {
            return on_complete(HashMap::new());
        }

        let mut pending: FuturesUnordered<_> = keys
            .into_iter()
            .map(|key| {
                let response = self.transport.call(build_request(&key));
                async move { (key, response.await) }
            })
            .collect();

        let mut responses = HashMap::with_capacity(expected);
        while let Some((key, response)) = pending.next().await {
            responses.insert(key, response);
            if responses.len() == expected {
                break;
            }
        }

        on_complete(responses)
    }
}

/// Allocate `count` fresh transparent addresses, one `getnewaddress` per slot
pub async fn allocate_addresses<T: RpcTransport + ?Sized>(
    transport: &T,
    count: usize,
) -> AppResult<Vec<String>> {
    BatchJoin::new(transport)
        .run(
            0..count,
            |_| RpcRequest::new("getnewaddress"),
            |mut responses| {
                let mut addresses = Vec::with_capacity(count);
                for slot in 0..count {
                    match responses.remove(&slot) {
                        Some(Ok(serde_json::Value::String(address))) => addresses.push(address),
                        Some(Ok(other)) => {
                            return Err(AppError::BlockchainError(format!(
                                "Unexpected getnewaddress response: {}",
                                other
                            )))
                        }
                        Some(Err(e)) => return Err(e),
                        None => {
                            return Err(AppError::InternalError(format!(
                                "No address allocated for slot {}",
                                slot
                            )))
                        }
                    }
                }
                Ok(addresses)
            },
        )
        .await
}
