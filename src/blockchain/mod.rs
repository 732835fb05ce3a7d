pub mod address;
pub mod batch;
pub mod client;
#[cfg(test)]
pub mod mock;
pub mod traits;

pub use batch::allocate_addresses;
pub use client::RpcNodeClient;
pub use traits::{NodeConnection, OperationId, Recipient};
