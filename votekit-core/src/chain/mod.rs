//! The blockchain node as seen by the transaction tracker.

use std::future::Future;

use alloy_primitives::B256;
use thiserror::Error;

use crate::call_builder::CallDescriptor;

mod memory;
pub use memory::{InMemoryChain, MiningMode};

/// Opaque handle of a submitted transaction (its hash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHandle(pub B256);

impl std::fmt::Display for TxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final status of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    /// Mined and executed successfully.
    Success,
    /// Mined but reverted.
    Reverted,
}

/// Failures reported by a [`ChainClient`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The node predicts (or observed) a revert.
    #[error("execution reverted: {0}")]
    Revert(String),
    /// The transaction is no longer known to the node and will not be mined.
    #[error("transaction dropped")]
    Dropped,
    /// Transport or node failure.
    #[error("rpc error: {0}")]
    Rpc(String),
}

/// Port to an EVM node.
pub trait ChainClient: Send + Sync + 'static {
    /// Executes `call` without committing it (`eth_call`); a revert means the real transaction
    /// would revert too.
    fn simulate(
        &self,
        call: &CallDescriptor,
    ) -> impl Future<Output = Result<(), ChainError>> + Send;

    /// Signs and broadcasts `call`.
    fn send(
        &self,
        call: &CallDescriptor,
    ) -> impl Future<Output = Result<TxHandle, ChainError>> + Send;

    /// Looks up the receipt of `tx`; `Ok(None)` while still pending.
    fn receipt(
        &self,
        tx: &TxHandle,
    ) -> impl Future<Output = Result<Option<ReceiptStatus>, ChainError>> + Send;

    /// Endpoint name used in error reports.
    fn endpoint(&self) -> String {
        "json-rpc".to_string()
    }
}
