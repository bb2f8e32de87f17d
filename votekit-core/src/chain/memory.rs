use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use alloy_primitives::{keccak256, U256};

use super::{ChainClient, ChainError, ReceiptStatus, TxHandle};
use crate::call_builder::CallDescriptor;

/// How [`InMemoryChain`] mines sent transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningMode {
    /// Mined on the first receipt lookup.
    Immediate,
    /// Mined once the receipt has been polled this many times without result.
    AfterPolls(u32),
    /// Only mined by [`InMemoryChain::mine_pending`].
    Manual,
    /// Forgotten by the node; receipt lookups report the transaction as dropped.
    Drop,
}

#[derive(Debug, Clone, Copy)]
struct PendingTx {
    nullifier_hash: U256,
    polls: u32,
}

#[derive(Debug)]
struct ChainState {
    mining: MiningMode,
    spent: HashSet<U256>,
    pending: HashMap<TxHandle, PendingTx>,
    mined: HashMap<TxHandle, ReceiptStatus>,
    nonce: u64,
    simulate_calls: usize,
    sent: Vec<CallDescriptor>,
    receipt_calls: usize,
}

impl ChainState {
    fn mine(&mut self, tx: TxHandle) -> Option<ReceiptStatus> {
        let pending = self.pending.remove(&tx)?;
        // the contract consumes the nullifier; a second inclusion reverts
        let status = if self.spent.insert(pending.nullifier_hash) {
            ReceiptStatus::Success
        } else {
            ReceiptStatus::Reverted
        };
        self.mined.insert(tx, status);
        Some(status)
    }
}

/// A [`ChainClient`] holding a single voting contract in memory.
///
/// Models the contract's nullifier registry: simulating a call whose nullifier hash was already
/// consumed reverts with `InvalidNullifier`. Counts every call it receives so tests can assert
/// which stages of a submission reached the chain.
#[derive(Debug)]
pub struct InMemoryChain {
    state: Mutex<ChainState>,
}

impl InMemoryChain {
    /// A chain that mines transactions on their first receipt lookup.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mining(MiningMode::Immediate)
    }

    /// A chain using `mining`.
    #[must_use]
    pub fn with_mining(mining: MiningMode) -> Self {
        Self {
            state: Mutex::new(ChainState {
                mining,
                spent: HashSet::new(),
                pending: HashMap::new(),
                mined: HashMap::new(),
                nonce: 0,
                simulate_calls: 0,
                sent: Vec::new(),
                receipt_calls: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Changes how subsequently polled transactions are mined.
    pub fn set_mining(&self, mining: MiningMode) {
        self.state().mining = mining;
    }

    /// Mines every pending transaction, returning how many were mined.
    pub fn mine_pending(&self) -> usize {
        let mut state = self.state();
        let pending: Vec<TxHandle> = state.pending.keys().copied().collect();
        pending
            .into_iter()
            .filter_map(|tx| state.mine(tx))
            .count()
    }

    /// Marks `nullifier_hash` as consumed, as if a vote had already been cast with it.
    pub fn spend(&self, nullifier_hash: U256) {
        self.state().spent.insert(nullifier_hash);
    }

    /// Whether `nullifier_hash` has been consumed.
    #[must_use]
    pub fn is_spent(&self, nullifier_hash: U256) -> bool {
        self.state().spent.contains(&nullifier_hash)
    }

    /// Number of `simulate` calls received.
    #[must_use]
    pub fn simulate_calls(&self) -> usize {
        self.state().simulate_calls
    }

    /// Number of `send` calls received.
    #[must_use]
    pub fn send_calls(&self) -> usize {
        self.state().sent.len()
    }

    /// Every call broadcast so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<CallDescriptor> {
        self.state().sent.clone()
    }

    /// Number of `receipt` calls received.
    #[must_use]
    pub fn receipt_calls(&self) -> usize {
        self.state().receipt_calls
    }
}

impl Default for InMemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainClient for InMemoryChain {
    async fn simulate(&self, call: &CallDescriptor) -> Result<(), ChainError> {
        let mut state = self.state();
        state.simulate_calls += 1;
        if state.spent.contains(&call.nullifier_hash) {
            return Err(ChainError::Revert("InvalidNullifier".to_string()));
        }
        Ok(())
    }

    async fn send(&self, call: &CallDescriptor) -> Result<TxHandle, ChainError> {
        let mut state = self.state();
        state.sent.push(call.clone());
        state.nonce += 1;

        let mut preimage = state.nonce.to_be_bytes().to_vec();
        preimage.extend_from_slice(&call.calldata);
        let tx = TxHandle(keccak256(preimage));

        state.pending.insert(
            tx,
            PendingTx {
                nullifier_hash: call.nullifier_hash,
                polls: 0,
            },
        );
        log::debug!("in-memory chain accepted {tx}");
        Ok(tx)
    }

    async fn receipt(&self, tx: &TxHandle) -> Result<Option<ReceiptStatus>, ChainError> {
        let mut state = self.state();
        state.receipt_calls += 1;
        if let Some(status) = state.mined.get(tx) {
            return Ok(Some(*status));
        }

        let mining = state.mining;
        let Some(pending) = state.pending.get_mut(tx) else {
            return Err(ChainError::Dropped);
        };
        pending.polls += 1;
        let polls = pending.polls;

        match mining {
            MiningMode::Immediate => Ok(state.mine(*tx)),
            MiningMode::AfterPolls(required) if polls > required => Ok(state.mine(*tx)),
            MiningMode::AfterPolls(_) | MiningMode::Manual => Ok(None),
            MiningMode::Drop => {
                state.pending.remove(tx);
                Err(ChainError::Dropped)
            }
        }
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}
