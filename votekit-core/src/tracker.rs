//! State machine driving one contract call from simulation to a terminal outcome.
//!
//! ```text
//! Idle -> Prepared -> Submitted -> Confirmed
//!                              \-> Failed (reverted | dropped | confirmation timeout)
//! ```

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{
    call_builder::CallDescriptor,
    chain::{ChainClient, ChainError, ReceiptStatus, TxHandle},
    error::{VoteKitError, VoteKitResult},
};

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Bounds of the receipt polling loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationPolicy {
    /// Maximum number of receipt lookups before giving up with `ConfirmationTimeout`.
    pub max_polls: u32,
    /// Delay before the second lookup; doubles afterwards.
    #[serde(rename = "min_delay_ms", with = "duration_ms")]
    pub min_delay: Duration,
    /// Upper bound of the delay between two lookups.
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            max_polls: 20,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(12),
        }
    }
}

impl ConfirmationPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        // the first lookup is not a retry
        let retries = self.max_polls.max(1) - 1;
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(retries as usize)
    }
}

/// Why a submitted transaction ended in [`TrackerState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Mined, but the contract reverted.
    Reverted,
    /// The node no longer knows the transaction.
    Dropped,
    /// No receipt was observed within the polling bound. The transaction may still be mined.
    ConfirmationTimeout {
        /// Receipt lookups performed.
        polls: u32,
    },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reverted => write!(f, "reverted"),
            Self::Dropped => write!(f, "dropped"),
            Self::ConfirmationTimeout { polls } => {
                write!(f, "confirmation timeout after {polls} polls")
            }
        }
    }
}

/// State of a [`TransactionTracker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerState {
    /// Nothing happened yet.
    Idle,
    /// The call was simulated successfully.
    Prepared,
    /// The transaction was broadcast.
    Submitted(TxHandle),
    /// The transaction was mined and succeeded. Terminal.
    Confirmed(TxHandle),
    /// The transaction did not succeed. Terminal.
    Failed {
        /// The transaction that failed.
        tx: TxHandle,
        /// How it failed.
        reason: FailureReason,
    },
}

impl TrackerState {
    /// Whether no further transition can happen.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed(_) | Self::Failed { .. })
    }

    /// The transaction handle, once submitted.
    #[must_use]
    pub const fn tx(&self) -> Option<TxHandle> {
        match self {
            Self::Idle | Self::Prepared => None,
            Self::Submitted(tx) | Self::Confirmed(tx) | Self::Failed { tx, .. } => Some(*tx),
        }
    }

    /// Short name used in logs and `InvalidState` errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Prepared => "prepared",
            Self::Submitted(_) => "submitted",
            Self::Confirmed(_) => "confirmed",
            Self::Failed { .. } => "failed",
        }
    }

    const fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Prepared)
                | (Self::Prepared, Self::Submitted(_))
                | (Self::Submitted(_), Self::Confirmed(_) | Self::Failed { .. })
        )
    }

    /// The submission status exposed to callers.
    #[must_use]
    pub const fn status(&self) -> SubmissionStatus {
        match self {
            Self::Idle | Self::Prepared => SubmissionStatus::Pending,
            Self::Submitted(tx) => SubmissionStatus::Submitted(*tx),
            Self::Confirmed(tx) => SubmissionStatus::Confirmed(*tx),
            Self::Failed { tx, reason } => SubmissionStatus::Failed {
                tx: *tx,
                reason: *reason,
            },
        }
    }

    /// Converts a terminal state into the outcome of the submission.
    ///
    /// # Errors
    /// - `ConfirmationTimeout` if confirmation was not observed in time (status unknown).
    /// - `TransactionFailed` if the transaction reverted or was dropped.
    /// - `InvalidState` if the state is not terminal.
    pub fn into_result(self) -> VoteKitResult<TxHandle> {
        match self {
            Self::Confirmed(tx) => Ok(tx),
            Self::Failed {
                tx,
                reason: FailureReason::ConfirmationTimeout { polls },
            } => Err(VoteKitError::ConfirmationTimeout {
                tx_hash: tx.to_string(),
                polls,
            }),
            Self::Failed { tx, reason } => Err(VoteKitError::TransactionFailed {
                tx_hash: tx.to_string(),
                reason: reason.to_string(),
            }),
            other => Err(VoteKitError::InvalidState {
                expected: "confirmed or failed".to_string(),
                actual: other.name().to_string(),
            }),
        }
    }
}

/// Status of a submission record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    /// Accepted by the pipeline; not yet broadcast.
    Pending,
    /// Broadcast, waiting for a receipt.
    Submitted(TxHandle),
    /// Mined and successful.
    Confirmed(TxHandle),
    /// Reverted, dropped, or not confirmed in time.
    Failed {
        /// The transaction that failed.
        tx: TxHandle,
        /// How it failed.
        reason: FailureReason,
    },
}

impl SubmissionStatus {
    /// The transaction handle, once submitted.
    #[must_use]
    pub const fn tx(&self) -> Option<TxHandle> {
        match self {
            Self::Pending => None,
            Self::Submitted(tx) | Self::Confirmed(tx) | Self::Failed { tx, .. } => Some(*tx),
        }
    }

    /// Link to the transaction on a block explorer rooted at `base`, e.g.
    /// `https://sepolia.etherscan.io`.
    #[must_use]
    pub fn explorer_url(&self, base: &str) -> Option<String> {
        self.tx()
            .map(|tx| format!("{}/tx/{tx}", base.trim_end_matches('/')))
    }
}

#[derive(Debug)]
enum PollError {
    Pending,
    Dropped,
    Rpc(String),
}

/// Drives one [`CallDescriptor`] through simulation, dispatch and confirmation.
///
/// Every transition is published on a [`watch`] channel; see [`TransactionTracker::subscribe`].
#[derive(Debug)]
pub struct TransactionTracker<C> {
    chain: Arc<C>,
    policy: ConfirmationPolicy,
    state: watch::Sender<TrackerState>,
    call: Option<CallDescriptor>,
}

impl<C: ChainClient> TransactionTracker<C> {
    /// A tracker in the `Idle` state.
    #[must_use]
    pub fn new(chain: Arc<C>, policy: ConfirmationPolicy) -> Self {
        let (state, _) = watch::channel(TrackerState::Idle);
        Self {
            chain,
            policy,
            state,
            call: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TrackerState {
        self.state.borrow().clone()
    }

    /// Receives every subsequent state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TrackerState> {
        self.state.subscribe()
    }

    fn transition(&self, next: TrackerState) -> VoteKitResult<()> {
        let current = self.state();
        if !current.can_transition_to(&next) {
            return Err(VoteKitError::InvalidState {
                expected: format!("a state leading to {}", next.name()),
                actual: current.name().to_string(),
            });
        }
        match next.tx() {
            Some(tx) => log::info!("transaction {}: {} -> {}", tx, current.name(), next.name()),
            None => log::info!("transaction: {} -> {}", current.name(), next.name()),
        }
        self.state.send_replace(next);
        Ok(())
    }

    fn chain_error(&self, err: ChainError) -> VoteKitError {
        match err {
            ChainError::Revert(reason) => VoteKitError::SimulationError { reason },
            other => VoteKitError::Chain {
                endpoint: self.chain.endpoint(),
                error: other.to_string(),
            },
        }
    }

    /// Simulates `call`. `Idle -> Prepared`.
    ///
    /// # Errors
    /// - `SimulationError` if the node predicts a revert (e.g. the nullifier was already used).
    /// - `Chain` if the node cannot be reached.
    /// - `InvalidState` if the tracker is not idle.
    pub async fn prepare(&mut self, call: CallDescriptor) -> VoteKitResult<()> {
        let current = self.state();
        if current != TrackerState::Idle {
            return Err(VoteKitError::InvalidState {
                expected: TrackerState::Idle.name().to_string(),
                actual: current.name().to_string(),
            });
        }

        log::debug!("simulating call for {}", call.fingerprint());
        self.chain
            .simulate(&call)
            .await
            .map_err(|err| self.chain_error(err))?;
        self.call = Some(call);
        self.transition(TrackerState::Prepared)
    }

    /// Broadcasts the prepared call. `Prepared -> Submitted`.
    ///
    /// # Errors
    /// - `SimulationError` if the node refuses the transaction as reverting.
    /// - `Chain` if the node cannot be reached.
    /// - `InvalidState` if the tracker is not prepared.
    pub async fn dispatch(&mut self) -> VoteKitResult<TxHandle> {
        let current = self.state();
        let (TrackerState::Prepared, Some(call)) = (&current, &self.call) else {
            return Err(VoteKitError::InvalidState {
                expected: TrackerState::Prepared.name().to_string(),
                actual: current.name().to_string(),
            });
        };

        let tx = self
            .chain
            .send(call)
            .await
            .map_err(|err| self.chain_error(err))?;
        self.transition(TrackerState::Submitted(tx))?;
        Ok(tx)
    }

    /// Polls the receipt of the submitted transaction until it is mined, dropped, or the polling
    /// bound is reached, and returns the terminal state. Any other state is returned unchanged.
    pub async fn track(self) -> TrackerState {
        let TrackerState::Submitted(tx) = self.state() else {
            return self.state();
        };

        let polls = AtomicU32::new(0);
        let outcome = (|| async {
            polls.fetch_add(1, Ordering::Relaxed);
            match self.chain.receipt(&tx).await {
                Ok(Some(status)) => Ok(status),
                Ok(None) => Err(PollError::Pending),
                Err(ChainError::Dropped) => Err(PollError::Dropped),
                Err(err) => Err(PollError::Rpc(err.to_string())),
            }
        })
        .retry(self.policy.backoff())
        .when(|err| !matches!(err, PollError::Dropped))
        .notify(|err: &PollError, delay: Duration| {
            if let PollError::Rpc(error) = err {
                log::debug!("receipt lookup for {tx} failed, retrying in {delay:?}: {error}");
            }
        })
        .await;

        let next = match outcome {
            Ok(ReceiptStatus::Success) => TrackerState::Confirmed(tx),
            Ok(ReceiptStatus::Reverted) => TrackerState::Failed {
                tx,
                reason: FailureReason::Reverted,
            },
            Err(PollError::Dropped) => TrackerState::Failed {
                tx,
                reason: FailureReason::Dropped,
            },
            Err(PollError::Pending | PollError::Rpc(_)) => {
                let polls = polls.load(Ordering::Relaxed);
                log::warn!("no receipt for {tx} after {polls} polls, status unknown");
                TrackerState::Failed {
                    tx,
                    reason: FailureReason::ConfirmationTimeout { polls },
                }
            }
        };

        if let Err(err) = self.transition(next) {
            log::warn!("tracker for {tx} could not finish: {err}");
        }
        self.state()
    }
}
