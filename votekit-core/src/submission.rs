use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::watch;

use crate::{
    chain::TxHandle,
    error::{VoteKitError, VoteKitResult},
    tracker::{SubmissionStatus, TrackerState},
    u256::U256Wrapper,
};

/// Snapshot of a submission record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Nullifier hash of the proof being submitted.
    pub fingerprint: U256Wrapper,
    /// Where the submission stands.
    pub status: SubmissionStatus,
}

impl Submission {
    /// The transaction handle, once submitted.
    #[must_use]
    pub const fn tx_handle(&self) -> Option<TxHandle> {
        self.status.tx()
    }
}

type Registry = HashMap<U256Wrapper, Option<watch::Receiver<TrackerState>>>;

/// Fingerprints of the submissions currently in flight.
///
/// Shared by handle between the pipeline and its background trackers. A fingerprint is reserved
/// when a submission starts and released when its [`SubmissionGuard`] drops, which happens on a
/// terminal state or when the submission fails before reaching the chain.
#[derive(Debug, Clone, Default)]
pub struct ActiveSubmissions {
    inner: Arc<Mutex<Registry>>,
}

impl ActiveSubmissions {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves `fingerprint` for a new submission.
    ///
    /// # Errors
    /// `AlreadyInFlight` if a submission with the same fingerprint has not reached a terminal
    /// state.
    pub fn reserve(&self, fingerprint: U256Wrapper) -> VoteKitResult<SubmissionGuard> {
        let mut registry = self.registry();
        if registry.contains_key(&fingerprint) {
            return Err(VoteKitError::AlreadyInFlight {
                fingerprint: fingerprint.to_hex_string(),
            });
        }
        registry.insert(fingerprint, None);
        drop(registry);

        Ok(SubmissionGuard {
            fingerprint,
            active: self.clone(),
        })
    }

    /// Whether `fingerprint` is in flight.
    #[must_use]
    pub fn contains(&self, fingerprint: U256Wrapper) -> bool {
        self.registry().contains_key(&fingerprint)
    }

    /// Status of the in-flight submission for `fingerprint`.
    #[must_use]
    pub fn status(&self, fingerprint: U256Wrapper) -> Option<SubmissionStatus> {
        self.registry().get(&fingerprint).map(|updates| {
            updates
                .as_ref()
                .map_or(SubmissionStatus::Pending, |rx| rx.borrow().status())
        })
    }

    /// Number of submissions in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry().len()
    }

    /// Whether nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry().is_empty()
    }
}

/// Reservation of a fingerprint in [`ActiveSubmissions`]; released on drop.
#[derive(Debug)]
pub struct SubmissionGuard {
    fingerprint: U256Wrapper,
    active: ActiveSubmissions,
}

impl SubmissionGuard {
    /// The reserved fingerprint.
    #[must_use]
    pub const fn fingerprint(&self) -> U256Wrapper {
        self.fingerprint
    }

    /// Publishes the tracker's state for status queries.
    pub fn attach(&self, updates: watch::Receiver<TrackerState>) {
        if let Some(slot) = self.active.registry().get_mut(&self.fingerprint) {
            *slot = Some(updates);
        }
    }
}

impl Drop for SubmissionGuard {
    fn drop(&mut self) {
        self.active.registry().remove(&self.fingerprint);
        log::debug!("released submission {}", self.fingerprint);
    }
}

/// Caller side of a submission handed to the background tracker.
///
/// Dropping the handle only detaches the caller; tracking continues.
#[derive(Debug, Clone)]
pub struct SubmissionHandle {
    fingerprint: U256Wrapper,
    updates: watch::Receiver<TrackerState>,
}

impl SubmissionHandle {
    pub(crate) const fn new(
        fingerprint: U256Wrapper,
        updates: watch::Receiver<TrackerState>,
    ) -> Self {
        Self {
            fingerprint,
            updates,
        }
    }

    /// Nullifier hash identifying the submission.
    #[must_use]
    pub const fn fingerprint(&self) -> U256Wrapper {
        self.fingerprint
    }

    /// Latest tracker state.
    #[must_use]
    pub fn state(&self) -> TrackerState {
        self.updates.borrow().clone()
    }

    /// Snapshot of the submission record.
    #[must_use]
    pub fn submission(&self) -> Submission {
        Submission {
            fingerprint: self.fingerprint,
            status: self.updates.borrow().status(),
        }
    }

    /// Waits for the next state change. `None` once tracking has ended.
    pub async fn changed(&mut self) -> Option<TrackerState> {
        self.updates.changed().await.ok()?;
        Some(self.updates.borrow_and_update().clone())
    }

    /// Waits for a terminal state.
    ///
    /// # Errors
    /// - `ConfirmationTimeout` if confirmation was not observed in time (status unknown).
    /// - `TransactionFailed` if the transaction reverted or was dropped.
    pub async fn wait(mut self) -> VoteKitResult<TxHandle> {
        let terminal = self
            .updates
            .wait_for(TrackerState::is_terminal)
            .await
            .map(|state| state.clone());
        let state = match terminal {
            Ok(state) => state,
            Err(_) => self.updates.borrow().clone(),
        };
        state.into_result()
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{B256, U256};

    use super::*;

    fn fingerprint(value: u64) -> U256Wrapper {
        U256Wrapper(U256::from(value))
    }

    #[test]
    fn test_reserve_is_exclusive_until_released() {
        let active = ActiveSubmissions::default();
        let guard = active.reserve(fingerprint(456)).unwrap();
        assert!(active.contains(fingerprint(456)));
        assert_eq!(
            active.reserve(fingerprint(456)).unwrap_err(),
            VoteKitError::AlreadyInFlight {
                fingerprint: fingerprint(456).to_hex_string()
            }
        );
        // other fingerprints are independent
        let other = active.reserve(fingerprint(457)).unwrap();
        assert_eq!(active.len(), 2);

        drop(guard);
        drop(other);
        assert!(active.is_empty());
        assert!(active.reserve(fingerprint(456)).is_ok());
    }

    #[test]
    fn test_status_follows_attached_tracker() {
        let active = ActiveSubmissions::default();
        let guard = active.reserve(fingerprint(1)).unwrap();
        assert_eq!(active.status(fingerprint(1)), Some(SubmissionStatus::Pending));

        let tx = TxHandle(B256::repeat_byte(7));
        let (tx_state, rx_state) = watch::channel(TrackerState::Submitted(tx));
        guard.attach(rx_state);
        assert_eq!(
            active.status(fingerprint(1)),
            Some(SubmissionStatus::Submitted(tx))
        );

        tx_state.send_replace(TrackerState::Confirmed(tx));
        assert_eq!(
            active.status(fingerprint(1)),
            Some(SubmissionStatus::Confirmed(tx))
        );
        drop(guard);
        assert_eq!(active.status(fingerprint(1)), None);
    }

    #[tokio::test]
    async fn test_handle_wait_resolves_terminal_state() {
        let tx = TxHandle(B256::repeat_byte(9));
        let (sender, updates) = watch::channel(TrackerState::Submitted(tx));
        let handle = SubmissionHandle::new(fingerprint(3), updates);
        assert_eq!(handle.submission().tx_handle(), Some(tx));

        let waiter = tokio::spawn(handle.clone().wait());
        sender.send_replace(TrackerState::Confirmed(tx));
        assert_eq!(waiter.await.unwrap(), Ok(tx));
        assert_eq!(handle.state(), TrackerState::Confirmed(tx));
    }

    #[tokio::test]
    async fn test_handle_wait_without_terminal_state() {
        let (sender, updates) = watch::channel(TrackerState::Prepared);
        let handle = SubmissionHandle::new(fingerprint(4), updates);
        drop(sender);
        assert!(matches!(
            handle.wait().await,
            Err(VoteKitError::InvalidState { .. })
        ));
    }
}
