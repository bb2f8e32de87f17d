use thiserror::Error;

/// Result alias used across `VoteKit`.
pub type VoteKitResult<T, E = VoteKitError> = std::result::Result<T, E>;

/// Error outputs from `VoteKit`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum VoteKitError {
    /// A field of the proof bundle is not a syntactically valid ABI value.
    #[error("malformed_field: {field}: {reason}")]
    MalformedField {
        /// Name of the offending field (e.g. `merkle_root`).
        field: String,
        /// Why decoding failed.
        reason: String,
    },
    /// The verification service rejected the proof (invalid proof, wrong action/signal, ...).
    #[error("verification_rejected: {reason}")]
    VerificationRejected {
        /// Rejection reason as reported by the verifier.
        reason: String,
    },
    /// A submission for the same nullifier hash is already prepared or submitted.
    #[error("already_in_flight: {fingerprint}")]
    AlreadyInFlight {
        /// Hex encoded nullifier hash of the pending submission.
        fingerprint: String,
    },
    /// No (valid) wallet address is bound to the submission.
    #[error("missing_caller")]
    MissingCaller,
    /// The node predicts the call would revert on-chain (e.g. the nullifier is already spent).
    #[error("simulation_error: {reason}")]
    SimulationError {
        /// Revert reason returned by the node.
        reason: String,
    },
    /// The transaction was submitted but its confirmation was not observed within the polling bound.
    ///
    /// The transaction may still be mined later, so this MUST be presented as "status unknown".
    #[error("confirmation_timeout: {tx_hash} after {polls} polls")]
    ConfirmationTimeout {
        /// Hash of the submitted transaction.
        tx_hash: String,
        /// Number of receipt polls performed.
        polls: u32,
    },
    /// The transaction was mined and reverted, or was dropped by the network.
    #[error("transaction_failed: {tx_hash}: {reason}")]
    TransactionFailed {
        /// Hash of the submitted transaction.
        tx_hash: String,
        /// Either `reverted` or `dropped`.
        reason: String,
    },
    /// Transport level failure while talking to the verifier or the chain.
    #[error("network_error: {url} (status {status:?}): {error}")]
    NetworkError {
        /// Endpoint that failed.
        url: String,
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Underlying error.
        error: String,
    },
    /// The chain node failed while simulating, submitting or polling a transaction.
    #[error("chain_error: {endpoint}: {error}")]
    Chain {
        /// Node endpoint that failed.
        endpoint: String,
        /// Underlying error.
        error: String,
    },
    /// The presented input is not valid for the requested operation
    #[error("invalid_input: {attribute}: {reason}")]
    InvalidInput {
        /// The attribute that is invalid.
        attribute: String,
        /// The reason the input is invalid.
        reason: String,
    },
    /// A transaction tracker was asked to perform a transition its current state does not allow.
    #[error("invalid_state: expected {expected}, found {actual}")]
    InvalidState {
        /// The state the operation requires.
        expected: String,
        /// The state the tracker is in.
        actual: String,
    },
    /// Unexpected error serializing information
    #[error("serialization_error: {0}")]
    SerializationError(String),
}

/// What the user-facing layer should do after a given [`VoteKitError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum UserAction {
    /// The proof is unusable; ask the identity widget for a new one.
    RetryProof,
    /// A submission is already running; keep waiting and do not re-open the widget.
    WaitForExisting,
    /// A wallet must be connected before voting.
    ConnectWallet,
    /// The proof's nullifier is already consumed on-chain.
    AlreadyUsed,
    /// The outcome is not known yet; the transaction may still land.
    StatusUnknown,
    /// Transient or configuration failure; retrying the same operation later may succeed.
    RetryLater,
}

impl VoteKitError {
    /// Maps the error to the user-visible policy for it.
    #[must_use]
    pub const fn user_action(&self) -> UserAction {
        match self {
            Self::MalformedField { .. } | Self::VerificationRejected { .. } => {
                UserAction::RetryProof
            }
            Self::AlreadyInFlight { .. } => UserAction::WaitForExisting,
            Self::MissingCaller => UserAction::ConnectWallet,
            Self::SimulationError { .. } => UserAction::AlreadyUsed,
            Self::ConfirmationTimeout { .. } => UserAction::StatusUnknown,
            Self::TransactionFailed { .. }
            | Self::NetworkError { .. }
            | Self::Chain { .. }
            | Self::InvalidInput { .. }
            | Self::InvalidState { .. }
            | Self::SerializationError(_) => UserAction::RetryLater,
        }
    }
}

impl From<serde_json::Error> for VoteKitError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerializationError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_status_unknown_not_failure() {
        let err = VoteKitError::ConfirmationTimeout {
            tx_hash: "0xabc".to_string(),
            polls: 8,
        };
        assert_eq!(err.user_action(), UserAction::StatusUnknown);
        assert_eq!(err.to_string(), "confirmation_timeout: 0xabc after 8 polls");
    }

    #[test]
    fn test_user_actions() {
        assert_eq!(
            VoteKitError::MalformedField {
                field: "proof".to_string(),
                reason: "empty".to_string()
            }
            .user_action(),
            UserAction::RetryProof
        );
        assert_eq!(
            VoteKitError::AlreadyInFlight {
                fingerprint: "0x01".to_string()
            }
            .user_action(),
            UserAction::WaitForExisting
        );
        assert_eq!(
            VoteKitError::MissingCaller.user_action(),
            UserAction::ConnectWallet
        );
        assert_eq!(
            VoteKitError::SimulationError {
                reason: "InvalidNullifier".to_string()
            }
            .user_action(),
            UserAction::AlreadyUsed
        );
    }
}
