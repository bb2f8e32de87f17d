//! The action/signal binding of a proof and the request sent to the identity widget.

use std::future::Future;

use alloy_primitives::{keccak256, U256};
use serde::{Deserialize, Serialize};

use crate::{bundle::ProofBundle, credential_type::CredentialType, u256::U256Wrapper};

/// Hashes arbitrary bytes into the scalar field, the way World ID contracts do:
/// `uint256(keccak256(bytes)) >> 8`.
#[must_use]
pub fn hash_to_field(bytes: &[u8]) -> U256Wrapper {
    let hash = keccak256(bytes);
    U256Wrapper(U256::from_be_slice(hash.as_slice()) >> 8)
}

/// Bytes a signal is hashed from: `0x` hex signals (e.g. wallet addresses) are hashed as their
/// raw bytes, anything else as UTF-8.
fn signal_bytes(signal: &str) -> Vec<u8> {
    signal
        .strip_prefix("0x")
        .and_then(|body| hex::decode(body).ok())
        .unwrap_or_else(|| signal.as_bytes().to_vec())
}

/// Binds a proof to one application, one action and one signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionContext {
    /// Application identifier from the developer portal (`app_...`).
    pub app_id: String,
    /// The action being performed, e.g. `election_vote`.
    pub action: String,
    /// The signal the proof commits to, e.g. the vote or the voter's wallet address.
    pub signal: String,
}

impl ActionContext {
    /// Creates a new context.
    #[must_use]
    pub fn new(app_id: &str, action: &str, signal: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            action: action.to_string(),
            signal: signal.to_string(),
        }
    }

    /// `hash_to_field(abi.encodePacked(hash_to_field(app_id), action))`.
    #[must_use]
    pub fn external_nullifier(&self) -> U256Wrapper {
        let app_id_hash = hash_to_field(self.app_id.as_bytes());
        let packed = [
            app_id_hash.to_be_bytes::<32>().as_slice(),
            self.action.as_bytes(),
        ]
        .concat();
        hash_to_field(&packed)
    }

    /// `hash_to_field(signal)`; hex signals are hashed as raw bytes.
    #[must_use]
    pub fn signal_hash(&self) -> U256Wrapper {
        hash_to_field(&signal_bytes(&self.signal))
    }

    /// Builds the request the identity widget is opened with.
    #[must_use]
    pub fn widget_request(&self, credential_types: &[CredentialType]) -> WidgetRequest {
        let credential_types = if credential_types.is_empty() {
            vec![CredentialType::default()]
        } else {
            credential_types.to_vec()
        };
        WidgetRequest {
            app_id: self.app_id.clone(),
            action: self.action.clone(),
            signal: self.signal.clone(),
            external_nullifier: self.external_nullifier(),
            signal_hash: self.signal_hash(),
            credential_types,
        }
    }
}

/// Everything the identity widget needs to produce a proof for an [`ActionContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetRequest {
    /// Application identifier.
    pub app_id: String,
    /// Action identifier.
    pub action: String,
    /// Signal, unhashed.
    pub signal: String,
    /// External nullifier derived from app id and action.
    pub external_nullifier: U256Wrapper,
    /// Hash of the signal.
    pub signal_hash: U256Wrapper,
    /// Accepted verification tiers. Never empty; defaults to `orb`.
    pub credential_types: Vec<CredentialType>,
}

/// The external identity widget.
///
/// Resolves at most once per request: `Some(bundle)` on success, `None` if the user aborted.
pub trait IdentityWidget: Send + Sync {
    /// Opens the widget for `request`.
    fn request(
        &self,
        request: &WidgetRequest,
    ) -> impl Future<Output = Option<ProofBundle>> + Send;
}

/// An [`IdentityWidget`] that hands out a proof obtained out of band (e.g. read from a file).
#[derive(Debug, Clone, Default)]
pub struct StaticWidget {
    bundle: Option<ProofBundle>,
}

impl StaticWidget {
    /// A widget that resolves with `bundle`.
    #[must_use]
    pub const fn new(bundle: ProofBundle) -> Self {
        Self {
            bundle: Some(bundle),
        }
    }

    /// A widget the user always aborts.
    #[must_use]
    pub const fn aborted() -> Self {
        Self { bundle: None }
    }
}

impl IdentityWidget for StaticWidget {
    async fn request(&self, request: &WidgetRequest) -> Option<ProofBundle> {
        log::debug!(
            "identity widget requested for app {} action {}",
            request.app_id,
            request.action
        );
        self.bundle
            .clone()
            .filter(|bundle| request.credential_types.contains(&bundle.credential_type()))
    }
}
