//! The proof artifact returned by the identity widget.

use serde::{Deserialize, Serialize};

use crate::credential_type::CredentialType;

/// The zero-knowledge proof as emitted by the widget.
///
/// Older widget versions return the Groth16 proof as one ABI-packed `uint256[8]` hex blob; newer
/// ones return the eight field elements individually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProofEncoding {
    /// A single `0x`-prefixed blob of exactly 8 × 32 bytes.
    Packed(String),
    /// Eight decimal or hex encoded field elements, in proof-system output order.
    Elements([String; 8]),
}

/// A World ID proof bundle, exactly as received from the identity widget.
///
/// Immutable once received; a new user action yields a new bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    merkle_root: String,
    nullifier_hash: String,
    proof: ProofEncoding,
    credential_type: CredentialType,
}

impl ProofBundle {
    /// Creates a bundle from its raw string encoded parts.
    #[must_use]
    pub const fn new(
        merkle_root: String,
        nullifier_hash: String,
        proof: ProofEncoding,
        credential_type: CredentialType,
    ) -> Self {
        Self {
            merkle_root,
            nullifier_hash,
            proof,
            credential_type,
        }
    }

    /// Deserializes a bundle from the widget's JSON success payload.
    ///
    /// Unknown keys (e.g. `verification_level`) are ignored.
    ///
    /// # Errors
    /// Returns a `SerializationError` if the JSON does not describe a proof bundle.
    pub fn from_json(json: &str) -> Result<Self, crate::VoteKitError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Root of the identity set at proof time, as received.
    #[must_use]
    pub fn merkle_root(&self) -> &str {
        &self.merkle_root
    }

    /// The nullifier hash, as received.
    #[must_use]
    pub fn nullifier_hash(&self) -> &str {
        &self.nullifier_hash
    }

    /// The proof, as received.
    #[must_use]
    pub const fn proof(&self) -> &ProofEncoding {
        &self.proof
    }

    /// The verification tier that produced the proof.
    #[must_use]
    pub const fn credential_type(&self) -> CredentialType {
        self.credential_type
    }
}
