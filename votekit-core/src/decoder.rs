//! Converts the string encoded fields of a [`ProofBundle`] into contract ABI primitives.
//!
//! Decoding is a pure syntactic transform: no cryptographic validation is performed here. Each
//! ABI primitive kind has its own decode strategy, registered in a table keyed by
//! [`EncodingKind`]. A bundle either decodes completely or not at all.

use std::collections::HashMap;

use alloy_primitives::U256;
use strum::{Display, EnumString};

use crate::{
    bundle::{ProofBundle, ProofEncoding},
    error::{VoteKitError, VoteKitResult},
    u256::{parse_u256, U256Wrapper},
};

/// Number of field elements in a Groth16 proof as consumed by the verifier contract.
pub const PROOF_WORDS: usize = 8;

/// Byte length of an ABI packed `uint256[8]`.
pub const PACKED_PROOF_LEN: usize = PROOF_WORDS * 32;

/// The ABI primitive a raw value should be decoded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
pub enum EncodingKind {
    /// A single `uint256`, given as a decimal or `0x` hex string.
    #[strum(serialize = "uint256")]
    Uint256,
    /// A packed `uint256[8]` blob.
    #[strum(serialize = "uint256[8]")]
    Uint256Array8,
}

/// The output of a decode strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedValue {
    /// A decoded `uint256`.
    Uint256(U256),
    /// A decoded `uint256[8]`, in encoded order.
    Uint256Array8([U256; PROOF_WORDS]),
}

impl DecodedValue {
    /// Returns the inner value if this is a `uint256`.
    #[must_use]
    pub const fn as_uint256(&self) -> Option<U256> {
        match self {
            Self::Uint256(value) => Some(*value),
            Self::Uint256Array8(_) => None,
        }
    }

    /// Returns the inner words if this is a `uint256[8]`.
    #[must_use]
    pub const fn as_uint256_array(&self) -> Option<[U256; PROOF_WORDS]> {
        match self {
            Self::Uint256Array8(words) => Some(*words),
            Self::Uint256(_) => None,
        }
    }
}

/// A decode strategy. Returns a human readable reason on failure.
pub type DecodeFn = fn(&str) -> Result<DecodedValue, String>;

/// Strategy table mapping each [`EncodingKind`] to its decode function.
#[derive(Debug, Clone)]
pub struct FieldDecoder {
    strategies: HashMap<EncodingKind, DecodeFn>,
}

impl Default for FieldDecoder {
    fn default() -> Self {
        let mut decoder = Self {
            strategies: HashMap::new(),
        };
        decoder.register(EncodingKind::Uint256, decode_uint256);
        decoder.register(EncodingKind::Uint256Array8, decode_packed_uint256_array);
        decoder
    }
}

impl FieldDecoder {
    /// Registers (or replaces) the strategy used for `kind`.
    pub fn register(&mut self, kind: EncodingKind, strategy: DecodeFn) {
        self.strategies.insert(kind, strategy);
    }

    /// Decodes `raw` as `kind`.
    ///
    /// # Errors
    /// Returns `MalformedField` if the value is not valid for the kind.
    pub fn decode(&self, kind: EncodingKind, raw: &str) -> VoteKitResult<DecodedValue> {
        self.decode_field(&kind.to_string(), kind, raw)
    }

    /// Decodes `raw` as `kind`, labelling any failure with `field`.
    ///
    /// # Errors
    /// Returns `MalformedField` if the value is not valid for the kind or no strategy is registered.
    pub fn decode_field(
        &self,
        field: &str,
        kind: EncodingKind,
        raw: &str,
    ) -> VoteKitResult<DecodedValue> {
        let strategy = self
            .strategies
            .get(&kind)
            .ok_or_else(|| malformed(field, format!("no decoder registered for {kind}")))?;
        strategy(raw).map_err(|reason| malformed(field, reason))
    }

    fn decode_uint256_field(&self, field: &str, raw: &str) -> VoteKitResult<U256Wrapper> {
        self.decode_field(field, EncodingKind::Uint256, raw)?
            .as_uint256()
            .map(U256Wrapper)
            .ok_or_else(|| malformed(field, "decoder returned a non uint256 value"))
    }
}

fn malformed(field: &str, reason: impl Into<String>) -> VoteKitError {
    VoteKitError::MalformedField {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn decode_uint256(raw: &str) -> Result<DecodedValue, String> {
    parse_u256(raw)
        .map(DecodedValue::Uint256)
        .map_err(|err| err.to_string())
}

fn decode_packed_uint256_array(raw: &str) -> Result<DecodedValue, String> {
    let raw = raw.trim();
    let body = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    let bytes = hex::decode(body).map_err(|err| format!("invalid hex: {err}"))?;
    if bytes.len() != PACKED_PROOF_LEN {
        return Err(format!(
            "expected {PACKED_PROOF_LEN} bytes, got {}",
            bytes.len()
        ));
    }

    let mut words = [U256::ZERO; PROOF_WORDS];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(32)) {
        *word = U256::from_be_slice(chunk);
    }
    Ok(DecodedValue::Uint256Array8(words))
}

/// A proof bundle with every field decoded into its contract ABI representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedProof {
    /// Root of the identity set.
    pub merkle_root: U256Wrapper,
    /// Nullifier hash; also the fingerprint of the submission.
    pub nullifier_hash: U256Wrapper,
    /// Groth16 proof words, in proof-system output order.
    pub proof: [U256Wrapper; PROOF_WORDS],
}

impl DecodedProof {
    /// Decodes every field of `bundle`, failing on the first malformed one.
    ///
    /// # Errors
    /// Returns `MalformedField` naming the first field that failed to decode.
    pub fn decode(decoder: &FieldDecoder, bundle: &ProofBundle) -> VoteKitResult<Self> {
        let merkle_root = decoder.decode_uint256_field("merkle_root", bundle.merkle_root())?;
        let nullifier_hash =
            decoder.decode_uint256_field("nullifier_hash", bundle.nullifier_hash())?;

        let proof = match bundle.proof() {
            ProofEncoding::Packed(blob) => decoder
                .decode_field("proof", EncodingKind::Uint256Array8, blob)?
                .as_uint256_array()
                .ok_or_else(|| malformed("proof", "decoder returned a non uint256[8] value"))?
                .map(U256Wrapper),
            ProofEncoding::Elements(elements) => {
                let mut words = [U256Wrapper(U256::ZERO); PROOF_WORDS];
                for (index, (word, element)) in words.iter_mut().zip(elements).enumerate() {
                    *word = decoder.decode_uint256_field(&format!("proof[{index}]"), element)?;
                }
                words
            }
        };

        Ok(Self {
            merkle_root,
            nullifier_hash,
            proof,
        })
    }

    /// The value identifying submissions of this proof.
    #[must_use]
    pub const fn fingerprint(&self) -> U256Wrapper {
        self.nullifier_hash
    }

    /// The proof words as raw integers, ready for ABI encoding.
    #[must_use]
    pub fn proof_words(&self) -> [U256; PROOF_WORDS] {
        self.proof.map(|word| word.0)
    }

    /// The proof words as padded hex strings.
    #[must_use]
    pub fn to_hex_words(&self) -> Vec<String> {
        self.proof.iter().map(U256Wrapper::to_hex_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use test_case::test_case;

    use super::*;
    use crate::credential_type::CredentialType;

    fn packed(words: &[u64; PROOF_WORDS]) -> String {
        let body: String = words.iter().map(|w| format!("{w:064x}")).collect();
        format!("0x{body}")
    }

    fn bundle(root: &str, nullifier: &str, proof: ProofEncoding) -> ProofBundle {
        ProofBundle::new(
            root.to_string(),
            nullifier.to_string(),
            proof,
            CredentialType::Orb,
        )
    }

    #[test]
    fn test_encoding_kind_from_abi_name() {
        assert_eq!(
            EncodingKind::from_str("uint256").unwrap(),
            EncodingKind::Uint256
        );
        assert_eq!(
            EncodingKind::from_str("uint256[8]").unwrap(),
            EncodingKind::Uint256Array8
        );
        assert!(EncodingKind::from_str("bytes32").is_err());
    }

    #[test_case("255" ; "decimal")]
    #[test_case("0xff" ; "hex")]
    #[test_case("0x00000000000000000000000000000000000000000000000000000000000000ff" ; "padded hex")]
    #[test_case(" 255 " ; "whitespace")]
    fn test_uint256_is_radix_independent(raw: &str) {
        let decoder = FieldDecoder::default();
        assert_eq!(
            decoder.decode(EncodingKind::Uint256, raw).unwrap(),
            DecodedValue::Uint256(U256::from(255))
        );
    }

    #[test_case("" ; "empty")]
    #[test_case("twelve" ; "non numeric")]
    #[test_case("0x1g" ; "bad hex")]
    #[test_case("115792089237316195423570985008687907853269984665640564039457584007913129639936" ; "overflow")]
    fn test_malformed_uint256(raw: &str) {
        let err = FieldDecoder::default()
            .decode(EncodingKind::Uint256, raw)
            .unwrap_err();
        assert!(
            matches!(err, VoteKitError::MalformedField { ref field, .. } if field == "uint256"),
            "unexpected error {err:?}"
        );
    }

    #[test]
    fn test_packed_proof_preserves_order() {
        let decoder = FieldDecoder::default();
        let value = decoder
            .decode(EncodingKind::Uint256Array8, &packed(&[1, 2, 3, 4, 5, 6, 7, 8]))
            .unwrap();
        assert_eq!(
            value.as_uint256_array().unwrap(),
            [1u64, 2, 3, 4, 5, 6, 7, 8].map(U256::from)
        );
    }

    #[test]
    fn test_swapping_chunks_changes_decoded_proof() {
        let decoder = FieldDecoder::default();
        let original = bundle("1", "2", ProofEncoding::Packed(packed(&[1, 2, 3, 4, 5, 6, 7, 8])));
        let swapped = bundle("1", "2", ProofEncoding::Packed(packed(&[1, 2, 3, 4, 5, 6, 8, 7])));

        let original = DecodedProof::decode(&decoder, &original).unwrap();
        let swapped = DecodedProof::decode(&decoder, &swapped).unwrap();
        assert_ne!(original, swapped);
        assert_eq!(original.proof[6], swapped.proof[7]);
    }

    #[test_case("0x" ; "empty blob")]
    #[test_case("0x1234" ; "too short")]
    #[test_case(&format!("0x{}", "00".repeat(PACKED_PROOF_LEN + 1)) ; "too long")]
    #[test_case(&format!("0x{}", "zz".repeat(PACKED_PROOF_LEN)) ; "not hex")]
    fn test_malformed_packed_proof(raw: &str) {
        let err = FieldDecoder::default()
            .decode(EncodingKind::Uint256Array8, raw)
            .unwrap_err();
        assert!(matches!(err, VoteKitError::MalformedField { .. }));
    }

    #[test]
    fn test_decode_is_fail_fast() {
        let decoder = FieldDecoder::default();
        let proof = ProofEncoding::Packed(packed(&[1, 2, 3, 4, 5, 6, 7, 8]));

        let err = DecodedProof::decode(&decoder, &bundle("nope", "2", proof.clone())).unwrap_err();
        assert_eq!(
            err,
            VoteKitError::MalformedField {
                field: "merkle_root".to_string(),
                reason: "non-numeric character 'n'".to_string(),
            }
        );

        let err = DecodedProof::decode(&decoder, &bundle("1", "", proof)).unwrap_err();
        assert!(matches!(
            err,
            VoteKitError::MalformedField { ref field, .. } if field == "nullifier_hash"
        ));
    }

    #[test]
    fn test_element_proof_matches_packed_proof() {
        let decoder = FieldDecoder::default();
        let elements = ProofEncoding::Elements(
            ["1", "2", "3", "4", "5", "6", "7", "0x8"].map(str::to_string),
        );
        let from_elements =
            DecodedProof::decode(&decoder, &bundle("123", "456", elements)).unwrap();
        let from_packed = DecodedProof::decode(
            &decoder,
            &bundle("0x7b", "0x1c8", ProofEncoding::Packed(packed(&[1, 2, 3, 4, 5, 6, 7, 8]))),
        )
        .unwrap();
        assert_eq!(from_elements, from_packed);
        assert_eq!(from_elements.fingerprint(), U256Wrapper(U256::from(456)));
    }

    #[test]
    fn test_bad_element_names_its_position() {
        let decoder = FieldDecoder::default();
        let elements = ProofEncoding::Elements(
            ["1", "2", "3", "x", "5", "6", "7", "8"].map(str::to_string),
        );
        let err = DecodedProof::decode(&decoder, &bundle("1", "2", elements)).unwrap_err();
        assert!(matches!(
            err,
            VoteKitError::MalformedField { ref field, .. } if field == "proof[3]"
        ));
    }

    #[test]
    fn test_registered_strategy_overrides_builtin() {
        let mut decoder = FieldDecoder::default();
        decoder.register(EncodingKind::Uint256, |_| Err("disabled".to_string()));
        let err = decoder.decode(EncodingKind::Uint256, "1").unwrap_err();
        assert_eq!(
            err,
            VoteKitError::MalformedField {
                field: "uint256".to_string(),
                reason: "disabled".to_string(),
            }
        );
    }

    #[test]
    fn test_hex_words() {
        let decoded = DecodedProof::decode(
            &FieldDecoder::default(),
            &bundle("1", "2", ProofEncoding::Packed(packed(&[1, 2, 3, 4, 5, 6, 7, 42]))),
        )
        .unwrap();
        let words = decoded.to_hex_words();
        assert_eq!(words.len(), PROOF_WORDS);
        assert_eq!(
            words[7],
            "0x000000000000000000000000000000000000000000000000000000000000002a"
        );
    }
}
