use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A `CredentialType` represents the verification tier that produced a World ID proof.
///
/// The identity widget reports it alongside the proof and the verification service
/// expects it back unchanged, so the serialized names must match the widget's.
///
/// More details in `https://docs.world.org/world-id/concepts#proof-of-personhood`
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    EnumString,
    Hash,
    Display,
    Serialize,
    Deserialize,
)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// Represents persons who have been biometrically verified at an Orb. Highest level of proof of personhood verification.
    #[default]
    Orb,
    /// Represents a verified phone number (reported as `device` by newer widget versions).
    #[strum(to_string = "phone", serialize = "device")]
    #[serde(alias = "device")]
    Phone,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_credential_type_serialization() {
        assert_eq!(serde_json::to_string(&CredentialType::Orb).unwrap(), "\"orb\"");
        assert_eq!(
            serde_json::to_string(&CredentialType::Phone).unwrap(),
            "\"phone\""
        );
        assert_eq!(CredentialType::Phone.to_string(), "phone");
    }

    #[test]
    fn test_credential_type_deserialization() {
        let deserialized: CredentialType = serde_json::from_str("\"orb\"").unwrap();
        assert_eq!(deserialized, CredentialType::Orb);

        let deserialized: CredentialType = serde_json::from_str("\"device\"").unwrap();
        assert_eq!(deserialized, CredentialType::Phone);

        assert_eq!(
            CredentialType::from_str("device").unwrap(),
            CredentialType::Phone
        );

        let result: Result<CredentialType, _> = serde_json::from_str("\"passport\"");
        assert!(result.is_err());
    }
}
