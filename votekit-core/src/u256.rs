use std::ops::Deref;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::VoteKitError;

/// Reasons a numeric string cannot be read as a `uint256`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NumberParseError {
    /// Nothing but whitespace (or a bare `0x` prefix) was supplied.
    #[error("empty value")]
    Empty,
    /// A character outside the radix was found.
    #[error("non-numeric character {0:?}")]
    InvalidDigit(char),
    /// The value does not fit into 256 bits.
    #[error("value exceeds 256 bits")]
    Overflow,
}

/// Parses a base-10 or `0x`-prefixed base-16 string into a `U256`.
///
/// Surrounding whitespace is ignored. No other separators (`_`, `+`, `-`) are accepted.
///
/// # Errors
/// Returns a [`NumberParseError`] for empty, non-numeric or overflowing input.
pub fn parse_u256(raw: &str) -> Result<U256, NumberParseError> {
    let raw = raw.trim();
    let (digits, radix) = match raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
    {
        Some(hex) => (hex, 16),
        None => (raw, 10),
    };

    if digits.is_empty() {
        return Err(NumberParseError::Empty);
    }
    if let Some(bad) = digits.chars().find(|c| !c.is_digit(radix)) {
        return Err(NumberParseError::InvalidDigit(bad));
    }

    U256::from_str_radix(digits, u64::from(radix)).map_err(|_| NumberParseError::Overflow)
}

/// A wrapper around `U256` to represent a field element in the protocol. Wrapper enables FFI interoperability.
///
/// Every numeric output of a World ID proof (root, nullifier hash, proof words) is a `U256`.
/// When sent as JSON the values are represented as padded hex strings from Big Endian bytes,
/// but decimal strings are accepted on input since some providers emit them.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
#[cfg_attr(feature = "ffi", derive(uniffi::Object))]
pub struct U256Wrapper(pub U256);

#[cfg_attr(feature = "ffi", uniffi::export)]
impl U256Wrapper {
    /// Outputs a hex string representation of the `U256` value padded to 32 bytes (plus two bytes for the `0x` prefix).
    #[must_use]
    pub fn to_hex_string(&self) -> String {
        format!("{:#066x}", self.0)
    }

    /// Outputs the base-10 representation of the value.
    #[must_use]
    pub fn to_decimal_string(&self) -> String {
        self.0.to_string()
    }

    /// Attempts to parse a hex string as a `U256` value (wrapped). The `0x` prefix is optional.
    ///
    /// # Errors
    /// Will return an `Error::InvalidInput` if the input is not a valid hex-string-presented number up to 256 bits.
    #[cfg_attr(feature = "ffi", uniffi::constructor)]
    pub fn try_from_hex_string(hex_string: &str) -> Result<Self, VoteKitError> {
        let trimmed = hex_string.trim();
        let prefixed = if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
            trimmed.to_string()
        } else {
            format!("0x{trimmed}")
        };
        Self::try_from_number_string(&prefixed)
    }

    /// Attempts to parse a decimal or `0x`-prefixed hex string as a `U256` value (wrapped).
    ///
    /// # Errors
    /// Will return an `Error::InvalidInput` if the input is empty, not numeric or wider than 256 bits.
    #[cfg_attr(feature = "ffi", uniffi::constructor)]
    pub fn try_from_number_string(value: &str) -> Result<Self, VoteKitError> {
        parse_u256(value)
            .map(Self)
            .map_err(|err| VoteKitError::InvalidInput {
                attribute: "u256".to_string(),
                reason: err.to_string(),
            })
    }
}

impl From<U256Wrapper> for U256 {
    fn from(val: U256Wrapper) -> Self {
        val.0
    }
}

impl From<U256> for U256Wrapper {
    fn from(val: U256) -> Self {
        Self(val)
    }
}

impl std::fmt::Display for U256Wrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex_string())
    }
}

impl Deref for U256Wrapper {
    type Target = U256;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Serialize for U256Wrapper {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex_string())
    }
}

impl<'de> Deserialize<'de> for U256Wrapper {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::try_from_number_string(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::uint;
    use test_case::test_case;

    #[test]
    fn test_to_hex_string_for_u256() {
        assert_eq!(
            U256Wrapper(U256::from(1)).to_hex_string(),
            "0x0000000000000000000000000000000000000000000000000000000000000001"
        );
        assert_eq!(
            U256Wrapper(U256::from(42)).to_hex_string(),
            "0x000000000000000000000000000000000000000000000000000000000000002a"
        );

        assert_eq!(
            U256Wrapper(uint!(
                80084422859880547211683076133703299733277748156566366325829078699459944778998_U256
            ))
            .to_hex_string(),
            "0xb10e2d527612073b26eecdfd717e6a320cf44b4afac2b0732d9fcbe2b7fa0cf6"
        );
    }

    #[test]
    fn test_decimal_and_hex_agree() {
        let from_decimal = U256Wrapper::try_from_number_string(
            "80084422859880547211683076133703299733277748156566366325829078699459944778998",
        )
        .unwrap();
        let from_hex = U256Wrapper::try_from_number_string(
            "0xb10e2d527612073b26eecdfd717e6a320cf44b4afac2b0732d9fcbe2b7fa0cf6",
        )
        .unwrap();
        assert_eq!(from_decimal, from_hex);
        assert_eq!(
            from_decimal.to_decimal_string(),
            "80084422859880547211683076133703299733277748156566366325829078699459944778998"
        );
    }

    #[test]
    fn test_from_hex_string_without_prefix() {
        assert_eq!(
            U256Wrapper::try_from_hex_string("2a").unwrap(),
            U256Wrapper(U256::from(42))
        );
        assert_eq!(
            U256Wrapper::try_from_hex_string("0X2A").unwrap(),
            U256Wrapper(U256::from(42))
        );
    }

    #[test]
    fn test_max_value_is_accepted() {
        let max = format!("0x{}", "f".repeat(64));
        assert_eq!(parse_u256(&max).unwrap(), U256::MAX);
        assert_eq!(
            parse_u256(
                "115792089237316195423570985008687907853269984665640564039457584007913129639935"
            )
            .unwrap(),
            U256::MAX
        );
    }

    #[test_case("" => NumberParseError::Empty ; "empty")]
    #[test_case("   " => NumberParseError::Empty ; "whitespace")]
    #[test_case("0x" => NumberParseError::Empty ; "bare prefix")]
    #[test_case("12a" => NumberParseError::InvalidDigit('a') ; "hex digit in decimal")]
    #[test_case("0xZZZZ" => NumberParseError::InvalidDigit('Z') ; "non hex")]
    #[test_case("-1" => NumberParseError::InvalidDigit('-') ; "negative")]
    #[test_case("1_000" => NumberParseError::InvalidDigit('_') ; "separator")]
    #[test_case(
        "115792089237316195423570985008687907853269984665640564039457584007913129639936"
        => NumberParseError::Overflow ; "decimal overflow"
    )]
    #[test_case(
        "0x10000000000000000000000000000000000000000000000000000000000000000"
        => NumberParseError::Overflow ; "hex overflow"
    )]
    fn test_invalid_numbers(input: &str) -> NumberParseError {
        parse_u256(input).unwrap_err()
    }

    #[test]
    fn test_json_serializing() {
        let number = U256Wrapper(uint!(
            0x036b6384b5eca791c62761152d0c79bb0604c104a5fb6f4eb0703f3154bb3db0_U256
        ));

        let json = serde_json::to_string(&number).unwrap();
        assert_eq!(
            json,
            "\"0x036b6384b5eca791c62761152d0c79bb0604c104a5fb6f4eb0703f3154bb3db0\""
        );

        let parsed: U256Wrapper = serde_json::from_str("\"123\"").unwrap();
        assert_eq!(parsed, U256Wrapper(U256::from(123)));
    }
}
