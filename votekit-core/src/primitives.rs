use alloy_primitives::Address;
use std::str::FromStr;

use crate::error::VoteKitError;

/// A trait for parsing primitive types from foreign provided values.
///
/// Wallet connectors and configuration files hand addresses over as strings; this parses them
/// into typed values and names the attribute on failure.
///
/// # Examples
/// ```rust
/// use alloy_primitives::Address;
/// use votekit_core::ParseFromForeignBinding;
///
/// let address = Address::parse_from_ffi("0x57b930d551e677cc36e2fa036ae2fe8fdae0330d", "caller").unwrap();
/// assert!(!address.is_zero());
/// ```
///
/// # Errors
/// - `VoteKitError::InvalidInput` if the provided string is not a valid address.
pub trait ParseFromForeignBinding {
    /// Parses `s`, naming `attr` in the error.
    ///
    /// # Errors
    /// `InvalidInput` if `s` cannot be parsed.
    fn parse_from_ffi(s: &str, attr: &'static str) -> Result<Self, VoteKitError>
    where
        Self: Sized;

    /// Parses `s` when present.
    ///
    /// # Errors
    /// `InvalidInput` if `s` is present and cannot be parsed.
    fn parse_from_ffi_optional(
        s: Option<&str>,
        attr: &'static str,
    ) -> Result<Option<Self>, VoteKitError>
    where
        Self: Sized;
}

impl ParseFromForeignBinding for Address {
    fn parse_from_ffi(s: &str, attr: &'static str) -> Result<Self, VoteKitError> {
        Self::from_str(s.trim()).map_err(|e| VoteKitError::InvalidInput {
            attribute: attr.to_string(),
            reason: e.to_string(),
        })
    }

    fn parse_from_ffi_optional(
        s: Option<&str>,
        attr: &'static str,
    ) -> Result<Option<Self>, VoteKitError> {
        s.map(|s| Self::parse_from_ffi(s, attr)).transpose()
    }
}
