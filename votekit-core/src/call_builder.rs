//! Assembles the `verifyAndExecute` contract invocation from a verified proof.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;

use crate::{
    decoder::{DecodedProof, PROOF_WORDS},
    error::{VoteKitError, VoteKitResult},
    primitives::ParseFromForeignBinding,
    u256::U256Wrapper,
};

mod abi {
    #![allow(missing_docs, dead_code)]

    alloy_sol_types::sol! {
        /// Entry point of a World ID gated voting contract.
        ///
        /// The contract re-verifies the Groth16 proof against the World ID router and records the
        /// nullifier hash, so a proof can only be consumed once.
        interface IVoteContract {
            function verifyAndExecute(
                address signal,
                uint256 root,
                uint256 nullifierHash,
                uint256[8] calldata proof
            ) external;
        }
    }
}

use abi::IVoteContract::verifyAndExecuteCall;

/// A fully encoded contract invocation, ready to be simulated and submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDescriptor {
    /// Contract the call is sent to.
    pub to: Address,
    /// 4-byte function selector of `verifyAndExecute`.
    pub selector: [u8; 4],
    /// Wallet address the vote is cast for (first argument).
    pub caller: Address,
    /// Identity set root (second argument).
    pub merkle_root: U256,
    /// Nullifier hash (third argument).
    pub nullifier_hash: U256,
    /// Proof words (fourth argument), in proof-system order.
    pub proof: [U256; PROOF_WORDS],
    /// ABI encoded calldata, selector included.
    pub calldata: Bytes,
}

impl CallDescriptor {
    /// Solidity signature of the invoked function.
    pub const SIGNATURE: &'static str = verifyAndExecuteCall::SIGNATURE;

    /// The submission fingerprint this call belongs to.
    #[must_use]
    pub const fn fingerprint(&self) -> U256Wrapper {
        U256Wrapper(self.nullifier_hash)
    }
}

/// Builds [`CallDescriptor`]s for one contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallBuilder {
    contract: Address,
}

impl CallBuilder {
    /// A builder targeting `contract`.
    #[must_use]
    pub const fn new(contract: Address) -> Self {
        Self { contract }
    }

    /// The contract calls are built for.
    #[must_use]
    pub const fn contract(&self) -> Address {
        self.contract
    }

    /// Builds the call for `proof` on behalf of `caller`.
    ///
    /// # Errors
    /// Returns `MissingCaller` if `caller` is absent, not an address, or the zero address.
    pub fn build(
        &self,
        proof: &DecodedProof,
        caller: Option<&str>,
    ) -> VoteKitResult<CallDescriptor> {
        build_call(proof, caller, self.contract)
    }
}

/// Builds the `verifyAndExecute(caller, root, nullifierHash, proof)` call on `contract`.
///
/// # Errors
/// Returns `MissingCaller` if `caller` is absent, not an address, or the zero address.
pub fn build_call(
    proof: &DecodedProof,
    caller: Option<&str>,
    contract: Address,
) -> VoteKitResult<CallDescriptor> {
    let caller = match Address::parse_from_ffi_optional(caller, "caller") {
        Ok(Some(caller)) if !caller.is_zero() => caller,
        Ok(_) => return Err(VoteKitError::MissingCaller),
        Err(err) => {
            log::warn!("caller address rejected: {err}");
            return Err(VoteKitError::MissingCaller);
        }
    };

    let call = verifyAndExecuteCall {
        signal: caller,
        root: proof.merkle_root.0,
        nullifierHash: proof.nullifier_hash.0,
        proof: proof.proof_words(),
    };

    Ok(CallDescriptor {
        to: contract,
        selector: verifyAndExecuteCall::SELECTOR,
        caller,
        merkle_root: call.root,
        nullifier_hash: call.nullifierHash,
        proof: call.proof,
        calldata: call.abi_encode().into(),
    })
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, keccak256};

    use super::*;

    const CONTRACT: Address = address!("0xb02Cafb1656043F7ae3b1BCc2f5B0d8086d5Df0e");
    const CALLER: &str = "0x57b930d551e677cc36e2fa036ae2fe8fdae0330d";

    fn decoded() -> DecodedProof {
        DecodedProof {
            merkle_root: U256Wrapper(U256::from(123)),
            nullifier_hash: U256Wrapper(U256::from(456)),
            proof: [1u64, 2, 3, 4, 5, 6, 7, 8].map(|w| U256Wrapper(U256::from(w))),
        }
    }

    #[test]
    fn test_selector_matches_signature() {
        assert_eq!(
            CallDescriptor::SIGNATURE,
            "verifyAndExecute(address,uint256,uint256,uint256[8])"
        );
        let call = CallBuilder::new(CONTRACT).build(&decoded(), Some(CALLER)).unwrap();
        assert_eq!(call.selector, keccak256(CallDescriptor::SIGNATURE)[..4]);
    }

    #[test]
    fn test_arguments_are_ordered() {
        let call = build_call(&decoded(), Some(CALLER), CONTRACT).unwrap();

        assert_eq!(call.to, CONTRACT);
        assert_eq!(call.caller, address!("0x57b930d551e677cc36e2fa036ae2fe8fdae0330d"));
        assert_eq!(call.merkle_root, U256::from(123));
        assert_eq!(call.nullifier_hash, U256::from(456));
        assert_eq!(call.proof, [1u64, 2, 3, 4, 5, 6, 7, 8].map(U256::from));
        assert_eq!(call.fingerprint(), U256Wrapper(U256::from(456)));
    }

    #[test]
    fn test_calldata_layout() {
        let call = build_call(&decoded(), Some(CALLER), CONTRACT).unwrap();
        // selector + address + root + nullifier + 8 static proof words
        assert_eq!(call.calldata.len(), 4 + 32 * 11);
        assert_eq!(call.calldata[..4], call.selector);
        assert_eq!(call.calldata[4 + 12..4 + 32], call.caller.0[..]);
        assert_eq!(
            U256::from_be_slice(&call.calldata[4 + 32..4 + 64]),
            U256::from(123)
        );
        assert_eq!(
            U256::from_be_slice(&call.calldata[4 + 32 * 10..]),
            U256::from(8)
        );
    }

    #[test]
    fn test_missing_caller() {
        let builder = CallBuilder::new(CONTRACT);
        assert_eq!(builder.build(&decoded(), None), Err(VoteKitError::MissingCaller));
        assert_eq!(
            builder.build(&decoded(), Some("not an address")),
            Err(VoteKitError::MissingCaller)
        );
        assert_eq!(
            builder.build(&decoded(), Some("0x0000000000000000000000000000000000000000")),
            Err(VoteKitError::MissingCaller)
        );
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = CallBuilder::new(CONTRACT);
        assert_eq!(
            builder.build(&decoded(), Some(CALLER)),
            builder.build(&decoded(), Some(CALLER))
        );
    }
}
