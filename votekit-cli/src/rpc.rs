use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::Address,
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    transports::TransportError,
};
use eyre::{Context as _, Result};
use votekit_core::{
    chain::{ChainClient, ChainError, ReceiptStatus, TxHandle},
    CallDescriptor,
};

/// [`ChainClient`] backed by an EVM JSON-RPC node, signing with a local private key.
pub struct RpcChainClient {
    provider: DynProvider,
    url: String,
    signer_address: Address,
}

impl RpcChainClient {
    pub fn new(rpc_url: &str, private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .wrap_err("invalid private key")?;
        let signer_address = signer.address();
        let provider = DynProvider::new(
            ProviderBuilder::new()
                .wallet(EthereumWallet::from(signer))
                .connect_http(rpc_url.parse().wrap_err("invalid RPC URL")?),
        );

        Ok(Self {
            provider,
            url: rpc_url.to_string(),
            signer_address,
        })
    }

    /// The address transactions are sent from.
    pub const fn signer_address(&self) -> Address {
        self.signer_address
    }

    fn request(&self, call: &CallDescriptor) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(self.signer_address)
            .with_to(call.to)
            .with_input(call.calldata.clone())
    }
}

/// Only execution reverts (JSON-RPC code 3, or an `execution reverted` message from nodes that
/// report reverts under another code) predict a contract revert. Other error responses such as
/// `insufficient funds` or `nonce too low` are node failures like transport errors.
fn classify(err: &TransportError) -> ChainError {
    match err.as_error_resp() {
        Some(payload) if is_execution_revert(payload.code, &payload.message) => {
            ChainError::Revert(payload.message.to_string())
        }
        _ => ChainError::Rpc(err.to_string()),
    }
}

fn is_execution_revert(code: i64, message: &str) -> bool {
    code == 3 || message.to_ascii_lowercase().contains("execution reverted")
}

impl ChainClient for RpcChainClient {
    async fn simulate(&self, call: &CallDescriptor) -> Result<(), ChainError> {
        self.provider
            .call(self.request(call))
            .await
            .map(|_| ())
            .map_err(|err| classify(&err))
    }

    async fn send(&self, call: &CallDescriptor) -> Result<TxHandle, ChainError> {
        let pending = self
            .provider
            .send_transaction(self.request(call))
            .await
            .map_err(|err| classify(&err))?;
        Ok(TxHandle(*pending.tx_hash()))
    }

    async fn receipt(&self, tx: &TxHandle) -> Result<Option<ReceiptStatus>, ChainError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx.0)
            .await
            .map_err(|err| ChainError::Rpc(err.to_string()))?;

        if let Some(receipt) = receipt {
            return Ok(Some(if receipt.status() {
                ReceiptStatus::Success
            } else {
                ReceiptStatus::Reverted
            }));
        }

        // not mined yet; make sure the node still knows it
        let known = self
            .provider
            .get_transaction_by_hash(tx.0)
            .await
            .map_err(|err| ChainError::Rpc(err.to_string()))?;
        if known.is_none() {
            return Err(ChainError::Dropped);
        }
        Ok(None)
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use alloy::{rpc::json_rpc::ErrorPayload, transports::TransportErrorKind};
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    fn error_response(code: i64, message: &str) -> TransportError {
        let raw = json!({ "code": code, "message": message }).to_string();
        let payload: ErrorPayload = serde_json::from_str(&raw).unwrap();
        TransportError::ErrorResp(payload)
    }

    #[test_case(3, "execution reverted: InvalidNullifier" ; "revert code")]
    #[test_case(-32000, "execution reverted" ; "revert message under server error code")]
    #[test_case(-32015, "VM Exception: Execution Reverted" ; "case insensitive message")]
    fn test_execution_reverts_predict_a_revert(code: i64, message: &str) {
        assert_eq!(
            classify(&error_response(code, message)),
            ChainError::Revert(message.to_string())
        );
    }

    #[test_case(-32000, "insufficient funds for gas * price + value" ; "insufficient funds")]
    #[test_case(-32000, "nonce too low" ; "nonce too low")]
    #[test_case(-32603, "internal error" ; "internal error")]
    fn test_other_error_responses_are_node_failures(code: i64, message: &str) {
        assert!(matches!(
            classify(&error_response(code, message)),
            ChainError::Rpc(ref error) if error.contains(message)
        ));
    }

    #[test]
    fn test_transport_failures_are_node_failures() {
        let err = TransportErrorKind::custom_str("connection refused");
        assert!(matches!(
            classify(&err),
            ChainError::Rpc(ref error) if error.contains("connection refused")
        ));
    }
}
