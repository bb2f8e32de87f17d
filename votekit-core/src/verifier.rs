//! Off-chain re-verification of a proof bundle before any on-chain action is attempted.
//!
//! Verification is fail-closed: transport errors, unexpected statuses and unreadable bodies all
//! produce an outcome with `valid == false`.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
    bundle::{ProofBundle, ProofEncoding},
    credential_type::CredentialType,
    error::{VoteKitError, VoteKitResult},
    http_request::{Request, RequestOptions},
    u256::parse_u256,
};

/// Why an outcome is not valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    /// The verifier looked at the proof and refused it.
    Rejected,
    /// The verifier could not be reached, or kept failing.
    Network {
        /// Endpoint that failed.
        url: String,
        /// HTTP status, if any response was received.
        status: Option<u16>,
    },
    /// The verifier answered with a body that could not be understood.
    MalformedResponse,
}

/// Result of re-verifying a proof bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    /// Whether the proof may proceed to the contract call.
    pub valid: bool,
    /// Human readable reason for an invalid outcome.
    pub reason: Option<String>,
    /// Classification of an invalid outcome.
    pub failure: Option<VerificationFailure>,
}

impl VerificationOutcome {
    /// A valid outcome.
    #[must_use]
    pub const fn accepted() -> Self {
        Self {
            valid: true,
            reason: None,
            failure: None,
        }
    }

    /// The verifier refused the proof.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::invalid(reason, VerificationFailure::Rejected)
    }

    /// The verifier answered with something unreadable.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::invalid(reason, VerificationFailure::MalformedResponse)
    }

    /// The verifier could not be reached.
    #[must_use]
    pub fn network(url: String, status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::invalid(reason, VerificationFailure::Network { url, status })
    }

    fn invalid(reason: impl Into<String>, failure: VerificationFailure) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            failure: Some(failure),
        }
    }

    /// Converts the outcome into the pipeline's error taxonomy.
    ///
    /// # Errors
    /// `NetworkError` for transport failures, `VerificationRejected` for everything else that is not valid.
    pub fn into_result(self) -> VoteKitResult<()> {
        if self.valid {
            return Ok(());
        }
        let reason = self.reason.unwrap_or_else(|| "unknown".to_string());
        match self.failure {
            Some(VerificationFailure::Network { url, status }) => Err(VoteKitError::NetworkError {
                url,
                status,
                error: reason,
            }),
            Some(VerificationFailure::MalformedResponse) => {
                Err(VoteKitError::VerificationRejected {
                    reason: format!("malformed_response: {reason}"),
                })
            }
            Some(VerificationFailure::Rejected) | None => {
                Err(VoteKitError::VerificationRejected { reason })
            }
        }
    }
}

/// A stateless collaborator that re-validates proof bundles against the identity network.
///
/// `action` and `signal` bind the proof to one operation; implementations must refuse proofs
/// generated for a different action or signal.
pub trait ServerVerifier: Send + Sync {
    /// Verifies `bundle` for `action` and `signal`. Never returns a valid outcome on error.
    fn verify(
        &self,
        bundle: &ProofBundle,
        action: &str,
        signal: &str,
    ) -> impl Future<Output = VerificationOutcome> + Send;
}

#[derive(Debug, Serialize)]
struct VerifyRequestBody<'a> {
    merkle_root: &'a str,
    nullifier_hash: &'a str,
    proof: &'a ProofEncoding,
    credential_type: CredentialType,
    action: &'a str,
    signal: &'a str,
}

/// Error shape of the portal, sent with non-200 statuses and alongside `success: false`.
#[derive(Debug, Default, Deserialize)]
struct VerifyErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponseBody {
    success: bool,
    #[serde(flatten)]
    error: VerifyErrorBody,
    #[serde(default)]
    nullifier_hash: Option<String>,
    #[serde(default)]
    action: Option<String>,
}

impl VerifyErrorBody {
    fn reason(&self) -> Option<String> {
        match (&self.code, &self.detail) {
            (Some(code), Some(detail)) => Some(format!("{code}: {detail}")),
            (Some(reason), None) | (None, Some(reason)) => Some(reason.clone()),
            (None, None) => None,
        }
    }
}

/// [`ServerVerifier`] backed by the World ID developer portal's `verify` endpoint (or any service
/// exposing the same contract).
#[derive(Debug, Clone)]
pub struct HttpVerifier {
    request: Request,
    url: String,
}

impl HttpVerifier {
    /// Creates a verifier posting to `url`.
    ///
    /// # Errors
    /// Returns `InvalidInput` if `url` is not `https` (unless `options.allow_insecure_http`).
    pub fn new(url: &str, options: RequestOptions) -> VoteKitResult<Self> {
        let request = Request::new(options);
        request.check_url(url)?;
        Ok(Self {
            request,
            url: url.to_string(),
        })
    }

    /// The endpoint proofs are posted to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn check_echo(
        response: &VerifyResponseBody,
        bundle: &ProofBundle,
        action: &str,
    ) -> Option<VerificationOutcome> {
        if let Some(echoed) = &response.nullifier_hash {
            let matches = match (parse_u256(echoed), parse_u256(bundle.nullifier_hash())) {
                (Ok(echoed), Ok(sent)) => echoed == sent,
                _ => false,
            };
            if !matches {
                return Some(VerificationOutcome::rejected("nullifier_mismatch"));
            }
        }
        if let Some(echoed) = &response.action {
            if echoed != action {
                return Some(VerificationOutcome::rejected("action_mismatch"));
            }
        }
        None
    }
}

impl ServerVerifier for HttpVerifier {
    async fn verify(
        &self,
        bundle: &ProofBundle,
        action: &str,
        signal: &str,
    ) -> VerificationOutcome {
        let body = VerifyRequestBody {
            merkle_root: bundle.merkle_root(),
            nullifier_hash: bundle.nullifier_hash(),
            proof: bundle.proof(),
            credential_type: bundle.credential_type(),
            action,
            signal,
        };

        let response = match self
            .request
            .handle(self.request.post(&self.url).json(&body))
            .await
        {
            Ok(response) => response,
            Err(VoteKitError::NetworkError { url, status, error }) => {
                log::warn!("verification endpoint unreachable: {error}");
                return VerificationOutcome::network(url, status, error);
            }
            Err(err) => {
                return VerificationOutcome::network(self.url.clone(), None, err.to_string());
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                return VerificationOutcome::network(
                    self.url.clone(),
                    Some(status.as_u16()),
                    format!("failed to read response body: {err}"),
                );
            }
        };
        if !status.is_success() {
            let reason = serde_json::from_str::<VerifyErrorBody>(&text)
                .ok()
                .and_then(|body| body.reason())
                .unwrap_or_else(|| format!("verifier responded with status {status}"));
            log::warn!("proof rejected by verifier ({status}): {reason}");
            return VerificationOutcome::rejected(reason);
        }

        let response = match serde_json::from_str::<VerifyResponseBody>(&text) {
            Ok(response) => response,
            Err(err) => {
                // only the first 20 characters, the body may echo proof material
                return VerificationOutcome::malformed(format!(
                    "failed to parse response with status {status}: {err}, received: {}",
                    text.chars().take(20).collect::<String>()
                ));
            }
        };

        if !response.success {
            return VerificationOutcome::rejected(
                response.error.reason().unwrap_or_else(|| "success=false".to_string()),
            );
        }
        if let Some(mismatch) = Self::check_echo(&response, bundle, action) {
            return mismatch;
        }

        log::debug!("proof accepted by verifier for action {action}");
        VerificationOutcome::accepted()
    }
}
