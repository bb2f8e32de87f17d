//! Orchestrates acquire -> decode -> verify -> build -> submit -> track for one contract.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::{
    bundle::ProofBundle,
    call_builder::CallBuilder,
    chain::ChainClient,
    config::PipelineConfig,
    context::{ActionContext, IdentityWidget},
    credential_type::CredentialType,
    decoder::{DecodedProof, FieldDecoder},
    error::{VoteKitError, VoteKitResult},
    submission::{ActiveSubmissions, SubmissionHandle},
    tracker::{ConfirmationPolicy, SubmissionStatus, TransactionTracker},
    u256::U256Wrapper,
    verifier::{HttpVerifier, ServerVerifier},
};

/// Submits verified proofs to a voting contract, at most once in flight per nullifier hash.
///
/// Only verification and the chain interactions suspend. Confirmation is tracked by a background
/// task spawned on the current Tokio runtime; the returned [`SubmissionHandle`] observes it.
///
/// # Examples
/// ```rust
/// use std::sync::Arc;
///
/// use alloy_primitives::address;
/// use votekit_core::{
///     chain::InMemoryChain, CallBuilder, ConfirmationPolicy, ProofBundle, ServerVerifier,
///     SubmissionPipeline, VerificationOutcome,
/// };
///
/// struct TrustingVerifier;
///
/// impl ServerVerifier for TrustingVerifier {
///     async fn verify(&self, _: &ProofBundle, _: &str, _: &str) -> VerificationOutcome {
///         VerificationOutcome::accepted()
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let pipeline = SubmissionPipeline::new(
///     TrustingVerifier,
///     Arc::new(InMemoryChain::new()),
///     CallBuilder::new(address!("0xb02Cafb1656043F7ae3b1BCc2f5B0d8086d5Df0e")),
///     ConfirmationPolicy::default(),
/// );
/// let bundle = ProofBundle::from_json(r#"{
///     "merkle_root": "123",
///     "nullifier_hash": "456",
///     "proof": ["1", "2", "3", "4", "5", "6", "7", "8"],
///     "credential_type": "orb"
/// }"#).unwrap();
///
/// let handle = pipeline
///     .submit(&bundle, "election_vote", "yes", Some("0x57b930d551e677cc36e2fa036ae2fe8fdae0330d"))
///     .await
///     .unwrap();
/// let tx = handle.wait().await.unwrap();
/// println!("vote cast in {tx}");
/// # });
/// ```
#[derive(Debug)]
pub struct SubmissionPipeline<V, C> {
    decoder: FieldDecoder,
    verifier: V,
    chain: Arc<C>,
    builder: CallBuilder,
    policy: ConfirmationPolicy,
    active: ActiveSubmissions,
}

impl<C: ChainClient> SubmissionPipeline<HttpVerifier, C> {
    /// Builds a pipeline verifying through the HTTP endpoint `config` describes.
    ///
    /// # Errors
    /// `InvalidInput` if the configuration is not valid.
    pub fn from_config(config: &PipelineConfig, chain: Arc<C>) -> VoteKitResult<Self> {
        config.validate()?;
        let verifier =
            HttpVerifier::new(&config.verify_endpoint(), config.http.request_options())?;
        Ok(Self::new(
            verifier,
            chain,
            CallBuilder::new(config.contract()?),
            config.confirmation.clone(),
        ))
    }
}

impl<V: ServerVerifier, C: ChainClient> SubmissionPipeline<V, C> {
    /// Assembles a pipeline from its collaborators.
    #[must_use]
    pub fn new(
        verifier: V,
        chain: Arc<C>,
        builder: CallBuilder,
        policy: ConfirmationPolicy,
    ) -> Self {
        Self {
            decoder: FieldDecoder::default(),
            verifier,
            chain,
            builder,
            policy,
            active: ActiveSubmissions::default(),
        }
    }

    /// Replaces the field decoder, e.g. to register a custom encoding strategy.
    #[must_use]
    pub fn with_decoder(mut self, decoder: FieldDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// The set of in-flight fingerprints.
    #[must_use]
    pub const fn active(&self) -> &ActiveSubmissions {
        &self.active
    }

    /// Status of the in-flight submission for `fingerprint`, if any.
    #[must_use]
    pub fn status(&self, fingerprint: U256Wrapper) -> Option<SubmissionStatus> {
        self.active.status(fingerprint)
    }

    /// Submits `bundle` on behalf of `caller`.
    ///
    /// Returns once the transaction has been broadcast; confirmation continues in the background.
    /// Any failure before broadcast releases the fingerprint so the proof can be retried.
    ///
    /// Simulation, broadcast and tracking run in a spawned task. Dropping this future after
    /// verification only detaches the caller; the fingerprint stays reserved until the
    /// transaction reaches a terminal state.
    ///
    /// # Errors
    /// In stage order:
    /// - `MalformedField` if a bundle field cannot be decoded.
    /// - `AlreadyInFlight` if the same proof is already being submitted.
    /// - `VerificationRejected` or `NetworkError` if re-verification does not succeed.
    /// - `MissingCaller` if no valid wallet address is given.
    /// - `SimulationError` if the contract would revert (e.g. the proof was already used), or
    ///   `Chain` if the node fails.
    /// - `InvalidState` if the submission task ended without reporting a result.
    pub async fn submit(
        &self,
        bundle: &ProofBundle,
        action: &str,
        signal: &str,
        caller: Option<&str>,
    ) -> VoteKitResult<SubmissionHandle> {
        let decoded = DecodedProof::decode(&self.decoder, bundle)?;
        let fingerprint = decoded.fingerprint();
        let guard = self.active.reserve(fingerprint)?;

        log::debug!("verifying proof {fingerprint}");
        if let Err(err) = self
            .verifier
            .verify(bundle, action, signal)
            .await
            .into_result()
        {
            log::warn!("proof {fingerprint} rejected: {err}");
            return Err(err);
        }

        let call = self.builder.build(&decoded, caller)?;

        let mut tracker = TransactionTracker::new(Arc::clone(&self.chain), self.policy.clone());
        let updates = tracker.subscribe();
        guard.attach(updates.clone());

        // from the first chain call on, the reservation lives as long as the tracking task
        let (dispatched_tx, dispatched) = oneshot::channel();
        tokio::spawn(async move {
            let result = match tracker.prepare(call).await {
                Ok(()) => tracker.dispatch().await,
                Err(err) => Err(err),
            };
            let tx = match result {
                Ok(tx) => tx,
                Err(err) => {
                    drop(guard);
                    if dispatched_tx.send(Err(err)).is_err() {
                        log::debug!("submission {fingerprint} failed after the caller detached");
                    }
                    return;
                }
            };

            log::info!("proof {fingerprint} submitted in {tx}");
            if dispatched_tx.send(Ok(tx)).is_err() {
                log::debug!("caller detached from submission {fingerprint}, tracking continues");
            }
            let terminal = tracker.track().await;
            log::debug!("submission {fingerprint} finished as {}", terminal.name());
            drop(guard);
        });

        dispatched
            .await
            .map_err(|_| VoteKitError::InvalidState {
                expected: "a submitted transaction".to_string(),
                actual: "tracking task ended early".to_string(),
            })??;
        Ok(SubmissionHandle::new(fingerprint, updates))
    }

    /// Opens `widget` for `context` and submits the proof it returns.
    ///
    /// Returns `Ok(None)` if the user aborted the widget.
    ///
    /// # Errors
    /// See [`SubmissionPipeline::submit`].
    pub async fn acquire_and_submit<W: IdentityWidget>(
        &self,
        widget: &W,
        context: &ActionContext,
        credential_types: &[CredentialType],
        caller: Option<&str>,
    ) -> VoteKitResult<Option<SubmissionHandle>> {
        let request = context.widget_request(credential_types);
        let Some(bundle) = widget.request(&request).await else {
            log::info!("identity widget closed without a proof");
            return Ok(None);
        };
        self.submit(&bundle, &context.action, &context.signal, caller)
            .await
            .map(Some)
    }
}
