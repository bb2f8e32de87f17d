//! Shared fixtures for the pipeline integration tests.

#![allow(missing_docs)]

use std::{
    net::TcpListener,
    sync::Arc,
    time::Duration,
};

use alloy_primitives::{address, Address};
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;
use votekit_core::{
    chain::{InMemoryChain, MiningMode},
    CallBuilder, ConfirmationPolicy, CredentialType, HttpVerifier, ProofBundle, ProofEncoding,
    RequestOptions, SubmissionPipeline,
};

pub const APP_ID: &str = "app_staging_0123";
pub const ACTION: &str = "election_vote";
pub const SIGNAL: &str = "yes";
pub const CALLER: &str = "0x57b930d551e677cc36e2fa036ae2fe8fdae0330d";
pub const CONTRACT: Address = address!("0xb02Cafb1656043F7ae3b1BCc2f5B0d8086d5Df0e");

pub type TestPipeline = SubmissionPipeline<HttpVerifier, InMemoryChain>;

/// The eight proof words 1..=8 as one ABI-packed blob.
pub fn packed_proof() -> String {
    let body: String = (1..=8u64).map(|word| format!("{word:064x}")).collect();
    format!("0x{body}")
}

pub fn bundle(nullifier_hash: &str) -> ProofBundle {
    ProofBundle::new(
        "123".to_string(),
        nullifier_hash.to_string(),
        ProofEncoding::Packed(packed_proof()),
        CredentialType::Orb,
    )
}

pub fn verify_path() -> String {
    format!("/api/v1/verify/{APP_ID}")
}

/// Mocks an accepting verifier for `nullifier_hash`, expected to be hit `hits` times.
pub async fn accept_proof(server: &mut ServerGuard, nullifier_hash: &str, hits: usize) -> Mock {
    server
        .mock("POST", verify_path().as_str())
        .match_body(Matcher::PartialJson(json!({
            "nullifier_hash": nullifier_hash,
            "action": ACTION,
            "signal": SIGNAL,
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "success": true,
                "action": ACTION,
                "nullifier_hash": nullifier_hash,
            })
            .to_string(),
        )
        .expect(hits)
        .create_async()
        .await
}

pub fn options(timeout: Duration) -> RequestOptions {
    RequestOptions {
        timeout,
        max_retries: 1,
        allow_insecure_http: true,
    }
}

pub fn pipeline(url: &str, chain: &Arc<InMemoryChain>, max_polls: u32) -> TestPipeline {
    let verifier = HttpVerifier::new(url, options(Duration::from_secs(2))).unwrap();
    pipeline_with(verifier, chain, max_polls)
}

pub fn pipeline_with(
    verifier: HttpVerifier,
    chain: &Arc<InMemoryChain>,
    max_polls: u32,
) -> TestPipeline {
    SubmissionPipeline::new(
        verifier,
        Arc::clone(chain),
        CallBuilder::new(CONTRACT),
        ConfirmationPolicy {
            max_polls,
            min_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(10),
        },
    )
}

pub fn manual_chain() -> Arc<InMemoryChain> {
    Arc::new(InMemoryChain::with_mining(MiningMode::Manual))
}

/// An endpoint that accepts connections and never answers.
pub fn unresponsive_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let mut open = Vec::new();
        for stream in listener.incoming().flatten() {
            open.push(stream);
        }
    });
    format!("http://{address}{}", verify_path())
}
