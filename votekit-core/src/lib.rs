//! `VoteKit` turns a World ID proof into a one-person-one-vote contract call.
//!
//! The flow is: acquire a [`ProofBundle`] from the identity widget, decode it with the
//! [`FieldDecoder`], re-verify it with a [`ServerVerifier`], build the `verifyAndExecute`
//! [`CallDescriptor`], then simulate, submit and track it with a [`TransactionTracker`].
//! [`SubmissionPipeline`] runs all of it and guarantees at most one in-flight submission per
//! nullifier hash.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use votekit_core::{chain::InMemoryChain, PipelineConfig, SubmissionPipeline};
//!
//! let config = PipelineConfig::from_json(r#"{
//!     "app_id": "app_0123",
//!     "action": "election_vote",
//!     "contract_address": "0xb02Cafb1656043F7ae3b1BCc2f5B0d8086d5Df0e"
//! }"#).unwrap();
//! let pipeline = SubmissionPipeline::from_config(&config, Arc::new(InMemoryChain::new())).unwrap();
//! assert!(pipeline.active().is_empty());
//! ```

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// Deployment of the World ID developer portal proofs are verified against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Staging portal, for `app_staging_` applications and the simulator.
    Staging,
    /// Production portal.
    #[default]
    Production,
}

impl Environment {
    /// Base URL of the verification service.
    #[must_use]
    pub const fn verify_host(&self) -> &'static str {
        match self {
            Self::Staging => "https://staging-developer.worldcoin.org",
            Self::Production => "https://developer.worldcoin.org",
        }
    }
}

pub mod chain;
pub mod logger;

mod bundle;
pub use bundle::*;

mod call_builder;
pub use call_builder::*;

mod config;
pub use config::*;

mod context;
pub use context::*;

mod credential_type;
pub use credential_type::*;

mod decoder;
pub use decoder::*;

mod error;
pub use error::*;

mod pipeline;
pub use pipeline::*;

mod primitives;
pub use primitives::*;

mod submission;
pub use submission::*;

mod tracker;
pub use tracker::*;

mod u256;
pub use u256::*;

mod verifier;
pub use verifier::*;

pub use http_request::RequestOptions;

// private modules
mod http_request;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!("votekit_core");
