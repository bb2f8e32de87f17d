use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{
    error::{VoteKitError, VoteKitResult},
    http_request::RequestOptions,
    primitives::ParseFromForeignBinding,
    tracker::ConfirmationPolicy,
    Environment,
};

/// HTTP transport settings of the verification client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retries on top of the first attempt for transient failures.
    pub max_retries: u32,
    /// Allow a plain `http://` verify URL. Local development only.
    pub allow_insecure_http: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let defaults = RequestOptions::default();
        Self {
            timeout_ms: u64::try_from(defaults.timeout.as_millis()).unwrap_or(u64::MAX),
            max_retries: defaults.max_retries,
            allow_insecure_http: defaults.allow_insecure_http,
        }
    }
}

impl HttpConfig {
    /// The transport options these settings describe.
    #[must_use]
    pub const fn request_options(&self) -> RequestOptions {
        RequestOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            max_retries: self.max_retries,
            allow_insecure_http: self.allow_insecure_http,
        }
    }
}

/// Everything needed to assemble a [`crate::SubmissionPipeline`].
///
/// # Examples
/// ```rust
/// use votekit_core::{Environment, PipelineConfig};
///
/// let config = PipelineConfig::from_json(r#"{
///     "app_id": "app_staging_0123",
///     "environment": "staging",
///     "action": "election_vote",
///     "contract_address": "0xb02Cafb1656043F7ae3b1BCc2f5B0d8086d5Df0e"
/// }"#).unwrap();
///
/// assert_eq!(config.environment, Environment::Staging);
/// assert_eq!(
///     config.verify_endpoint(),
///     "https://staging-developer.worldcoin.org/api/v1/verify/app_staging_0123"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Application identifier from the developer portal.
    pub app_id: String,
    /// The action proofs are requested for.
    pub action: String,
    /// Selects the default verification host.
    pub environment: Environment,
    /// Overrides the verification endpoint derived from `environment` and `app_id`.
    pub verify_url: Option<String>,
    /// Address of the voting contract.
    pub contract_address: String,
    /// Verification transport.
    pub http: HttpConfig,
    /// Receipt polling bounds.
    pub confirmation: ConfirmationPolicy,
}

impl PipelineConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    /// - `SerializationError` if `json` does not describe a configuration.
    /// - `InvalidInput` if the configuration is not usable, see [`PipelineConfig::validate`].
    pub fn from_json(json: &str) -> VoteKitResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can build a pipeline.
    ///
    /// # Errors
    /// `InvalidInput` naming the attribute that is missing or malformed.
    pub fn validate(&self) -> VoteKitResult<()> {
        if self.app_id.trim().is_empty() {
            return Err(invalid("app_id", "must not be empty"));
        }
        if self.action.trim().is_empty() {
            return Err(invalid("action", "must not be empty"));
        }
        let contract = self.contract()?;
        if contract.is_zero() {
            return Err(invalid("contract_address", "must not be the zero address"));
        }

        let url = self.verify_endpoint();
        let secure = url.starts_with("https://");
        let local = self.http.allow_insecure_http && url.starts_with("http://");
        if !secure && !local {
            return Err(invalid("verify_url", format!("{url} is not an https endpoint")));
        }
        Ok(())
    }

    /// The endpoint proofs are verified against.
    #[must_use]
    pub fn verify_endpoint(&self) -> String {
        self.verify_url.clone().unwrap_or_else(|| {
            format!(
                "{}/api/v1/verify/{}",
                self.environment.verify_host(),
                self.app_id
            )
        })
    }

    /// The parsed contract address.
    ///
    /// # Errors
    /// `InvalidInput` if `contract_address` is not an address.
    pub fn contract(&self) -> VoteKitResult<Address> {
        Address::parse_from_ffi(&self.contract_address, "contract_address")
    }
}

fn invalid(attribute: &str, reason: impl Into<String>) -> VoteKitError {
    VoteKitError::InvalidInput {
        attribute: attribute.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: &str = "0xb02Cafb1656043F7ae3b1BCc2f5B0d8086d5Df0e";

    fn config() -> PipelineConfig {
        PipelineConfig {
            app_id: "app_0123".to_string(),
            action: "election_vote".to_string(),
            contract_address: CONTRACT.to_string(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_defaults_to_production() {
        let config = config();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(
            config.verify_endpoint(),
            "https://developer.worldcoin.org/api/v1/verify/app_0123"
        );
        assert_eq!(config.http.request_options(), RequestOptions::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_with_overrides() {
        let config = PipelineConfig::from_json(&format!(
            r#"{{
                "app_id": "app_0123",
                "action": "election_vote",
                "contract_address": "{CONTRACT}",
                "verify_url": "http://127.0.0.1:3000/verify",
                "http": {{ "timeout_ms": 250, "max_retries": 0, "allow_insecure_http": true }},
                "confirmation": {{ "max_polls": 2 }}
            }}"#
        ))
        .unwrap();

        assert_eq!(config.verify_endpoint(), "http://127.0.0.1:3000/verify");
        assert_eq!(
            config.http.request_options().timeout,
            Duration::from_millis(250)
        );
        assert_eq!(config.confirmation.max_polls, 2);
    }

    #[test]
    fn test_rejects_insecure_verify_url() {
        let config = PipelineConfig {
            verify_url: Some("http://verify.example.com".to_string()),
            ..config()
        };
        assert!(matches!(
            config.validate(),
            Err(VoteKitError::InvalidInput { ref attribute, .. }) if attribute == "verify_url"
        ));
    }

    #[test]
    fn test_rejects_bad_contract_and_missing_fields() {
        let bad_contract = PipelineConfig {
            contract_address: "0x1234".to_string(),
            ..config()
        };
        assert!(matches!(
            bad_contract.validate(),
            Err(VoteKitError::InvalidInput { ref attribute, .. }) if attribute == "contract_address"
        ));

        let zero = PipelineConfig {
            contract_address: Address::ZERO.to_string(),
            ..config()
        };
        assert!(zero.validate().is_err());

        let no_app = PipelineConfig {
            app_id: " ".to_string(),
            ..config()
        };
        assert!(matches!(
            no_app.validate(),
            Err(VoteKitError::InvalidInput { ref attribute, .. }) if attribute == "app_id"
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            PipelineConfig::from_json("{ not json"),
            Err(VoteKitError::SerializationError(_))
        ));
    }
}
