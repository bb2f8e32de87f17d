//! `votekit`: developer CLI to decode, verify and submit World ID vote proofs.
//!
//! ```text
//! votekit decode --proof proof.json
//! votekit hash --app-id app_0123 --action election_vote --signal 0x57b9...
//! VOTEKIT_RPC_URL=... VOTEKIT_PRIVATE_KEY=... votekit submit --config votekit.json --proof proof.json
//! ```

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Args, Parser, Subcommand};
use eyre::{bail, Context as _, Result};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use votekit_core::{
    ActionContext, CredentialType, DecodedProof, Environment, FieldDecoder, PipelineConfig,
    ProofBundle, StaticWidget, SubmissionPipeline, TrackerState,
};

mod rpc;

use rpc::RpcChainClient;

#[derive(Debug, Parser)]
#[command(
    name = "votekit",
    version,
    about = "Submit World ID proofs to a one-person-one-vote contract"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode a proof bundle into its contract ABI values.
    Decode {
        /// Proof bundle JSON as returned by the identity widget.
        #[arg(long)]
        proof: PathBuf,
    },
    /// Print the external nullifier and signal hash the identity widget is opened with.
    Hash {
        #[arg(long, env = "VOTEKIT_APP_ID")]
        app_id: String,
        #[arg(long)]
        action: String,
        #[arg(long)]
        signal: String,
    },
    /// Re-verify a proof bundle, submit it and track the transaction.
    Submit(SubmitArgs),
}

#[derive(Debug, Args)]
struct SubmitArgs {
    /// Proof bundle JSON as returned by the identity widget.
    #[arg(long)]
    proof: PathBuf,
    /// Pipeline configuration JSON; flags below override its values.
    #[arg(long, env = "VOTEKIT_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "VOTEKIT_APP_ID")]
    app_id: Option<String>,
    #[arg(long)]
    action: Option<String>,
    /// Signal the proof was generated for. Defaults to the caller address.
    #[arg(long)]
    signal: Option<String>,
    /// Wallet address the vote is cast for. Defaults to the signer address.
    #[arg(long)]
    caller: Option<String>,
    #[arg(long, env = "VOTEKIT_CONTRACT")]
    contract: Option<String>,
    /// `staging` or `production`.
    #[arg(long, env = "VOTEKIT_ENVIRONMENT")]
    environment: Option<Environment>,
    #[arg(long, env = "VOTEKIT_VERIFY_URL")]
    verify_url: Option<String>,
    /// Allow a plain http verify URL (local development).
    #[arg(long)]
    allow_insecure_http: bool,
    #[arg(long, env = "VOTEKIT_RPC_URL")]
    rpc_url: String,
    #[arg(long, env = "VOTEKIT_PRIVATE_KEY", hide_env_values = true)]
    private_key: String,
    /// Credential types accepted for this action (`orb`, `phone`). Defaults to `orb`.
    #[arg(long = "credential-type")]
    credential_types: Vec<CredentialType>,
    /// Block explorer used to print a link to the transaction.
    #[arg(long, env = "VOTEKIT_EXPLORER_URL")]
    explorer_url: Option<String>,
    /// Return right after broadcast instead of waiting for confirmation.
    #[arg(long)]
    no_wait: bool,
}

impl SubmitArgs {
    fn config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .wrap_err_with(|| format!("failed to read {}", path.display()))?;
                serde_json::from_str(&raw).wrap_err("invalid pipeline configuration")?
            }
            None => PipelineConfig::default(),
        };

        if let Some(app_id) = &self.app_id {
            config.app_id.clone_from(app_id);
        }
        if let Some(action) = &self.action {
            config.action.clone_from(action);
        }
        if let Some(contract) = &self.contract {
            config.contract_address.clone_from(contract);
        }
        if let Some(environment) = self.environment {
            config.environment = environment;
        }
        if self.verify_url.is_some() {
            config.verify_url.clone_from(&self.verify_url);
        }
        if self.allow_insecure_http {
            config.http.allow_insecure_http = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn read_bundle(path: &Path) -> Result<ProofBundle> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    Ok(ProofBundle::from_json(&raw)?)
}

fn decode(proof: &Path) -> Result<()> {
    let bundle = read_bundle(proof)?;
    let decoded = DecodedProof::decode(&FieldDecoder::default(), &bundle)?;
    let output = json!({
        "merkle_root": decoded.merkle_root,
        "nullifier_hash": decoded.nullifier_hash,
        "proof": decoded.to_hex_words(),
        "credential_type": bundle.credential_type(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn hash(app_id: &str, action: &str, signal: &str) -> Result<()> {
    let context = ActionContext::new(app_id, action, signal);
    let output = json!({
        "external_nullifier": context.external_nullifier(),
        "signal_hash": context.signal_hash(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn submit(args: SubmitArgs) -> Result<()> {
    let config = args.config()?;
    let bundle = read_bundle(&args.proof)?;

    let chain = Arc::new(RpcChainClient::new(&args.rpc_url, &args.private_key)?);
    let caller = args
        .caller
        .clone()
        .unwrap_or_else(|| chain.signer_address().to_string());
    let signal = args.signal.clone().unwrap_or_else(|| caller.clone());
    tracing::info!(
        "submitting for {caller} to {} via {}",
        config.contract_address,
        config.verify_endpoint()
    );

    let pipeline = SubmissionPipeline::from_config(&config, chain)?;
    let context = ActionContext::new(&config.app_id, &config.action, &signal);
    let Some(handle) = pipeline
        .acquire_and_submit(
            &StaticWidget::new(bundle),
            &context,
            &args.credential_types,
            Some(&caller),
        )
        .await
        .map_err(|err| eyre::eyre!("{err} (next step: {:?})", err.user_action()))?
    else {
        bail!("proof credential type is not accepted for this action");
    };

    let TrackerState::Submitted(tx) = handle.state() else {
        bail!("unexpected tracker state {:?}", handle.state());
    };
    println!("submitted {tx}");
    if let Some(link) = args
        .explorer_url
        .as_deref()
        .and_then(|base| handle.submission().status.explorer_url(base))
    {
        println!("{link}");
    }
    if args.no_wait {
        return Ok(());
    }

    match handle.wait().await {
        Ok(tx) => {
            println!("confirmed {tx}");
            Ok(())
        }
        Err(err) => bail!("{err} (next step: {:?})", err.user_action()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Decode { proof } => decode(&proof),
        Command::Hash {
            app_id,
            action,
            signal,
        } => hash(&app_id, &action, &signal),
        Command::Submit(args) => submit(args).await,
    }
}
