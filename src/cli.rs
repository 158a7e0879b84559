//! CLI struct definitions for the shadowgate command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "shadowgate",
    version = env!("CARGO_PKG_VERSION"),
    about = "Shadowgate is a policy-driven governance gate for code-review events: signed policy bundles in, deterministic pass/warn/block reports out. 🦀",
    disable_version_flag = true
)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Evaluate a code-review event against a policy.
    Evaluate(EvaluateCli),
    /// Create, sign and verify policy bundles.
    Bundle(BundleCli),
    /// Trust-store utilities.
    Trust(TrustCli),
}

#[derive(clap::Args, Debug)]
pub(crate) struct EvaluateCli {
    /// Plain policy JSON file.
    #[clap(long)]
    pub policy: Option<PathBuf>,
    /// Signed policy bundle (requires --policy-schema and a key source).
    #[clap(long)]
    pub policy_bundle: Option<PathBuf>,
    /// Policy schema file whose digest the bundle must match.
    #[clap(long)]
    pub policy_schema: Option<PathBuf>,
    /// Trusted RSA key as keyId=path; repeatable.
    #[clap(long = "policy-public-key")]
    pub policy_public_key: Vec<String>,
    /// Trust store with signer lifecycle metadata.
    #[clap(long)]
    pub policy_trust_store: Option<PathBuf>,
    /// Organization policy for constrained merging.
    #[clap(long)]
    pub org_policy: Option<PathBuf>,
    /// Local policy overriding the org policy on allowed paths.
    #[clap(long)]
    pub local_policy: Option<PathBuf>,
    /// Override-constraints file (defaults apply when omitted).
    #[clap(long)]
    pub override_constraints: Option<PathBuf>,
    /// Webhook event JSON (falls back to GITHUB_EVENT_PATH).
    #[clap(long)]
    pub event: Option<PathBuf>,
    /// Event name (falls back to GITHUB_EVENT_NAME).
    #[clap(long)]
    pub event_name: Option<String>,
    /// Source-control provider.
    #[clap(long, default_value = "github")]
    pub provider: String,
    /// Report output path.
    #[clap(long)]
    pub report: Option<PathBuf>,
    /// Report format: json, md, sarif or all.
    #[clap(long)]
    pub report_format: Option<String>,
    /// Baseline report for replay drift detection.
    #[clap(long)]
    pub replay_report: Option<PathBuf>,
    /// Replace target bodies with hashes in the report.
    #[clap(long)]
    pub redact: bool,
    /// ANSI color in terminal output.
    #[clap(long)]
    pub color: bool,
}

#[derive(clap::Args, Debug)]
pub(crate) struct BundleCli {
    #[clap(subcommand)]
    pub command: BundleCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum BundleCommand {
    /// Build an unsigned bundle template for a policy.
    Create {
        /// Policy JSON file.
        #[clap(long)]
        policy: PathBuf,
        /// Policy schema file (its digest is embedded).
        #[clap(long)]
        policy_schema: PathBuf,
        /// Required signature quorum.
        #[clap(long, default_value_t = 1)]
        required_signatures: u32,
        /// Bundle schema version (2 enables keyless signatures).
        #[clap(long, default_value_t = 1)]
        schema_version: u8,
        /// Output path.
        #[clap(long)]
        out: PathBuf,
    },
    /// Add an RSA signature to a bundle.
    Sign {
        /// Bundle file to sign.
        #[clap(long)]
        bundle: PathBuf,
        /// Key id recorded in the signature slot.
        #[clap(long)]
        key_id: String,
        /// RSA private key PEM.
        #[clap(long)]
        private_key: PathBuf,
        /// Output path (defaults to in-place).
        #[clap(long)]
        out: Option<PathBuf>,
    },
    /// Verify a bundle's signatures and digests.
    Verify {
        /// Bundle file to verify.
        #[clap(long)]
        bundle: PathBuf,
        /// Policy schema file whose digest the bundle must match.
        #[clap(long)]
        policy_schema: PathBuf,
        /// Trusted RSA key as keyId=path; repeatable.
        #[clap(long = "public-key")]
        public_key: Vec<String>,
        /// Trust store with signer lifecycle metadata.
        #[clap(long)]
        trust_store: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct TrustCli {
    #[clap(subcommand)]
    pub command: TrustCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum TrustCommand {
    /// Validate a trust store's structural invariants.
    Validate {
        /// Trust store JSON file.
        #[clap(long)]
        store: PathBuf,
    },
}
