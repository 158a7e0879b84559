//! Shadowgate: a policy-driven governance gate for code-review events.
//!
//! Given a webhook-shaped event, a signed policy bundle and runtime
//! credentials, shadowgate decides `pass | warn | block` and emits a
//! deterministic machine-readable report.
//!
//! # Core Principles
//!
//! - **Stateless**: every invocation is a pure function over its inputs
//!   plus one bounded network query for approval state
//! - **Deterministic**: reports replay byte-for-byte through a canonical
//!   projection; drift is itself a blocking finding
//! - **Fail-closed**: governance input errors abort before a report is
//!   written; runtime event errors always become blocking findings
//! - **Provider-abstracted**: GitHub-, GitLab- and Bitbucket-style events
//!   flow through one extraction and approval contract
//!
//! # Crate Structure
//!
//! - [`core`]: canonical codec, policy model, bundle and trust
//!   verification, override merge, exceptions, reports
//! - [`providers`]: the three event adapters and the shared HTTP retry
//!   engine
//! - [`engine`]: guard evaluator, approval stage, seven-domain risk engine
//! - [`driver`]: the runtime orchestration (policy -> event -> report)

pub mod core;
pub mod driver;
pub mod engine;
pub mod providers;

mod cli;

pub use driver::{DriverDeps, RunOptions, RunOutcome, run_gate};

use crate::cli::{BundleCommand, Cli, Command, TrustCommand};
use crate::core::bundle::{self, PolicyBundle};
use crate::core::canonical::sha256_hex;
use crate::core::error::GateError;
use crate::core::report::{ReportFormat, render_markdown};
use crate::core::sigstore::SigstoreUnavailable;
use crate::core::truststore::TrustStore;
use crate::providers::http::ReqwestClient;
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Parse the command line and execute. Returns the process exit code.
pub fn run() -> i32 {
    let cli = Cli::parse();
    match execute(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{}", error);
            1
        }
    }
}

fn execute(cli: Cli) -> Result<i32, GateError> {
    match cli.command {
        Command::Evaluate(args) => run_evaluate(args),
        Command::Bundle(args) => match args.command {
            BundleCommand::Create {
                policy,
                policy_schema,
                required_signatures,
                schema_version,
                out,
            } => run_bundle_create(
                &policy,
                &policy_schema,
                required_signatures,
                schema_version,
                &out,
            ),
            BundleCommand::Sign {
                bundle,
                key_id,
                private_key,
                out,
            } => run_bundle_sign(&bundle, &key_id, &private_key, out.as_deref()),
            BundleCommand::Verify {
                bundle,
                policy_schema,
                public_key,
                trust_store,
            } => run_bundle_verify(&bundle, &policy_schema, &public_key, trust_store.as_deref()),
        },
        Command::Trust(args) => match args.command {
            TrustCommand::Validate { store } => run_trust_validate(&store),
        },
    }
}

fn run_evaluate(args: cli::EvaluateCli) -> Result<i32, GateError> {
    let report_format = args
        .report_format
        .as_deref()
        .map(ReportFormat::parse)
        .transpose()?;
    let options = RunOptions {
        policy: args.policy,
        policy_bundle: args.policy_bundle,
        policy_schema: args.policy_schema,
        policy_public_keys: args.policy_public_key,
        policy_trust_store: args.policy_trust_store,
        org_policy: args.org_policy,
        local_policy: args.local_policy,
        override_constraints: args.override_constraints,
        event: args.event,
        event_name: args.event_name,
        provider: args.provider,
        report: args.report,
        report_format,
        replay_report: args.replay_report,
        redact: args.redact,
    };

    let env: BTreeMap<String, String> = std::env::vars().collect();
    let http = ReqwestClient::new();
    let sigstore = SigstoreUnavailable;
    let deps = DriverDeps {
        env: &env,
        http: &http,
        sigstore: &sigstore,
        now: Utc::now(),
    };

    let outcome = run_gate(&options, &deps)?;
    print!("{}", render_markdown(&outcome.report, args.color));
    for path in &outcome.written {
        eprintln!("report written: {}", path.display());
    }
    Ok(outcome.exit_code)
}

fn read_json_file(path: &Path, describe: &str) -> Result<Value, GateError> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| {
        GateError::ArgInvalid(format!("{} at {} is not JSON: {}", describe, path.display(), e))
    })
}

fn write_json_file(path: &Path, value: &Value) -> Result<(), GateError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    fs::write(path, text)?;
    Ok(())
}

fn run_bundle_create(
    policy_path: &Path,
    schema_path: &Path,
    required_signatures: u32,
    schema_version: u8,
    out: &Path,
) -> Result<i32, GateError> {
    let policy = read_json_file(policy_path, "policy")?;
    let schema_sha = sha256_hex(fs::read_to_string(schema_path)?.as_bytes());
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let bundle = bundle::build_template(
        &policy,
        &schema_path.to_string_lossy(),
        &schema_sha,
        required_signatures,
        &created_at,
        schema_version,
    )?;
    write_json_file(out, &serde_json::to_value(&bundle)?)?;
    println!("bundle template written: {}", out.display());
    Ok(0)
}

fn run_bundle_sign(
    bundle_path: &Path,
    key_id: &str,
    private_key_path: &Path,
    out: Option<&Path>,
) -> Result<i32, GateError> {
    let doc = read_json_file(bundle_path, "bundle")?;
    let mut bundle = PolicyBundle::from_value(&doc)?;
    let pem = fs::read_to_string(private_key_path)?;
    bundle::sign_rsa(&mut bundle, key_id, &pem)?;
    let out = out.unwrap_or(bundle_path);
    write_json_file(out, &serde_json::to_value(&bundle)?)?;
    println!("bundle signed by '{}': {}", key_id, out.display());
    Ok(0)
}

fn run_bundle_verify(
    bundle_path: &Path,
    schema_path: &Path,
    public_keys: &[String],
    trust_store: Option<&Path>,
) -> Result<i32, GateError> {
    if !public_keys.is_empty() && trust_store.is_some() {
        return Err(GateError::ArgConflict(
            "--public-key conflicts with --trust-store".to_string(),
        ));
    }
    let doc = read_json_file(bundle_path, "bundle")?;
    let bundle_parsed = PolicyBundle::from_value(&doc)?;
    let expected_schema_sha = sha256_hex(fs::read_to_string(schema_path)?.as_bytes());

    let outcome = if let Some(store_path) = trust_store {
        let store = TrustStore::from_value(&read_json_file(store_path, "trust store")?)?;
        bundle::verify_with_trust_store(
            &bundle_parsed,
            &store,
            &expected_schema_sha,
            &SigstoreUnavailable,
        )?
    } else {
        if public_keys.is_empty() {
            return Err(GateError::ArgRequired(
                "either --public-key or --trust-store is required".to_string(),
            ));
        }
        let mut keys = BTreeMap::new();
        for entry in public_keys {
            let Some((key_id, path)) = entry.split_once('=') else {
                return Err(GateError::ArgInvalid(format!(
                    "--public-key expects keyId=path (got '{}')",
                    entry
                )));
            };
            keys.insert(key_id.to_string(), fs::read_to_string(PathBuf::from(path))?);
        }
        bundle::verify(&bundle_parsed, &keys, &expected_schema_sha)?
    };
    println!(
        "bundle verified: {} valid signature(s) [{}], {} required",
        outcome.valid_signatures.len(),
        outcome.valid_signatures.join(", "),
        outcome.required_signatures
    );
    Ok(0)
}

fn run_trust_validate(store_path: &Path) -> Result<i32, GateError> {
    let store = TrustStore::from_value(&read_json_file(store_path, "trust store")?)?;
    println!(
        "trust store valid: {} signer(s), schema v{}",
        store.signers.len(),
        store.schema_version
    );
    Ok(0)
}
