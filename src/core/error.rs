//! Error types for shadowgate operations.
//!
//! This module defines the canonical error type used throughout shadowgate.
//! All subsystems return `Result<T, GateError>` for error handling.
//!
//! Governance errors carry a stable uppercase code (`E_...`) that is part of
//! the wire contract: callers match on the code, not the phrasing.

use std::io;
use thiserror::Error;

/// Canonical error type for all shadowgate operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
/// Governance variants render as `CODE: message` so scripts can match on the
/// stable prefix.
#[derive(Error, Debug)]
pub enum GateError {
    /// I/O error (auto-converts from `std::io::Error`)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON parse/serialize error (auto-converts from `serde_json::Error`)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required argument or argument group is missing
    #[error("E_ARG_REQUIRED: {0}")]
    ArgRequired(String),

    /// An argument value is malformed or out of range
    #[error("E_ARG_INVALID: {0}")]
    ArgInvalid(String),

    /// Two argument groups that exclude each other were both supplied
    #[error("E_ARG_CONFLICT: {0}")]
    ArgConflict(String),

    /// An argument name is not part of the surface
    #[error("E_ARG_UNKNOWN: {0}")]
    ArgUnknown(String),

    /// No event path was supplied and no fallback env var is set
    #[error("E_EVENT_PATH_REQUIRED: {0}")]
    EventPathRequired(String),

    /// The bundle envelope itself is malformed
    #[error("E_POLICY_BUNDLE_INVALID: {0}")]
    BundleInvalid(String),

    /// `policySha256` does not match the canonical hash of `policy`
    #[error("E_POLICY_BUNDLE_POLICY_HASH_MISMATCH: {0}")]
    BundlePolicyHashMismatch(String),

    /// `policySchemaSha256` does not match the expected schema digest
    #[error("E_POLICY_BUNDLE_SCHEMA_HASH_MISMATCH: {0}")]
    BundleSchemaHashMismatch(String),

    /// Fewer distinct valid signatures than `requiredSignatures`
    #[error("E_POLICY_BUNDLE_SIGNATURES_INVALID: {0}")]
    BundleSignaturesInvalid(String),

    /// The trust store violates a structural invariant
    #[error("E_POLICY_TRUST_STORE_INVALID: {0}")]
    TrustStoreInvalid(String),

    /// A bundle signature resolves to a revoked signer
    #[error("E_POLICY_TRUST_SIGNER_REVOKED: {0}")]
    TrustSignerRevoked(String),

    /// The bundle `createdAt` falls outside a matched signer's validity window
    #[error("E_POLICY_TRUST_SIGNER_OUTSIDE_VALIDITY: {0}")]
    TrustSignerOutsideValidity(String),

    /// A local policy diverges from the org policy on a forbidden path
    #[error("E_POLICY_OVERRIDE_FORBIDDEN: {0}")]
    OverrideForbidden(String),

    /// The override-constraints document is malformed
    #[error("E_OVERRIDE_CONSTRAINTS_INVALID: {0}")]
    OverrideConstraintsInvalid(String),

    /// A policy document fails structural validation
    #[error("E_POLICY_INVALID: {0}")]
    PolicyInvalid(String),

    /// A rule pattern is prone to catastrophic backtracking
    #[error("E_UNSAFE_RULE_REGEX: {0}")]
    UnsafeRuleRegex(String),

    /// A rule pattern does not compile
    #[error("E_INVALID_RULE_REGEX: {0}")]
    InvalidRuleRegex(String),
}

impl GateError {
    /// Stable error code for governance errors; `None` for ambient I/O and
    /// JSON failures, which have no wire contract.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            GateError::Io(_) | GateError::Json(_) => None,
            GateError::ArgRequired(_) => Some("E_ARG_REQUIRED"),
            GateError::ArgInvalid(_) => Some("E_ARG_INVALID"),
            GateError::ArgConflict(_) => Some("E_ARG_CONFLICT"),
            GateError::ArgUnknown(_) => Some("E_ARG_UNKNOWN"),
            GateError::EventPathRequired(_) => Some("E_EVENT_PATH_REQUIRED"),
            GateError::BundleInvalid(_) => Some("E_POLICY_BUNDLE_INVALID"),
            GateError::BundlePolicyHashMismatch(_) => {
                Some("E_POLICY_BUNDLE_POLICY_HASH_MISMATCH")
            }
            GateError::BundleSchemaHashMismatch(_) => {
                Some("E_POLICY_BUNDLE_SCHEMA_HASH_MISMATCH")
            }
            GateError::BundleSignaturesInvalid(_) => Some("E_POLICY_BUNDLE_SIGNATURES_INVALID"),
            GateError::TrustStoreInvalid(_) => Some("E_POLICY_TRUST_STORE_INVALID"),
            GateError::TrustSignerRevoked(_) => Some("E_POLICY_TRUST_SIGNER_REVOKED"),
            GateError::TrustSignerOutsideValidity(_) => {
                Some("E_POLICY_TRUST_SIGNER_OUTSIDE_VALIDITY")
            }
            GateError::OverrideForbidden(_) => Some("E_POLICY_OVERRIDE_FORBIDDEN"),
            GateError::OverrideConstraintsInvalid(_) => Some("E_OVERRIDE_CONSTRAINTS_INVALID"),
            GateError::PolicyInvalid(_) => Some("E_POLICY_INVALID"),
            GateError::UnsafeRuleRegex(_) => Some("E_UNSAFE_RULE_REGEX"),
            GateError::InvalidRuleRegex(_) => Some("E_INVALID_RULE_REGEX"),
        }
    }
}
