//! Sigstore adapter seam.
//!
//! Keyless signing and verification are delegated to an injectable adapter
//! so the core never talks to Fulcio/Rekor itself. The default adapter
//! fails closed: any keyless operation without a wired adapter is a
//! governance error, never a silent pass.

use crate::core::error::GateError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Options handed to the adapter when producing a keyless signature.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeylessSignOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulcio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rekor_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsa_server_url: Option<String>,
    #[serde(default)]
    pub tlog_upload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_token: Option<String>,
}

/// Expected certificate identity for keyless verification. Both fields are
/// exact-match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeylessIdentity {
    pub certificate_issuer: String,
    pub certificate_identity_uri: String,
}

/// Injectable Sigstore interaction.
pub trait SigstoreAdapter {
    /// Produce an opaque signature bundle over the signing payload.
    fn sign(&self, payload: &str, options: &KeylessSignOptions) -> Result<Value, GateError>;

    /// Verify an opaque signature bundle against the payload and the
    /// expected certificate identity.
    fn verify(
        &self,
        bundle: &Value,
        payload: &str,
        identity: &KeylessIdentity,
    ) -> Result<bool, GateError>;
}

/// Default adapter: no Sigstore backend is wired in.
pub struct SigstoreUnavailable;

impl SigstoreAdapter for SigstoreUnavailable {
    fn sign(&self, _payload: &str, _options: &KeylessSignOptions) -> Result<Value, GateError> {
        Err(GateError::BundleInvalid(
            "keyless signing requested but no sigstore adapter is configured".to_string(),
        ))
    }

    fn verify(
        &self,
        _bundle: &Value,
        _payload: &str,
        _identity: &KeylessIdentity,
    ) -> Result<bool, GateError> {
        Err(GateError::BundleInvalid(
            "keyless verification requested but no sigstore adapter is configured".to_string(),
        ))
    }
}
