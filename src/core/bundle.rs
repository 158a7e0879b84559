//! Policy bundle: construction, signing and verification.
//!
//! A bundle binds a policy document's canonical digest, its schema digest
//! and a required-signature quorum into one signed envelope. The signing
//! payload covers the envelope metadata only; the policy content is covered
//! through `policySha256`.
//!
//! Two signature shapes exist: RSA (`rsa-sha256`, v1) and Sigstore keyless
//! (v2). Keyless interaction goes through the injected [`SigstoreAdapter`].

use crate::core::canonical::{hash_json, stable_stringify};
use crate::core::error::GateError;
use crate::core::sigstore::{KeylessIdentity, KeylessSignOptions, SigstoreAdapter};
use crate::core::truststore::{SignerState, TrustSigner, TrustStore};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::Sha256;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

pub const RSA_SHA256_ALGORITHM: &str = "rsa-sha256";
pub const KEYLESS_SIGNATURE_TYPE: &str = "sigstore-keyless";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyBundle {
    pub schema_version: u8,
    pub created_at: String,
    pub policy_schema_path: String,
    pub policy_schema_sha256: String,
    pub policy_sha256: String,
    pub required_signatures: u32,
    pub policy: Value,
    pub signatures: Vec<BundleSignature>,
}

/// Detached signature entry. The keyless shape is tried first; it is the
/// only one carrying `signatureType`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BundleSignature {
    #[serde(rename_all = "camelCase")]
    Keyless {
        signature_type: String,
        signer_id: String,
        bundle: Value,
    },
    #[serde(rename_all = "camelCase")]
    Rsa {
        key_id: String,
        algorithm: String,
        signature: String,
    },
}

impl BundleSignature {
    /// Slot identity: a signer occupies at most one signature slot.
    pub fn slot_id(&self) -> &str {
        match self {
            BundleSignature::Keyless { signer_id, .. } => signer_id,
            BundleSignature::Rsa { key_id, .. } => key_id,
        }
    }
}

/// Successful verification outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    /// Distinct signer identities whose signatures verified, sorted.
    pub valid_signatures: Vec<String>,
    pub required_signatures: u32,
}

fn is_hex64(raw: &str) -> bool {
    raw.len() == 64 && raw.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

impl PolicyBundle {
    pub fn from_value(value: &Value) -> Result<PolicyBundle, GateError> {
        let bundle: PolicyBundle = serde_json::from_value(value.clone())
            .map_err(|e| GateError::BundleInvalid(format!("bundle does not parse: {}", e)))?;
        bundle.validate()?;
        Ok(bundle)
    }

    pub fn validate(&self) -> Result<(), GateError> {
        if !(1..=2).contains(&self.schema_version) {
            return Err(GateError::BundleInvalid(format!(
                "schemaVersion must be 1 or 2 (got {})",
                self.schema_version
            )));
        }
        if self.created_at.trim().is_empty() {
            return Err(GateError::BundleInvalid(
                "createdAt must be non-empty".to_string(),
            ));
        }
        if !is_hex64(&self.policy_schema_sha256) {
            return Err(GateError::BundleInvalid(
                "policySchemaSha256 must be 64 lowercase hex chars".to_string(),
            ));
        }
        if !is_hex64(&self.policy_sha256) {
            return Err(GateError::BundleInvalid(
                "policySha256 must be 64 lowercase hex chars".to_string(),
            ));
        }
        if self.required_signatures < 1 {
            return Err(GateError::BundleInvalid(
                "requiredSignatures must be >= 1".to_string(),
            ));
        }
        if !self.policy.is_object() {
            return Err(GateError::BundleInvalid(
                "policy must be an object".to_string(),
            ));
        }
        for signature in &self.signatures {
            match signature {
                BundleSignature::Rsa { algorithm, .. } => {
                    if algorithm != RSA_SHA256_ALGORITHM {
                        return Err(GateError::BundleInvalid(format!(
                            "unsupported signature algorithm '{}'",
                            algorithm
                        )));
                    }
                }
                BundleSignature::Keyless {
                    signature_type,
                    bundle,
                    ..
                } => {
                    if signature_type != KEYLESS_SIGNATURE_TYPE {
                        return Err(GateError::BundleInvalid(format!(
                            "unsupported signatureType '{}'",
                            signature_type
                        )));
                    }
                    if self.schema_version < 2 {
                        return Err(GateError::BundleInvalid(
                            "keyless signatures require schemaVersion 2".to_string(),
                        ));
                    }
                    if !bundle.is_object() {
                        return Err(GateError::BundleInvalid(
                            "keyless signature bundle must be an object".to_string(),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Canonical signing payload: envelope metadata only. The policy is
    /// covered through its digest.
    pub fn signing_payload(&self) -> String {
        stable_stringify(&json!({
            "schemaVersion": self.schema_version,
            "createdAt": self.created_at,
            "policySchemaPath": self.policy_schema_path,
            "policySchemaSha256": self.policy_schema_sha256,
            "policySha256": self.policy_sha256,
            "requiredSignatures": self.required_signatures,
        }))
    }

    fn replace_slot(&mut self, signature: BundleSignature) {
        self.signatures
            .retain(|s| s.slot_id() != signature.slot_id());
        self.signatures.push(signature);
    }
}

/// Build an unsigned bundle for a policy document.
pub fn build_template(
    policy: &Value,
    schema_path: &str,
    schema_sha256: &str,
    required_signatures: u32,
    created_at: &str,
    schema_version: u8,
) -> Result<PolicyBundle, GateError> {
    if !policy.is_object() {
        return Err(GateError::BundleInvalid(
            "policy must be an object".to_string(),
        ));
    }
    let bundle = PolicyBundle {
        schema_version,
        created_at: created_at.to_string(),
        policy_schema_path: schema_path.to_string(),
        policy_schema_sha256: schema_sha256.to_string(),
        policy_sha256: hash_json(policy),
        required_signatures,
        policy: policy.clone(),
        signatures: Vec::new(),
    };
    bundle.validate()?;
    Ok(bundle)
}

fn parse_public_key(pem: &str) -> Result<RsaPublicKey, GateError> {
    if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
        return Ok(key);
    }
    RsaPublicKey::from_pkcs1_pem(pem)
        .map_err(|e| GateError::BundleInvalid(format!("public key does not parse: {}", e)))
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, GateError> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    RsaPrivateKey::from_pkcs1_pem(pem)
        .map_err(|e| GateError::BundleInvalid(format!("private key does not parse: {}", e)))
}

/// Sign the bundle with an RSA key (`RSASSA-PKCS1-v1_5` over SHA-256).
/// Re-signing with the same `keyId` replaces that signer's slot.
pub fn sign_rsa(
    bundle: &mut PolicyBundle,
    key_id: &str,
    private_key_pem: &str,
) -> Result<(), GateError> {
    let key = parse_private_key(private_key_pem)?;
    let signing_key = SigningKey::<Sha256>::new(key);
    let signature = signing_key
        .try_sign(bundle.signing_payload().as_bytes())
        .map_err(|e| GateError::BundleInvalid(format!("RSA signing failed: {}", e)))?;
    bundle.replace_slot(BundleSignature::Rsa {
        key_id: key_id.to_string(),
        algorithm: RSA_SHA256_ALGORITHM.to_string(),
        signature: BASE64.encode(signature.to_bytes()),
    });
    Ok(())
}

/// Sign the bundle through the keyless adapter (v2 bundles only). Fails
/// closed when the adapter returns anything but an object.
pub fn sign_keyless(
    bundle: &mut PolicyBundle,
    signer_id: &str,
    adapter: &dyn SigstoreAdapter,
    options: &KeylessSignOptions,
) -> Result<(), GateError> {
    if bundle.schema_version < 2 {
        return Err(GateError::BundleInvalid(
            "keyless signatures require schemaVersion 2".to_string(),
        ));
    }
    let opaque = adapter.sign(&bundle.signing_payload(), options)?;
    if !opaque.is_object() {
        return Err(GateError::BundleInvalid(
            "sigstore adapter returned a malformed bundle".to_string(),
        ));
    }
    bundle.replace_slot(BundleSignature::Keyless {
        signature_type: KEYLESS_SIGNATURE_TYPE.to_string(),
        signer_id: signer_id.to_string(),
        bundle: opaque,
    });
    Ok(())
}

fn rsa_signature_is_valid(pem: &str, payload: &str, signature_b64: &str) -> bool {
    let key = match parse_public_key(pem) {
        Ok(key) => key,
        Err(e) => {
            warn!(error = %e, "skipping signature with unparseable public key");
            return false;
        }
    };
    let bytes = match BASE64.decode(signature_b64) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let signature = match Signature::try_from(bytes.as_slice()) {
        Ok(signature) => signature,
        Err(_) => return false,
    };
    VerifyingKey::<Sha256>::new(key)
        .verify(payload.as_bytes(), &signature)
        .is_ok()
}

fn check_integrity(bundle: &PolicyBundle, expected_schema_sha256: &str) -> Result<(), GateError> {
    let recomputed = hash_json(&bundle.policy);
    if recomputed != bundle.policy_sha256 {
        return Err(GateError::BundlePolicyHashMismatch(format!(
            "policySha256 is {} but canonical policy hash is {}",
            bundle.policy_sha256, recomputed
        )));
    }
    if bundle.policy_schema_sha256 != expected_schema_sha256 {
        return Err(GateError::BundleSchemaHashMismatch(format!(
            "policySchemaSha256 is {} but expected {}",
            bundle.policy_schema_sha256, expected_schema_sha256
        )));
    }
    Ok(())
}

fn check_quorum(
    valid: BTreeSet<String>,
    required_signatures: u32,
) -> Result<VerifyOutcome, GateError> {
    if (valid.len() as u32) < required_signatures {
        return Err(GateError::BundleSignaturesInvalid(format!(
            "{} distinct valid signature(s), {} required",
            valid.len(),
            required_signatures
        )));
    }
    Ok(VerifyOutcome {
        valid_signatures: valid.into_iter().collect(),
        required_signatures,
    })
}

/// Direct verification against a `keyId -> public key PEM` map.
pub fn verify(
    bundle: &PolicyBundle,
    trusted_keys: &BTreeMap<String, String>,
    expected_schema_sha256: &str,
) -> Result<VerifyOutcome, GateError> {
    bundle.validate()?;
    check_integrity(bundle, expected_schema_sha256)?;

    let payload = bundle.signing_payload();
    let mut valid = BTreeSet::new();
    for signature in &bundle.signatures {
        let BundleSignature::Rsa {
            key_id, signature, ..
        } = signature
        else {
            debug!("direct verification skips keyless signatures");
            continue;
        };
        let Some(pem) = trusted_keys.get(key_id) else {
            debug!(key_id = %key_id, "signature key not in trusted set");
            continue;
        };
        if rsa_signature_is_valid(pem, &payload, signature) {
            valid.insert(key_id.clone());
        }
    }
    check_quorum(valid, bundle.required_signatures)
}

/// Identity material a keyless signature exposes for signer resolution.
fn keyless_identity_hint(opaque: &Value) -> Option<(String, String)> {
    let issuer = opaque.get("certificateIssuer")?.as_str()?;
    let identity = opaque.get("certificateIdentityURI")?.as_str()?;
    Some((issuer.to_string(), identity.to_string()))
}

/// Trust-store verification.
///
/// Signatures that resolve to no signer are skipped (they never loosen the
/// quorum); a signature resolving to a revoked signer is fatal even when
/// other signatures would satisfy the quorum.
pub fn verify_with_trust_store(
    bundle: &PolicyBundle,
    store: &TrustStore,
    expected_schema_sha256: &str,
    adapter: &dyn SigstoreAdapter,
) -> Result<VerifyOutcome, GateError> {
    bundle.validate()?;
    store.validate()?;
    check_integrity(bundle, expected_schema_sha256)?;

    let by_natural_key: BTreeMap<String, &TrustSigner> = store
        .signers
        .iter()
        .map(|s| (s.natural_key(), s))
        .collect();

    let payload = bundle.signing_payload();
    let mut valid = BTreeSet::new();
    for signature in &bundle.signatures {
        let natural_key = match signature {
            BundleSignature::Rsa { key_id, .. } => format!("rsa:{}", key_id),
            BundleSignature::Keyless { bundle: opaque, .. } => {
                match keyless_identity_hint(opaque) {
                    Some((issuer, identity)) => {
                        format!("keyless:{}\u{1f}{}", issuer, identity)
                    }
                    None => {
                        debug!(
                            signer_id = signature.slot_id(),
                            "keyless signature exposes no certificate identity"
                        );
                        continue;
                    }
                }
            }
        };
        let Some(signer) = by_natural_key.get(&natural_key) else {
            debug!(slot = signature.slot_id(), "signature matches no signer");
            continue;
        };

        if store.lifecycle_enabled() {
            match signer.state() {
                SignerState::Revoked => {
                    return Err(GateError::TrustSignerRevoked(format!(
                        "signature '{}' resolves to revoked signer '{}'",
                        signature.slot_id(),
                        signer.id()
                    )));
                }
                SignerState::Retired => {
                    debug!(signer = signer.id(), "retired signer skipped");
                    continue;
                }
                SignerState::Active => {}
            }
        }
        store.check_validity_window(signer, &bundle.created_at)?;

        let verified = match (signature, signer) {
            (
                BundleSignature::Rsa { signature, .. },
                TrustSigner::RsaKey { public_key_pem, .. },
            ) => rsa_signature_is_valid(public_key_pem, &payload, signature),
            (
                BundleSignature::Keyless { bundle: opaque, .. },
                TrustSigner::Keyless {
                    certificate_issuer,
                    certificate_identity_uri,
                    ..
                },
            ) => {
                let identity = KeylessIdentity {
                    certificate_issuer: certificate_issuer.clone(),
                    certificate_identity_uri: certificate_identity_uri.clone(),
                };
                match adapter.verify(opaque, &payload, &identity) {
                    Ok(ok) => ok,
                    Err(e) => {
                        warn!(signer = signer.id(), error = %e, "keyless verification failed");
                        false
                    }
                }
            }
            // Natural keys are type-prefixed, so this arm is unreachable.
            _ => false,
        };
        if verified {
            valid.insert(signer.id().to_string());
        }
    }
    check_quorum(valid, bundle.required_signatures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_template_anchors_policy_hash() {
        let policy = json!({"version": 1, "enforcement": "block"});
        let bundle = build_template(
            &policy,
            "schemas/policy.schema.json",
            &"a".repeat(64),
            1,
            "2026-01-15T00:00:00Z",
            1,
        )
        .unwrap();
        assert_eq!(bundle.policy_sha256, hash_json(&policy));
        assert!(bundle.signatures.is_empty());
    }

    #[test]
    fn test_signing_payload_excludes_policy_content() {
        let policy = json!({"version": 1, "enforcement": "block"});
        let bundle = build_template(
            &policy,
            "schemas/policy.schema.json",
            &"a".repeat(64),
            1,
            "2026-01-15T00:00:00Z",
            1,
        )
        .unwrap();
        let payload = bundle.signing_payload();
        assert!(payload.contains(&bundle.policy_sha256));
        assert!(!payload.contains("enforcement"));
    }

    #[test]
    fn test_keyless_signature_shape_deserializes() {
        let raw = json!({
            "signatureType": "sigstore-keyless",
            "signerId": "release-keyless",
            "bundle": {"certificateIssuer": "i", "certificateIdentityURI": "u"}
        });
        let signature: BundleSignature = serde_json::from_value(raw).unwrap();
        assert!(matches!(signature, BundleSignature::Keyless { .. }));
        assert_eq!(signature.slot_id(), "release-keyless");
    }

    #[test]
    fn test_rsa_signature_shape_deserializes() {
        let raw = json!({
            "keyId": "release-key",
            "algorithm": "rsa-sha256",
            "signature": "c2ln"
        });
        let signature: BundleSignature = serde_json::from_value(raw).unwrap();
        assert!(matches!(signature, BundleSignature::Rsa { .. }));
        assert_eq!(signature.slot_id(), "release-key");
    }

    #[test]
    fn test_requires_at_least_one_signature_slot() {
        let policy = json!({"version": 1});
        let err = build_template(&policy, "p", &"b".repeat(64), 0, "2026-01-15T00:00:00Z", 1)
            .unwrap_err();
        assert_eq!(err.code(), Some("E_POLICY_BUNDLE_INVALID"));
    }

    #[test]
    fn test_keyless_rejected_on_v1_bundle() {
        let policy = json!({"version": 1});
        let mut bundle =
            build_template(&policy, "p", &"b".repeat(64), 1, "2026-01-15T00:00:00Z", 1).unwrap();
        bundle.signatures.push(BundleSignature::Keyless {
            signature_type: KEYLESS_SIGNATURE_TYPE.to_string(),
            signer_id: "release-keyless".to_string(),
            bundle: json!({}),
        });
        let err = bundle.validate().unwrap_err();
        assert!(format!("{}", err).contains("schemaVersion 2"));
    }
}
