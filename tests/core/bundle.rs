use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use serde_json::json;
use shadowgate::core::bundle::{
    build_template, sign_keyless, sign_rsa, verify, verify_with_trust_store,
};
use shadowgate::core::canonical::{hash_json, sha256_hex};
use shadowgate::core::error::GateError;
use shadowgate::core::sigstore::{KeylessIdentity, KeylessSignOptions, SigstoreAdapter};
use shadowgate::core::truststore::TrustStore;
use std::collections::BTreeMap;

const SCHEMA_TEXT: &str = "{\"$id\": \"policy.schema.json\"}\n";

fn schema_sha() -> String {
    sha256_hex(SCHEMA_TEXT.as_bytes())
}

fn sample_policy() -> serde_json::Value {
    json!({
        "version": 1,
        "enforcement": "block",
        "disclosureTag": "[ai-assisted]",
        "rules": [{"name": "llm", "pattern": "generated by", "action": "score"}]
    })
}

fn generate_keypair() -> (String, String) {
    let private = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    let public = private.to_public_key();
    (
        private.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
        public.to_public_key_pem(LineEnding::LF).unwrap(),
    )
}

#[test]
fn test_template_policy_hash_matches_canonical_hash() {
    let policy = sample_policy();
    let bundle = build_template(
        &policy,
        "schemas/policy.schema.json",
        &schema_sha(),
        1,
        "2026-02-01T00:00:00Z",
        1,
    )
    .unwrap();
    assert_eq!(bundle.policy_sha256, hash_json(&policy));
}

#[test]
fn test_sign_then_verify_round_trip() {
    let (private_pem, public_pem) = generate_keypair();
    let mut bundle = build_template(
        &sample_policy(),
        "schemas/policy.schema.json",
        &schema_sha(),
        1,
        "2026-02-01T00:00:00Z",
        1,
    )
    .unwrap();
    sign_rsa(&mut bundle, "release-key", &private_pem).unwrap();

    let mut keys = BTreeMap::new();
    keys.insert("release-key".to_string(), public_pem);
    let outcome = verify(&bundle, &keys, &schema_sha()).unwrap();
    assert_eq!(outcome.valid_signatures, vec!["release-key".to_string()]);
}

#[test]
fn test_resigning_replaces_the_signer_slot() {
    let (private_pem, _) = generate_keypair();
    let mut bundle = build_template(
        &sample_policy(),
        "schemas/policy.schema.json",
        &schema_sha(),
        1,
        "2026-02-01T00:00:00Z",
        1,
    )
    .unwrap();
    sign_rsa(&mut bundle, "release-key", &private_pem).unwrap();
    sign_rsa(&mut bundle, "release-key", &private_pem).unwrap();
    assert_eq!(bundle.signatures.len(), 1);
}

#[test]
fn test_tampered_policy_fails_hash_check() {
    let (private_pem, public_pem) = generate_keypair();
    let mut bundle = build_template(
        &sample_policy(),
        "schemas/policy.schema.json",
        &schema_sha(),
        1,
        "2026-02-01T00:00:00Z",
        1,
    )
    .unwrap();
    sign_rsa(&mut bundle, "release-key", &private_pem).unwrap();
    bundle.policy["enforcement"] = json!("warn");

    let mut keys = BTreeMap::new();
    keys.insert("release-key".to_string(), public_pem);
    let err = verify(&bundle, &keys, &schema_sha()).unwrap_err();
    assert_eq!(err.code(), Some("E_POLICY_BUNDLE_POLICY_HASH_MISMATCH"));
}

#[test]
fn test_schema_digest_mismatch_rejected() {
    let (private_pem, public_pem) = generate_keypair();
    let mut bundle = build_template(
        &sample_policy(),
        "schemas/policy.schema.json",
        &schema_sha(),
        1,
        "2026-02-01T00:00:00Z",
        1,
    )
    .unwrap();
    sign_rsa(&mut bundle, "release-key", &private_pem).unwrap();

    let mut keys = BTreeMap::new();
    keys.insert("release-key".to_string(), public_pem);
    let err = verify(&bundle, &keys, &"0".repeat(64)).unwrap_err();
    assert_eq!(err.code(), Some("E_POLICY_BUNDLE_SCHEMA_HASH_MISMATCH"));
}

#[test]
fn test_quorum_requires_distinct_signers() {
    let (private_pem, public_pem) = generate_keypair();
    let mut bundle = build_template(
        &sample_policy(),
        "schemas/policy.schema.json",
        &schema_sha(),
        2,
        "2026-02-01T00:00:00Z",
        1,
    )
    .unwrap();
    sign_rsa(&mut bundle, "release-key", &private_pem).unwrap();

    let mut keys = BTreeMap::new();
    keys.insert("release-key".to_string(), public_pem);
    let err = verify(&bundle, &keys, &schema_sha()).unwrap_err();
    assert_eq!(err.code(), Some("E_POLICY_BUNDLE_SIGNATURES_INVALID"));
}

#[test]
fn test_untrusted_key_contributes_nothing() {
    let (private_pem, _) = generate_keypair();
    let (_, other_public) = generate_keypair();
    let mut bundle = build_template(
        &sample_policy(),
        "schemas/policy.schema.json",
        &schema_sha(),
        1,
        "2026-02-01T00:00:00Z",
        1,
    )
    .unwrap();
    sign_rsa(&mut bundle, "release-key", &private_pem).unwrap();

    let mut keys = BTreeMap::new();
    keys.insert("release-key".to_string(), other_public);
    let err = verify(&bundle, &keys, &schema_sha()).unwrap_err();
    assert_eq!(err.code(), Some("E_POLICY_BUNDLE_SIGNATURES_INVALID"));
}

fn trust_store_with_rsa(public_pem: &str, state: &str) -> TrustStore {
    TrustStore::from_value(&json!({
        "schemaVersion": 2,
        "signers": [{
            "id": "release-2026",
            "type": "rsa-key",
            "keyId": "release-key",
            "publicKeyPem": public_pem,
            "state": state
        }]
    }))
    .unwrap()
}

#[test]
fn test_trust_store_verification_accepts_active_signer() {
    let (private_pem, public_pem) = generate_keypair();
    let mut bundle = build_template(
        &sample_policy(),
        "schemas/policy.schema.json",
        &schema_sha(),
        1,
        "2026-02-01T00:00:00Z",
        1,
    )
    .unwrap();
    sign_rsa(&mut bundle, "release-key", &private_pem).unwrap();

    let store = trust_store_with_rsa(&public_pem, "active");
    let outcome = verify_with_trust_store(
        &bundle,
        &store,
        &schema_sha(),
        &shadowgate::core::sigstore::SigstoreUnavailable,
    )
    .unwrap();
    assert_eq!(outcome.valid_signatures, vec!["release-2026".to_string()]);
}

#[test]
fn test_revoked_signer_is_fatal_despite_other_valid_signatures() {
    let (revoked_private, revoked_public) = generate_keypair();
    let (active_private, active_public) = generate_keypair();
    let mut bundle = build_template(
        &sample_policy(),
        "schemas/policy.schema.json",
        &schema_sha(),
        1,
        "2026-02-01T00:00:00Z",
        1,
    )
    .unwrap();
    sign_rsa(&mut bundle, "active-key", &active_private).unwrap();
    sign_rsa(&mut bundle, "revoked-key", &revoked_private).unwrap();

    let store = TrustStore::from_value(&json!({
        "schemaVersion": 2,
        "signers": [
            {
                "id": "active-signer",
                "type": "rsa-key",
                "keyId": "active-key",
                "publicKeyPem": active_public
            },
            {
                "id": "revoked-signer",
                "type": "rsa-key",
                "keyId": "revoked-key",
                "publicKeyPem": revoked_public,
                "state": "revoked"
            }
        ]
    }))
    .unwrap();
    let err = verify_with_trust_store(
        &bundle,
        &store,
        &schema_sha(),
        &shadowgate::core::sigstore::SigstoreUnavailable,
    )
    .unwrap_err();
    assert_eq!(err.code(), Some("E_POLICY_TRUST_SIGNER_REVOKED"));
}

#[test]
fn test_validity_window_rejects_out_of_window_bundle() {
    let (private_pem, public_pem) = generate_keypair();
    let mut bundle = build_template(
        &sample_policy(),
        "schemas/policy.schema.json",
        &schema_sha(),
        1,
        "2026-02-01T00:00:00Z",
        1,
    )
    .unwrap();
    sign_rsa(&mut bundle, "release-key", &private_pem).unwrap();

    let store = TrustStore::from_value(&json!({
        "schemaVersion": 2,
        "signers": [{
            "id": "release-2026",
            "type": "rsa-key",
            "keyId": "release-key",
            "publicKeyPem": public_pem,
            "validFrom": "2026-06-01T00:00:00Z"
        }]
    }))
    .unwrap();
    let err = verify_with_trust_store(
        &bundle,
        &store,
        &schema_sha(),
        &shadowgate::core::sigstore::SigstoreUnavailable,
    )
    .unwrap_err();
    assert_eq!(err.code(), Some("E_POLICY_TRUST_SIGNER_OUTSIDE_VALIDITY"));
}

/// Adapter that certifies a fixed issuer/identity pair and verifies by
/// payload digest.
struct FakeKeylessAdapter {
    issuer: String,
    identity: String,
}

impl SigstoreAdapter for FakeKeylessAdapter {
    fn sign(
        &self,
        payload: &str,
        _options: &KeylessSignOptions,
    ) -> Result<serde_json::Value, GateError> {
        Ok(json!({
            "certificateIssuer": self.issuer,
            "certificateIdentityURI": self.identity,
            "payloadSha256": sha256_hex(payload.as_bytes())
        }))
    }

    fn verify(
        &self,
        bundle: &serde_json::Value,
        payload: &str,
        identity: &KeylessIdentity,
    ) -> Result<bool, GateError> {
        let issuer_ok = bundle["certificateIssuer"] == json!(identity.certificate_issuer);
        let identity_ok =
            bundle["certificateIdentityURI"] == json!(identity.certificate_identity_uri);
        let payload_ok = bundle["payloadSha256"] == json!(sha256_hex(payload.as_bytes()));
        Ok(issuer_ok && identity_ok && payload_ok)
    }
}

#[test]
fn test_keyless_signature_verifies_through_adapter() {
    let adapter = FakeKeylessAdapter {
        issuer: "https://token.actions.example.com".to_string(),
        identity: "https://example.com/workflows/release".to_string(),
    };
    let mut bundle = build_template(
        &sample_policy(),
        "schemas/policy.schema.json",
        &schema_sha(),
        1,
        "2026-02-01T00:00:00Z",
        2,
    )
    .unwrap();
    sign_keyless(
        &mut bundle,
        "release-keyless",
        &adapter,
        &KeylessSignOptions::default(),
    )
    .unwrap();

    let store = TrustStore::from_value(&json!({
        "schemaVersion": 2,
        "signers": [{
            "id": "release-keyless",
            "type": "sigstore-keyless",
            "certificateIssuer": "https://token.actions.example.com",
            "certificateIdentityURI": "https://example.com/workflows/release"
        }]
    }))
    .unwrap();
    let outcome = verify_with_trust_store(&bundle, &store, &schema_sha(), &adapter).unwrap();
    assert_eq!(outcome.valid_signatures, vec!["release-keyless".to_string()]);
}

#[test]
fn test_keyless_identity_mismatch_fails_quorum() {
    let adapter = FakeKeylessAdapter {
        issuer: "https://token.actions.example.com".to_string(),
        identity: "https://example.com/workflows/release".to_string(),
    };
    let mut bundle = build_template(
        &sample_policy(),
        "schemas/policy.schema.json",
        &schema_sha(),
        1,
        "2026-02-01T00:00:00Z",
        2,
    )
    .unwrap();
    sign_keyless(
        &mut bundle,
        "release-keyless",
        &adapter,
        &KeylessSignOptions::default(),
    )
    .unwrap();

    // The trust store certifies a different identity URI: zero matched
    // signatures, quorum unmet.
    let store = TrustStore::from_value(&json!({
        "schemaVersion": 2,
        "signers": [{
            "id": "release-keyless",
            "type": "sigstore-keyless",
            "certificateIssuer": "https://token.actions.example.com",
            "certificateIdentityURI": "https://example.com/workflows/other"
        }]
    }))
    .unwrap();
    let err = verify_with_trust_store(&bundle, &store, &schema_sha(), &adapter).unwrap_err();
    assert_eq!(err.code(), Some("E_POLICY_BUNDLE_SIGNATURES_INVALID"));
}
