//! Trust store: versioned signer descriptors with lifecycle metadata.
//!
//! A signer is either an RSA key or a Sigstore-keyless identity. v2 stores
//! add lifecycle: active/retired/revoked state, validity windows, and
//! replacement links. v1 stores parse the same shape but lifecycle fields
//! are ignored during verification.

use crate::core::error::GateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustStore {
    pub schema_version: u8,
    pub signers: Vec<TrustSigner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignerState {
    #[default]
    Active,
    Retired,
    Revoked,
}

/// Signer descriptor, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TrustSigner {
    #[serde(rename = "rsa-key", rename_all = "camelCase")]
    RsaKey {
        id: String,
        key_id: String,
        public_key_pem: String,
        #[serde(default)]
        state: SignerState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        valid_from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        valid_until: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replaces: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replaced_by: Option<String>,
    },
    #[serde(rename = "sigstore-keyless", rename_all = "camelCase")]
    Keyless {
        id: String,
        certificate_issuer: String,
        #[serde(rename = "certificateIdentityURI")]
        certificate_identity_uri: String,
        #[serde(default)]
        state: SignerState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        valid_from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        valid_until: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replaces: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replaced_by: Option<String>,
    },
}

impl TrustSigner {
    pub fn id(&self) -> &str {
        match self {
            TrustSigner::RsaKey { id, .. } | TrustSigner::Keyless { id, .. } => id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TrustSigner::RsaKey { .. } => "rsa-key",
            TrustSigner::Keyless { .. } => "sigstore-keyless",
        }
    }

    pub fn state(&self) -> SignerState {
        match self {
            TrustSigner::RsaKey { state, .. } | TrustSigner::Keyless { state, .. } => *state,
        }
    }

    pub fn validity_window(&self) -> (Option<&str>, Option<&str>) {
        match self {
            TrustSigner::RsaKey {
                valid_from,
                valid_until,
                ..
            }
            | TrustSigner::Keyless {
                valid_from,
                valid_until,
                ..
            } => (valid_from.as_deref(), valid_until.as_deref()),
        }
    }

    pub fn replacement_links(&self) -> (Option<&str>, Option<&str>) {
        match self {
            TrustSigner::RsaKey {
                replaces,
                replaced_by,
                ..
            }
            | TrustSigner::Keyless {
                replaces,
                replaced_by,
                ..
            } => (replaces.as_deref(), replaced_by.as_deref()),
        }
    }

    /// Natural key used to resolve bundle signatures to this signer.
    pub fn natural_key(&self) -> String {
        match self {
            TrustSigner::RsaKey { key_id, .. } => format!("rsa:{}", key_id),
            TrustSigner::Keyless {
                certificate_issuer,
                certificate_identity_uri,
                ..
            } => format!("keyless:{}\u{1f}{}", certificate_issuer, certificate_identity_uri),
        }
    }
}

fn parse_instant(field: &str, raw: &str) -> Result<DateTime<Utc>, GateError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            GateError::TrustStoreInvalid(format!("{} is not ISO-8601 ({}): {}", field, raw, e))
        })
}

impl TrustStore {
    pub fn from_value(value: &serde_json::Value) -> Result<TrustStore, GateError> {
        let store: TrustStore = serde_json::from_value(value.clone())
            .map_err(|e| GateError::TrustStoreInvalid(format!("store does not parse: {}", e)))?;
        store.validate()?;
        Ok(store)
    }

    /// Lifecycle fields only apply to v2 stores.
    pub fn lifecycle_enabled(&self) -> bool {
        self.schema_version >= 2
    }

    /// Structural invariants: unique ids, unique per-type natural keys,
    /// replacement links resolve to existing same-type signers, and
    /// validity windows are not inverted.
    pub fn validate(&self) -> Result<(), GateError> {
        if !(1..=2).contains(&self.schema_version) {
            return Err(GateError::TrustStoreInvalid(format!(
                "schemaVersion must be 1 or 2 (got {})",
                self.schema_version
            )));
        }

        let mut ids = BTreeSet::new();
        let mut natural_keys = BTreeSet::new();
        for signer in &self.signers {
            if !ids.insert(signer.id().to_string()) {
                return Err(GateError::TrustStoreInvalid(format!(
                    "duplicate signer id '{}'",
                    signer.id()
                )));
            }
            if !natural_keys.insert(signer.natural_key()) {
                return Err(GateError::TrustStoreInvalid(format!(
                    "duplicate {} natural key on signer '{}'",
                    signer.type_name(),
                    signer.id()
                )));
            }
        }

        for signer in &self.signers {
            let (replaces, replaced_by) = signer.replacement_links();
            for (field, link) in [("replaces", replaces), ("replacedBy", replaced_by)] {
                if let Some(target_id) = link {
                    let target = self.signers.iter().find(|s| s.id() == target_id);
                    match target {
                        None => {
                            return Err(GateError::TrustStoreInvalid(format!(
                                "signer '{}' {} points to unknown id '{}'",
                                signer.id(),
                                field,
                                target_id
                            )));
                        }
                        Some(t) if t.type_name() != signer.type_name() => {
                            return Err(GateError::TrustStoreInvalid(format!(
                                "signer '{}' {} points to '{}' of different type",
                                signer.id(),
                                field,
                                target_id
                            )));
                        }
                        Some(_) => {}
                    }
                }
            }

            let (valid_from, valid_until) = signer.validity_window();
            let from = valid_from
                .map(|raw| parse_instant(&format!("signer '{}' validFrom", signer.id()), raw))
                .transpose()?;
            let until = valid_until
                .map(|raw| parse_instant(&format!("signer '{}' validUntil", signer.id()), raw))
                .transpose()?;
            if let (Some(from), Some(until)) = (from, until) {
                if until < from {
                    return Err(GateError::TrustStoreInvalid(format!(
                        "signer '{}' validUntil precedes validFrom",
                        signer.id()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Check a bundle `createdAt` against a signer's validity window.
    ///
    /// Only meaningful for v2 stores; v1 stores never fail this check.
    pub fn check_validity_window(
        &self,
        signer: &TrustSigner,
        created_at: &str,
    ) -> Result<(), GateError> {
        if !self.lifecycle_enabled() {
            return Ok(());
        }
        let (valid_from, valid_until) = signer.validity_window();
        if valid_from.is_none() && valid_until.is_none() {
            return Ok(());
        }
        let created = parse_instant("bundle createdAt", created_at)?;
        if let Some(raw) = valid_from {
            let from = parse_instant(&format!("signer '{}' validFrom", signer.id()), raw)?;
            if created < from {
                return Err(GateError::TrustSignerOutsideValidity(format!(
                    "bundle createdAt {} precedes validFrom of signer '{}'",
                    created_at,
                    signer.id()
                )));
            }
        }
        if let Some(raw) = valid_until {
            let until = parse_instant(&format!("signer '{}' validUntil", signer.id()), raw)?;
            if created > until {
                return Err(GateError::TrustSignerOutsideValidity(format!(
                    "bundle createdAt {} is after validUntil of signer '{}'",
                    created_at,
                    signer.id()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_doc() -> serde_json::Value {
        json!({
            "schemaVersion": 2,
            "signers": [
                {
                    "id": "release-2026",
                    "type": "rsa-key",
                    "keyId": "release-key",
                    "publicKeyPem": "-----BEGIN PUBLIC KEY-----\n-----END PUBLIC KEY-----"
                },
                {
                    "id": "release-keyless",
                    "type": "sigstore-keyless",
                    "certificateIssuer": "https://token.actions.example.com",
                    "certificateIdentityURI": "https://example.com/workflows/release"
                }
            ]
        })
    }

    #[test]
    fn test_store_parses_and_defaults_state() {
        let store = TrustStore::from_value(&store_doc()).unwrap();
        assert_eq!(store.signers.len(), 2);
        assert_eq!(store.signers[0].state(), SignerState::Active);
        assert_eq!(store.signers[0].type_name(), "rsa-key");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut doc = store_doc();
        doc["signers"][1]["id"] = json!("release-2026");
        let err = TrustStore::from_value(&doc).unwrap_err();
        assert_eq!(err.code(), Some("E_POLICY_TRUST_STORE_INVALID"));
        assert!(format!("{}", err).contains("duplicate signer id"));
    }

    #[test]
    fn test_duplicate_natural_key_rejected() {
        let mut doc = store_doc();
        doc["signers"]
            .as_array_mut()
            .unwrap()
            .push(json!({
                "id": "release-2027",
                "type": "rsa-key",
                "keyId": "release-key",
                "publicKeyPem": "pem"
            }));
        let err = TrustStore::from_value(&doc).unwrap_err();
        assert!(format!("{}", err).contains("natural key"));
    }

    #[test]
    fn test_dangling_replacement_link_rejected() {
        let mut doc = store_doc();
        doc["signers"][0]["replacedBy"] = json!("release-2099");
        let err = TrustStore::from_value(&doc).unwrap_err();
        assert!(format!("{}", err).contains("unknown id"));
    }

    #[test]
    fn test_cross_type_replacement_link_rejected() {
        let mut doc = store_doc();
        doc["signers"][0]["replacedBy"] = json!("release-keyless");
        let err = TrustStore::from_value(&doc).unwrap_err();
        assert!(format!("{}", err).contains("different type"));
    }

    #[test]
    fn test_inverted_validity_window_rejected() {
        let mut doc = store_doc();
        doc["signers"][0]["validFrom"] = json!("2026-06-01T00:00:00Z");
        doc["signers"][0]["validUntil"] = json!("2026-01-01T00:00:00Z");
        let err = TrustStore::from_value(&doc).unwrap_err();
        assert!(format!("{}", err).contains("precedes validFrom"));
    }

    #[test]
    fn test_v1_store_ignores_validity_window() {
        let mut doc = store_doc();
        doc["schemaVersion"] = json!(1);
        doc["signers"][0]["validFrom"] = json!("2026-06-01T00:00:00Z");
        let store = TrustStore::from_value(&doc).unwrap();
        let signer = store.signers[0].clone();
        store
            .check_validity_window(&signer, "2020-01-01T00:00:00Z")
            .unwrap();
    }

    #[test]
    fn test_v2_window_rejects_early_bundle() {
        let mut doc = store_doc();
        doc["signers"][0]["validFrom"] = json!("2026-06-01T00:00:00Z");
        let store = TrustStore::from_value(&doc).unwrap();
        let signer = store.signers[0].clone();
        let err = store
            .check_validity_window(&signer, "2026-01-01T00:00:00Z")
            .unwrap_err();
        assert_eq!(err.code(), Some("E_POLICY_TRUST_SIGNER_OUTSIDE_VALIDITY"));
    }
}
