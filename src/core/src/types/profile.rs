//! Declarative key profile types

use crate::duration::serde_go;
use crate::types::status::RotationState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Parameter key holding the EC curve name.
pub const PARAM_CURVE: &str = "curve";

/// Parameter key holding the RSA modulus size in bits.
pub const PARAM_KEY_SIZE: &str = "keySize";

/// A key identity bound to a service account, with its generation and
/// rotation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyProfile {
    pub name: String,
    pub namespace: String,
    pub spec: KeyProfileSpec,
    #[serde(default)]
    pub status: RotationState,
}

impl KeyProfile {
    /// `namespace/name`, used as the log and lock identity of a profile.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Desired state of a key identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyProfileSpec {
    pub service_account_ref: ServiceAccountRef,
    pub key_spec: KeySpec,
    pub rotation: RotationPolicy,
    pub output: OutputConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publish: Vec<PublishTarget>,
}

/// Service account the key identity is issued to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountRef {
    pub name: String,
    pub namespace: String,
}

/// Cryptographic parameters for key generation.
///
/// Fields are kept as the raw strings supplied by the profile author so that
/// an unsupported value surfaces as a policy violation from the validation
/// rule set rather than as a deserialization failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySpec {
    /// `EC` or `RSA`
    pub algorithm: String,

    /// `{"curve": "P-256"}` for EC, `{"keySize": "3072"}` for RSA
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// `PEM`, `DER` or `JWK`; empty until defaulted
    #[serde(default)]
    pub encoding: String,

    /// Permits RSA below 3072 bits (BSI TR-02102-1 legacy override)
    #[serde(default)]
    pub allow_legacy_key_size: bool,
}

impl KeySpec {
    /// EC key spec on the named curve.
    pub fn ec(curve: &str) -> Self {
        Self {
            algorithm: "EC".to_string(),
            params: BTreeMap::from([(PARAM_CURVE.to_string(), curve.to_string())]),
            encoding: "PEM".to_string(),
            allow_legacy_key_size: false,
        }
    }

    /// RSA key spec with the given modulus size.
    pub fn rsa(bits: u32, allow_legacy_key_size: bool) -> Self {
        Self {
            algorithm: "RSA".to_string(),
            params: BTreeMap::from([(PARAM_KEY_SIZE.to_string(), bits.to_string())]),
            encoding: "PEM".to_string(),
            allow_legacy_key_size,
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// Rotation schedule.
///
/// `grace_period >= 5m` and `interval >= 3 * grace_period` are enforced at
/// admission ([`crate::validation::validate_rotation_policy`]); the decision
/// engine assumes they hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationPolicy {
    /// How often the key is rotated; zero disables rotation
    #[serde(with = "serde_go")]
    pub interval: Duration,

    /// How long the previous key stays valid after a rotation
    #[serde(with = "serde_go")]
    pub grace_period: Duration,

    /// Force a rotation the first time the agent sees the profile
    #[serde(default)]
    pub trigger_on_startup: bool,
}

/// Where and how the private material is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    pub secret_name: String,

    /// `split-pem`, `single-pem` or `jks`; empty until defaulted
    #[serde(default)]
    pub format: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Keystore password, resolved by the profile store (required for `jks`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystore_password: Option<String>,

    /// Keystore entry alias (`jks` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystore_alias: Option<String>,
}

/// A destination for the public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishTarget {
    /// Publisher implementation tag, e.g. `filesystem` or `http`
    #[serde(rename = "type")]
    pub target_type: String,

    /// Publisher specific settings (`path` for filesystem, `endpoint` for http)
    #[serde(default)]
    pub config: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

impl PublishTarget {
    pub fn new(target_type: &str) -> Self {
        Self {
            target_type: target_type.to_string(),
            config: BTreeMap::new(),
            tls: None,
        }
    }

    pub fn with_config(mut self, key: &str, value: &str) -> Self {
        self.config.insert(key.to_string(), value.to_string());
        self
    }

    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// True when the target explicitly opted out of certificate verification.
    pub fn is_insecure(&self) -> bool {
        self.tls.as_ref().map_or(false, |t| t.insecure_skip_verify)
    }
}

/// Transport security for HTTP publishers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    /// Additional trusted roots (PEM bundle)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle_pem: Option<String>,

    /// Disables certificate verification and permits plain `http://`.
    /// Must be false in production.
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE_JSON: &str = r#"{
        "name": "billing-signer",
        "namespace": "billing",
        "spec": {
            "serviceAccountRef": {"name": "billing", "namespace": "billing"},
            "keySpec": {"algorithm": "EC", "params": {"curve": "P-256"}},
            "rotation": {"interval": "2160h", "gracePeriod": "1h"},
            "output": {"secretName": "billing-signer-key"},
            "publish": [
                {"type": "filesystem", "config": {"path": "/var/lib/keys"}},
                {"type": "http", "config": {"endpoint": "http://jwks.local/keys"},
                 "tls": {"insecureSkipVerify": true}}
            ]
        }
    }"#;

    #[test]
    fn test_profile_deserializes() {
        let profile: KeyProfile = serde_json::from_str(PROFILE_JSON).unwrap();
        assert_eq!(profile.qualified_name(), "billing/billing-signer");
        assert_eq!(profile.spec.key_spec.param(PARAM_CURVE), Some("P-256"));
        assert_eq!(profile.spec.key_spec.encoding, "");
        assert_eq!(profile.spec.rotation.interval, Duration::from_secs(2160 * 3600));
        assert_eq!(profile.spec.rotation.grace_period, Duration::from_secs(3600));
        assert!(!profile.spec.rotation.trigger_on_startup);
        assert_eq!(profile.spec.publish.len(), 2);
        assert!(!profile.spec.publish[0].is_insecure());
        assert!(profile.spec.publish[1].is_insecure());
        assert!(profile.status.current_key_id.is_none());
    }

    #[test]
    fn test_empty_param_is_absent() {
        let mut spec = KeySpec::ec("");
        assert_eq!(spec.param(PARAM_CURVE), None);
        spec.params.insert(PARAM_CURVE.to_string(), "P-384".to_string());
        assert_eq!(spec.param(PARAM_CURVE), Some("P-384"));
    }
}
