//! Admission checks for key profiles
//!
//! Runs the same key-spec rule set as the generator, so a profile that is
//! admitted can always be generated later.

use crate::error::AdmissionError;
use keywarden_core::validation::{validate_namespace_match, validate_rotation_policy};
use keywarden_core::KeyProfile;
use keywarden_crypto::{validate_key_spec, KeyEncoding};
use keywarden_publish::{PublishManager, TYPE_HTTP};
use keywarden_vault::OutputFormat;
use std::collections::BTreeSet;

pub type Warnings = Vec<String>;

/// Fills in the fields a profile author may leave empty.
pub fn apply_defaults(profile: &mut KeyProfile) {
    let spec = &mut profile.spec;
    if spec.key_spec.encoding.is_empty() {
        spec.key_spec.encoding = KeyEncoding::default().as_str().to_string();
    }
    if spec.output.format.is_empty() {
        spec.output.format = OutputFormat::default().as_str().to_string();
    }
}

/// Validates profiles against the key-spec rules and the set of publisher
/// types the agent can serve.
#[derive(Debug, Clone)]
pub struct AdmissionValidator {
    publish_types: BTreeSet<String>,
}

impl AdmissionValidator {
    pub fn new<I, S>(publish_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            publish_types: publish_types.into_iter().map(Into::into).collect(),
        }
    }

    pub fn for_manager(manager: &PublishManager) -> Self {
        Self::new(manager.types())
    }

    /// Accepts or rejects a profile; warnings are returned only on
    /// acceptance.
    pub fn validate(&self, profile: &KeyProfile) -> Result<Warnings, AdmissionError> {
        let spec = &profile.spec;

        validate_namespace_match(&profile.namespace, &spec.service_account_ref.namespace)?;
        validate_rotation_policy(spec.rotation.interval, spec.rotation.grace_period)?;

        let validation = validate_key_spec(&spec.key_spec);
        validation.result?;
        let mut warnings = validation.warnings;

        if !spec.key_spec.encoding.is_empty() && spec.key_spec.encoding.parse::<KeyEncoding>().is_err() {
            return Err(AdmissionError::Encoding(spec.key_spec.encoding.clone()));
        }

        let format = if spec.output.format.is_empty() {
            OutputFormat::default()
        } else {
            spec.output
                .format
                .parse::<OutputFormat>()
                .map_err(|_| AdmissionError::OutputFormat(spec.output.format.clone()))?
        };
        if format == OutputFormat::Jks
            && spec.output.keystore_password.as_deref().map_or(true, str::is_empty)
        {
            return Err(AdmissionError::KeystorePasswordRequired);
        }

        for (index, target) in spec.publish.iter().enumerate() {
            if !self.publish_types.contains(&target.target_type) {
                return Err(AdmissionError::UnknownPublisher {
                    index,
                    target_type: target.target_type.clone(),
                });
            }
            if target.target_type == TYPE_HTTP && target.is_insecure() {
                warnings.push(format!(
                    "publish[{}]: insecureSkipVerify=true disables TLS verification, not recommended for production",
                    index
                ));
            }
        }

        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keywarden_core::types::{KeyProfileSpec, OutputConfig, RotationPolicy, ServiceAccountRef};
    use keywarden_core::{CoreError, KeySpec, PublishTarget, RotationState, TlsConfig};
    use keywarden_crypto::KeySpecError;
    use keywarden_publish::TYPE_FILESYSTEM;
    use std::time::Duration;

    const HOUR: Duration = Duration::from_secs(3600);

    fn validator() -> AdmissionValidator {
        AdmissionValidator::new([TYPE_FILESYSTEM, TYPE_HTTP])
    }

    fn profile(key_spec: KeySpec) -> KeyProfile {
        KeyProfile {
            name: "signer".to_string(),
            namespace: "billing".to_string(),
            spec: KeyProfileSpec {
                service_account_ref: ServiceAccountRef {
                    name: "billing".to_string(),
                    namespace: "billing".to_string(),
                },
                key_spec,
                rotation: RotationPolicy {
                    interval: 24 * HOUR,
                    grace_period: HOUR,
                    trigger_on_startup: false,
                },
                output: OutputConfig {
                    secret_name: "signer-key".to_string(),
                    format: String::new(),
                    labels: Default::default(),
                    keystore_password: None,
                    keystore_alias: None,
                },
                publish: Vec::new(),
            },
            status: RotationState::default(),
        }
    }

    #[test]
    fn test_defaults() {
        let mut p = profile(KeySpec::ec("P-256"));
        p.spec.key_spec.encoding.clear();
        apply_defaults(&mut p);
        assert_eq!(p.spec.key_spec.encoding, "PEM");
        assert_eq!(p.spec.output.format, "split-pem");

        p.spec.output.format = "jks".to_string();
        apply_defaults(&mut p);
        assert_eq!(p.spec.output.format, "jks");
    }

    #[test]
    fn test_valid_profile() {
        assert!(validator().validate(&profile(KeySpec::ec("P-384"))).unwrap().is_empty());
    }

    #[test]
    fn test_namespace_mismatch() {
        let mut p = profile(KeySpec::ec("P-256"));
        p.spec.service_account_ref.namespace = "other".to_string();
        assert!(matches!(
            validator().validate(&p),
            Err(AdmissionError::Profile(CoreError::NamespaceMismatch { .. }))
        ));
    }

    #[test]
    fn test_rotation_policy_bounds() {
        let mut p = profile(KeySpec::ec("P-256"));
        p.spec.rotation.grace_period = Duration::from_secs(60);
        assert!(matches!(
            validator().validate(&p),
            Err(AdmissionError::Profile(CoreError::GracePeriodTooShort { .. }))
        ));

        let mut p = profile(KeySpec::ec("P-256"));
        p.spec.rotation.interval = 2 * HOUR;
        assert!(matches!(
            validator().validate(&p),
            Err(AdmissionError::Profile(CoreError::IntervalTooShort { .. }))
        ));
    }

    #[test]
    fn test_key_spec_rules_shared_with_generator() {
        assert!(matches!(
            validator().validate(&profile(KeySpec::ec("P-192"))),
            Err(AdmissionError::KeySpec(KeySpecError::UnsupportedCurve(_)))
        ));
        assert!(matches!(
            validator().validate(&profile(KeySpec::rsa(2048, false))),
            Err(AdmissionError::KeySpec(KeySpecError::LegacyKeySize { .. }))
        ));

        let warnings = validator().validate(&profile(KeySpec::rsa(2048, true))).unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_output_and_encoding() {
        let mut p = profile(KeySpec::ec("P-256"));
        p.spec.key_spec.encoding = "PKCS12".to_string();
        assert!(matches!(validator().validate(&p), Err(AdmissionError::Encoding(_))));

        let mut p = profile(KeySpec::ec("P-256"));
        p.spec.output.format = "pkcs12".to_string();
        assert!(matches!(validator().validate(&p), Err(AdmissionError::OutputFormat(_))));

        p.spec.output.format = "jks".to_string();
        assert!(matches!(
            validator().validate(&p),
            Err(AdmissionError::KeystorePasswordRequired)
        ));
        p.spec.output.keystore_password = Some("changeit".to_string());
        assert!(validator().validate(&p).is_ok());
    }

    #[test]
    fn test_publish_targets() {
        let mut p = profile(KeySpec::ec("P-256"));
        let mut insecure = PublishTarget::new(TYPE_HTTP).with_config("endpoint", "http://jwks.local/keys");
        insecure.tls = Some(TlsConfig {
            ca_bundle_pem: None,
            insecure_skip_verify: true,
        });
        p.spec.publish = vec![
            PublishTarget::new(TYPE_FILESYSTEM).with_config("path", "/var/lib/keys"),
            insecure,
        ];
        let warnings = validator().validate(&p).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("publish[1]: insecureSkipVerify=true"));

        p.spec.publish.push(PublishTarget::new("s3"));
        assert!(matches!(
            validator().validate(&p),
            Err(AdmissionError::UnknownPublisher { index: 2, .. })
        ));
    }
}
