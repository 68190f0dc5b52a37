//! Self-signed wrapper certificate for keystore entries
//!
//! JKS private key entries must carry a certificate chain. The certificate
//! built here is only a container for the public key: it is self-signed by
//! the key it wraps and asserts no identity.
//!
//! P-256, P-384 and RSA certificates are produced by rcgen. rcgen has no
//! P-521 signer, so those are assembled field by field with `der` and signed
//! with ECDSA P-521/SHA-512.

use crate::error::{Result, VaultError};
use chrono::Datelike;
use der::asn1::{
    Any, BitStringRef, GeneralizedTime, ObjectIdentifier, OctetStringRef, UintRef, UtcTime,
    Utf8StringRef,
};
use der::{Encode, Tag, TagNumber};
use keywarden_crypto::{Curve, KeyPair, KeyParams, PrivateKey};
use p521::ecdsa::signature::RandomizedSigner;
use rand_core::{OsRng, RngCore};
use rcgen::{
    Certificate, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyUsagePurpose, SerialNumber, SignatureAlgorithm,
};
use std::time::Duration;
use zeroize::Zeroizing;

pub const CERT_COMMON_NAME: &str = "Keywarden Generated Key";
pub const CERT_ORGANIZATION: &str = "Keywarden";

/// 100 years
pub const CERT_VALIDITY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

const SERIAL_LEN: usize = 16;
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

const OID_ECDSA_WITH_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");
const OID_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const OID_ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const OID_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.15");
const OID_BASIC_CONSTRAINTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.19");
const OID_EXT_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37");
const OID_SERVER_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.1");

/// digitalSignature (bit 0) and keyEncipherment (bit 2)
const KEY_USAGE_BITS: [u8; 1] = [0b1010_0000];
const KEY_USAGE_UNUSED_BITS: u8 = 5;

/// rcgen signer for the key, or `None` when rcgen cannot sign with it.
fn rcgen_algorithm(params: KeyParams) -> Option<&'static SignatureAlgorithm> {
    match params {
        KeyParams::Ec(Curve::P256) => Some(&rcgen::PKCS_ECDSA_P256_SHA256),
        KeyParams::Ec(Curve::P384) => Some(&rcgen::PKCS_ECDSA_P384_SHA384),
        KeyParams::Ec(Curve::P521) => None,
        KeyParams::Rsa { .. } => Some(&rcgen::PKCS_RSA_SHA256),
    }
}

/// 128 random bits. Encoders prepend a zero byte when the top bit is set.
fn random_serial() -> Result<[u8; SERIAL_LEN]> {
    let mut serial = [0u8; SERIAL_LEN];
    OsRng
        .try_fill_bytes(&mut serial)
        .map_err(|e| VaultError::Certificate(format!("failed to generate serial number: {}", e)))?;
    Ok(serial)
}

/// Midnight UTC of the day the key was created
fn not_before(kp: &KeyPair) -> Duration {
    let created = kp.created_at().timestamp();
    let midnight = created - created.rem_euclid(SECONDS_PER_DAY);
    Duration::from_secs(midnight.max(0) as u64)
}

/// Build a DER certificate wrapping `kp`'s public key, signed by its own
/// private key.
pub fn self_signed_certificate(kp: &KeyPair) -> Result<Vec<u8>> {
    let serial = random_serial()?;
    match rcgen_algorithm(kp.params()) {
        Some(alg) => rcgen_certificate(kp, alg, &serial),
        None => p521_certificate(kp, &serial),
    }
}

fn rcgen_certificate(
    kp: &KeyPair,
    alg: &'static SignatureAlgorithm,
    serial: &[u8],
) -> Result<Vec<u8>> {
    let pkcs8 = kp.private_key()?.to_pkcs8_der()?;
    let signing_key = rcgen::KeyPair::from_der_and_sign_algo(&pkcs8, alg)
        .map_err(|e| VaultError::Certificate(format!("failed to load signing key: {}", e)))?;

    let mut subject = DistinguishedName::new();
    subject.push(DnType::CommonName, CERT_COMMON_NAME);
    subject.push(DnType::OrganizationName, CERT_ORGANIZATION);

    let issued = kp.created_at().date_naive();
    let mut params = CertificateParams::new(vec![]);
    params.alg = alg;
    params.key_pair = Some(signing_key);
    params.distinguished_name = subject;
    params.serial_number = Some(SerialNumber::from_slice(serial));
    params.not_before = rcgen::date_time_ymd(issued.year(), issued.month() as u8, issued.day() as u8);
    params.not_after = params.not_before + CERT_VALIDITY;
    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let cert = Certificate::from_params(params)
        .map_err(|e| VaultError::Certificate(format!("failed to create certificate: {}", e)))?;
    cert.serialize_der()
        .map_err(|e| VaultError::Certificate(format!("failed to serialize certificate: {}", e)))
}

fn p521_certificate(kp: &KeyPair, serial: &[u8]) -> Result<Vec<u8>> {
    let PrivateKey::P521(secret) = kp.private_key()? else {
        return Err(VaultError::Certificate(format!(
            "expected a P-521 key, got {:?}",
            kp.params()
        )));
    };
    let spki = kp.public_key()?.to_spki_der()?;
    let tbs = encode_tbs_certificate(serial, not_before(kp), &spki).map_err(encoding_error)?;

    let scalar = Zeroizing::new(secret.to_bytes());
    let signing_key = p521::ecdsa::SigningKey::from_bytes(&scalar)
        .map_err(|e| VaultError::Certificate(format!("failed to load signing key: {}", e)))?;
    let signature: p521::ecdsa::Signature = signing_key
        .try_sign_with_rng(&mut OsRng, &tbs)
        .map_err(|e| VaultError::Certificate(format!("failed to sign certificate: {}", e)))?;

    encode_certificate(&tbs, signature.to_der().as_bytes()).map_err(encoding_error)
}

fn encoding_error(e: der::Error) -> VaultError {
    VaultError::Certificate(format!("failed to encode certificate: {}", e))
}

fn tlv(tag: Tag, content: Vec<u8>) -> der::Result<Vec<u8>> {
    Any::new(tag, content)?.to_der()
}

fn explicit(number: TagNumber, content: Vec<u8>) -> der::Result<Vec<u8>> {
    tlv(
        Tag::ContextSpecific {
            constructed: true,
            number,
        },
        content,
    )
}

fn signature_algorithm() -> der::Result<Vec<u8>> {
    tlv(Tag::Sequence, OID_ECDSA_WITH_SHA512.to_der()?)
}

fn encode_name() -> der::Result<Vec<u8>> {
    let mut rdns = Vec::new();
    for (oid, value) in [
        (OID_COMMON_NAME, CERT_COMMON_NAME),
        (OID_ORGANIZATION, CERT_ORGANIZATION),
    ] {
        let attribute = tlv(
            Tag::Sequence,
            [oid.to_der()?, Utf8StringRef::new(value)?.to_der()?].concat(),
        )?;
        rdns.extend(tlv(Tag::Set, attribute)?);
    }
    tlv(Tag::Sequence, rdns)
}

/// UTCTime through 2049, GeneralizedTime after
fn encode_time(since_epoch: Duration) -> der::Result<Vec<u8>> {
    match UtcTime::from_unix_duration(since_epoch) {
        Ok(time) => time.to_der(),
        Err(_) => GeneralizedTime::from_unix_duration(since_epoch)?.to_der(),
    }
}

fn encode_extension(oid: ObjectIdentifier, critical: bool, value: Vec<u8>) -> der::Result<Vec<u8>> {
    let mut content = oid.to_der()?;
    if critical {
        content.extend(true.to_der()?);
    }
    content.extend(OctetStringRef::new(&value)?.to_der()?);
    tlv(Tag::Sequence, content)
}

fn encode_extensions() -> der::Result<Vec<u8>> {
    let key_usage = BitStringRef::new(KEY_USAGE_UNUSED_BITS, &KEY_USAGE_BITS)?.to_der()?;
    let ext_key_usage = tlv(Tag::Sequence, OID_SERVER_AUTH.to_der()?)?;
    // cA defaults to false
    let basic_constraints = tlv(Tag::Sequence, Vec::new())?;

    let extensions = [
        encode_extension(OID_KEY_USAGE, true, key_usage)?,
        encode_extension(OID_EXT_KEY_USAGE, false, ext_key_usage)?,
        encode_extension(OID_BASIC_CONSTRAINTS, true, basic_constraints)?,
    ]
    .concat();
    explicit(TagNumber::N3, tlv(Tag::Sequence, extensions)?)
}

fn encode_tbs_certificate(serial: &[u8], not_before: Duration, spki: &[u8]) -> der::Result<Vec<u8>> {
    let name = encode_name()?;
    let validity = tlv(
        Tag::Sequence,
        [encode_time(not_before)?, encode_time(not_before + CERT_VALIDITY)?].concat(),
    )?;

    let content = [
        // v3
        explicit(TagNumber::N0, 2u8.to_der()?)?,
        UintRef::new(serial)?.to_der()?,
        signature_algorithm()?,
        name.clone(),
        validity,
        name,
        spki.to_vec(),
        encode_extensions()?,
    ]
    .concat();
    tlv(Tag::Sequence, content)
}

fn encode_certificate(tbs: &[u8], signature: &[u8]) -> der::Result<Vec<u8>> {
    let content = [
        tbs.to_vec(),
        signature_algorithm()?,
        BitStringRef::new(0, signature)?.to_der()?,
    ]
    .concat();
    tlv(Tag::Sequence, content)
}
