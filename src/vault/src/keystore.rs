//! Java KeyStore (JKS v2) codec
//!
//! Layout:
//!
//! ```text
//! u32 magic 0xFEEDFEED | u32 version 2 | u32 entry count
//! per private key entry:
//!   u32 tag 1 | utf alias | u64 creation ms | u32 len + EncryptedPrivateKeyInfo
//!   u32 chain length | per cert: utf "X.509" | u32 len + DER
//! 20 byte SHA-1 over (password UTF-16BE || "Mighty Aphrodite" || everything above)
//! ```
//!
//! Private keys are protected with Sun's proprietary key protector
//! (OID 1.3.6.1.4.1.42.2.17.1.1), a SHA-1 keystream keyed by the password.

use crate::error::{Result, VaultError};
use chrono::{DateTime, TimeZone, Utc};
use der::asn1::{AnyRef, ObjectIdentifier, OctetStringRef};
use der::{Decode, Encode, Sequence};
use rand_core::{OsRng, RngCore};
use sha1::{Digest, Sha1};
use spki::AlgorithmIdentifierRef;
use zeroize::Zeroizing;

const MAGIC: u32 = 0xFEED_FEED;
const VERSION: u32 = 2;
const TAG_PRIVATE_KEY: u32 = 1;
const TAG_TRUSTED_CERT: u32 = 2;
const CERT_TYPE: &str = "X.509";
const WHITENER: &[u8] = b"Mighty Aphrodite";
const DIGEST_LEN: usize = 20;
const SALT_LEN: usize = 20;

/// Sun JDK key protector
pub const KEY_PROTECTOR_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.42.2.17.1.1");

#[derive(Sequence)]
struct EncryptedKeyInfo<'a> {
    algorithm: AlgorithmIdentifierRef<'a>,
    encrypted_data: OctetStringRef<'a>,
}

/// A private key entry: PKCS#8 key plus its certificate chain.
pub struct PrivateKeyEntry {
    pub alias: String,
    pub creation_time: DateTime<Utc>,
    pub private_key: Zeroizing<Vec<u8>>,
    pub certificate_chain: Vec<Vec<u8>>,
}

impl std::fmt::Debug for PrivateKeyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeyEntry")
            .field("alias", &self.alias)
            .field("creation_time", &self.creation_time)
            .field("certificate_chain", &self.certificate_chain.len())
            .finish_non_exhaustive()
    }
}

fn password_bytes(password: &str) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(password.encode_utf16().flat_map(u16::to_be_bytes).collect())
}

fn keystream_xor(password: &[u8], salt: &[u8], input: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(input.len()));
    let mut block = Sha1::new().chain_update(password).chain_update(salt).finalize();
    for chunk in input.chunks(DIGEST_LEN) {
        out.extend(chunk.iter().zip(block.iter()).map(|(a, b)| a ^ b));
        block = Sha1::new().chain_update(password).chain_update(block).finalize();
    }
    out
}

fn protect_key(plain: &[u8], password: &[u8]) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| VaultError::Keystore(format!("failed to generate salt: {}", e)))?;

    let encrypted = keystream_xor(password, &salt, plain);
    let check = Sha1::new().chain_update(password).chain_update(plain).finalize();

    let mut protected = Vec::with_capacity(SALT_LEN + plain.len() + DIGEST_LEN);
    protected.extend_from_slice(&salt);
    protected.extend_from_slice(&encrypted);
    protected.extend_from_slice(&check);

    let info = EncryptedKeyInfo {
        algorithm: AlgorithmIdentifierRef {
            oid: KEY_PROTECTOR_OID,
            parameters: Some(AnyRef::NULL),
        },
        encrypted_data: OctetStringRef::new(&protected)
            .map_err(|e| VaultError::Keystore(format!("failed to wrap protected key: {}", e)))?,
    };
    info.to_der()
        .map_err(|e| VaultError::Keystore(format!("failed to encode protected key: {}", e)))
}

fn recover_key(encoded: &[u8], password: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let info = EncryptedKeyInfo::from_der(encoded)
        .map_err(|e| VaultError::Keystore(format!("malformed protected key: {}", e)))?;
    if info.algorithm.oid != KEY_PROTECTOR_OID {
        return Err(VaultError::Keystore(format!(
            "unsupported key protection algorithm {}",
            info.algorithm.oid
        )));
    }

    let protected = info.encrypted_data.as_bytes();
    if protected.len() < SALT_LEN + DIGEST_LEN {
        return Err(VaultError::Keystore("protected key is truncated".to_string()));
    }
    let (salt, rest) = protected.split_at(SALT_LEN);
    let (encrypted, check) = rest.split_at(rest.len() - DIGEST_LEN);

    let plain = keystream_xor(password, salt, encrypted);
    let expected = Sha1::new().chain_update(password).chain_update(&*plain).finalize();
    if expected.as_slice() != check {
        return Err(VaultError::Keystore(
            "cannot recover key: wrong password or corrupted entry".to_string(),
        ));
    }
    Ok(plain)
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn utf(&mut self, s: &str) -> Result<()> {
        let len = u16::try_from(s.len())
            .map_err(|_| VaultError::Keystore(format!("string too long for keystore: {} bytes", s.len())))?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }

    fn bytes(&mut self, b: &[u8]) -> Result<()> {
        let len = u32::try_from(b.len())
            .map_err(|_| VaultError::Keystore("entry too large for keystore".to_string()))?;
        self.u32(len);
        self.buf.extend_from_slice(b);
        Ok(())
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| VaultError::Keystore("unexpected end of keystore".to_string()))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let hi = self.u32()? as u64;
        let lo = self.u32()? as u64;
        Ok((hi << 32) | lo)
    }

    fn utf(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| VaultError::Keystore("invalid UTF-8 in keystore string".to_string()))
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}

fn store_digest(password: &[u8], body: &[u8]) -> [u8; DIGEST_LEN] {
    let digest = Sha1::new()
        .chain_update(password)
        .chain_update(WHITENER)
        .chain_update(body)
        .finalize();
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&digest);
    out
}

/// Serialize `entries` into a JKS store protected by `password`. The same
/// password protects each key entry. Aliases are lower-cased.
pub fn encode_keystore(entries: &[PrivateKeyEntry], password: &str) -> Result<Vec<u8>> {
    let password = password_bytes(password);
    let count = u32::try_from(entries.len())
        .map_err(|_| VaultError::Keystore("too many keystore entries".to_string()))?;

    let mut w = Writer { buf: Vec::new() };
    w.u32(MAGIC);
    w.u32(VERSION);
    w.u32(count);

    for entry in entries {
        let millis = u64::try_from(entry.creation_time.timestamp_millis())
            .map_err(|_| VaultError::Keystore("entry creation time precedes the epoch".to_string()))?;
        let chain_len = u32::try_from(entry.certificate_chain.len())
            .map_err(|_| VaultError::Keystore("certificate chain too long".to_string()))?;

        w.u32(TAG_PRIVATE_KEY);
        w.utf(&entry.alias.to_lowercase())?;
        w.u64(millis);
        w.bytes(&protect_key(&entry.private_key, &password)?)?;
        w.u32(chain_len);
        for cert in &entry.certificate_chain {
            w.utf(CERT_TYPE)?;
            w.bytes(cert)?;
        }
    }

    let digest = store_digest(&password, &w.buf);
    w.buf.extend_from_slice(&digest);
    Ok(w.buf)
}

/// Parse a JKS store, verify its integrity digest and recover every private
/// key entry with `password`. Trusted certificate entries are skipped.
pub fn decode_keystore(data: &[u8], password: &str) -> Result<Vec<PrivateKeyEntry>> {
    let password = password_bytes(password);
    if data.len() < DIGEST_LEN {
        return Err(VaultError::Keystore("keystore is truncated".to_string()));
    }
    let (body, digest) = data.split_at(data.len() - DIGEST_LEN);
    if store_digest(&password, body).as_slice() != digest {
        return Err(VaultError::Keystore(
            "keystore integrity check failed: wrong password or tampered store".to_string(),
        ));
    }

    let mut r = Reader { data: body, pos: 0 };
    if r.u32()? != MAGIC {
        return Err(VaultError::Keystore("not a JKS keystore".to_string()));
    }
    let version = r.u32()?;
    if version != VERSION {
        return Err(VaultError::Keystore(format!("unsupported keystore version {}", version)));
    }

    let count = r.u32()?;
    let mut entries = Vec::new();
    for _ in 0..count {
        match r.u32()? {
            TAG_PRIVATE_KEY => {
                let alias = r.utf()?;
                let millis = r.u64()?;
                let private_key = recover_key(r.bytes()?, &password)?;
                let chain_len = r.u32()?;
                let mut certificate_chain = Vec::new();
                for _ in 0..chain_len {
                    let cert_type = r.utf()?;
                    if cert_type != CERT_TYPE {
                        return Err(VaultError::Keystore(format!(
                            "unsupported certificate type {:?}",
                            cert_type
                        )));
                    }
                    certificate_chain.push(r.bytes()?.to_vec());
                }
                let creation_time = i64::try_from(millis)
                    .ok()
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                    .ok_or_else(|| VaultError::Keystore("invalid entry creation time".to_string()))?;
                entries.push(PrivateKeyEntry {
                    alias,
                    creation_time,
                    private_key,
                    certificate_chain,
                });
            }
            TAG_TRUSTED_CERT => {
                r.utf()?;
                r.u64()?;
                r.utf()?;
                r.bytes()?;
            }
            tag => return Err(VaultError::Keystore(format!("unknown keystore entry tag {}", tag))),
        }
    }

    if r.pos != body.len() {
        return Err(VaultError::Keystore("trailing data after keystore entries".to_string()));
    }
    Ok(entries)
}
