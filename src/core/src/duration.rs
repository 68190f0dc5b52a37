//! Go-style duration strings (`"24h"`, `"1h30m"`, `"500ms"`, `"0s"`)
//!
//! Profiles carry rotation intervals in the same notation operators already
//! use for Kubernetes manifests, so the parser accepts any sequence of
//! `<integer><unit>` pairs with units `ns`, `us`, `µs`, `ms`, `s`, `m`, `h`.

use crate::error::{CoreError, Result};
use std::time::Duration;

const UNITS: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 60 * 60 * 1_000_000_000),
];

/// Parse a duration string such as `"2160h"` or `"1h30m"`.
pub fn parse(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(CoreError::duration(input, "empty string"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(CoreError::duration(input, "expected a number"));
        }
        let value: u128 = rest[..digits]
            .parse()
            .map_err(|_| CoreError::duration(input, "number out of range"))?;
        rest = &rest[digits..];

        let unit_len = rest.chars().take_while(|c| !c.is_ascii_digit()).map(char::len_utf8).sum();
        let unit = &rest[..unit_len];
        let scale = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| CoreError::duration(input, format!("unknown unit {:?}", unit)))?;
        rest = &rest[unit_len..];

        total = value
            .checked_mul(scale)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| CoreError::duration(input, "overflow"))?;
    }

    let secs = u64::try_from(total / 1_000_000_000)
        .map_err(|_| CoreError::duration(input, "overflow"))?;
    Ok(Duration::new(secs, (total % 1_000_000_000) as u32))
}

/// Format a duration in the compact notation accepted by [`parse`].
pub fn format(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    if d.subsec_nanos() != 0 && d.as_secs() == 0 {
        let nanos = d.subsec_nanos();
        return if nanos % 1_000_000 == 0 {
            format!("{}ms", nanos / 1_000_000)
        } else {
            format!("{}ns", nanos)
        };
    }

    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if m > 0 {
        out.push_str(&format!("{}m", m));
    }
    if s > 0 || out.is_empty() {
        out.push_str(&format!("{}s", s));
    }
    out
}

/// `#[serde(with = "keywarden_core::duration::serde_go")]`
pub mod serde_go {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse(&s).map_err(serde::de::Error::custom)
    }
}
