//! Deterministic hash buckets.
//!
//! A bucket is `abs(hash(key)) mod P / P` where `key` is the unit value,
//! optionally suffixed with `::` and the experiment salt. Each engine renders
//! that recipe as a SQL expression; [`bucket_value`] evaluates the same
//! recipe in-process with the SHA-256 fingerprint the local engine registers.

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Separator placed between the unit value and the salt before hashing.
pub const SALT_SEPARATOR: &str = "::";

/// Default bucket resolution.
pub const DEFAULT_PRECISION: u64 = 1_000_000;

/// Number of distinct bucket values; the divisor in `hash mod P / P`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Precision(NonZeroU64);

impl Precision {
    #[must_use]
    pub const fn new(value: u64) -> Option<Self> {
        match NonZeroU64::new(value) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl Default for Precision {
    fn default() -> Self {
        NonZeroU64::new(DEFAULT_PRECISION).map_or(Self(NonZeroU64::MIN), Self)
    }
}

impl TryFrom<u64> for Precision {
    type Error = String;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "precision must be a positive integer".to_string())
    }
}

impl From<Precision> for u64 {
    fn from(value: Precision) -> Self {
        value.get()
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Renders the bucket recipe as a SQL expression for one engine.
///
/// Implementations must be pure: identical `(column, salt, precision)`
/// always yields identical text, and a non-empty salt must change the text.
/// Different engines may use different hash families.
pub trait BucketHashRenderer: Send + Sync {
    /// Registry key, lowercase.
    fn engine(&self) -> &'static str;

    /// Expression evaluating to a bucket in `[0, 1)` for `column`.
    ///
    /// An empty `salt` hashes the column value directly with no concatenation.
    fn render(&self, column: &str, salt: &str, precision: Precision) -> String;

    /// Quote `value` as a string literal in this dialect.
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }
}

/// Signed 64-bit fingerprint: the first eight bytes of SHA-256, big-endian.
///
/// `i64::MIN` is folded to `i64::MAX` so `abs()` is total in SQL engines that
/// trap on overflow.
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> i64 {
    let digest = Sha256::digest(bytes);
    let mut head = [0_u8; 8];
    head.copy_from_slice(&digest[..8]);
    match i64::from_be_bytes(head) {
        i64::MIN => i64::MAX,
        value => value,
    }
}

/// Hash key for `unit` under `salt`.
#[must_use]
pub fn bucket_key(unit: &str, salt: &str) -> String {
    if salt.is_empty() {
        unit.to_string()
    } else {
        format!("{unit}{SALT_SEPARATOR}{salt}")
    }
}

/// In-process bucket value matching the local engine's SQL rendering.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bucket_value(unit: &str, salt: &str, precision: Precision) -> f64 {
    let key = bucket_key(unit, salt);
    let modulus = fingerprint(key.as_bytes()).unsigned_abs() % precision.get();
    modulus as f64 / precision.get() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_precision_is_one_million() {
        assert_eq!(Precision::default().get(), DEFAULT_PRECISION);
    }

    #[test]
    fn zero_precision_is_rejected() {
        assert!(Precision::new(0).is_none());
        assert!(Precision::try_from(0).is_err());
        let parsed: std::result::Result<Precision, _> = serde_yaml::from_str("0");
        assert!(parsed.is_err());
    }

    #[test]
    fn bucket_key_omits_separator_without_salt() {
        assert_eq!(bucket_key("u1", ""), "u1");
        assert_eq!(bucket_key("u1", "exp"), "u1::exp");
    }

    #[test]
    fn fingerprint_is_stable() {
        // sha256("") = e3b0c442 98fc1c14 ...
        assert_eq!(fingerprint(b""), i64::from_be_bytes([
            0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14
        ]));
    }

    #[test]
    fn salts_decorrelate_units() {
        let precision = Precision::default();
        let same = (0..200)
            .filter(|i| {
                let unit = format!("user-{i}");
                (bucket_value(&unit, "exp_a", precision) < 0.5)
                    == (bucket_value(&unit, "exp_b", precision) < 0.5)
            })
            .count();
        // Independent halves agree about half the time.
        assert!((60..=140).contains(&same), "agreement {same} of 200");
    }

    #[test]
    fn buckets_spread_across_domain() {
        let precision = Precision::default();
        let mut deciles = [0_u32; 10];
        for i in 0..5000 {
            let bucket = bucket_value(&i.to_string(), "spread", precision);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let idx = (bucket * 10.0) as usize;
            deciles[idx] += 1;
        }
        for count in deciles {
            assert!((350..=650).contains(&count), "decile count {count}");
        }
    }

    proptest! {
        #[test]
        fn bucket_value_is_pure_and_in_range(unit in ".{0,40}", salt in "[a-z_]{0,12}", p in 1_u64..10_000_000) {
            let precision = Precision::new(p).unwrap();
            let first = bucket_value(&unit, &salt, precision);
            let second = bucket_value(&unit, &salt, precision);
            prop_assert_eq!(first.to_bits(), second.to_bits());
            prop_assert!((0.0..1.0).contains(&first));
        }
    }
}
