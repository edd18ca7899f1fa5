//! Variant lists and the cumulative interval table derived from them.
//!
//! Exposures are accumulated in fixed-point (nine decimal places) so interval
//! boundaries are exact decimals and adjacent intervals share the same
//! boundary value bit-for-bit. When the exposures pass the sum check the last
//! upper bound is pinned to exactly 1.0, which closes any rounding gap at the
//! top of the bucket domain.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use tracing::warn;

use crate::error::{GxtError, Result};

/// Maximum allowed distance between the exposure sum and 1.0.
pub const EXPOSURE_TOLERANCE: f64 = 1e-6;

const FIXED_SCALE: i64 = 1_000_000_000;

/// One treatment arm as declared in `config.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub exposure: f64,
}

impl Variant {
    pub fn new(name: impl Into<String>, exposure: f64) -> Self {
        Self {
            name: name.into(),
            exposure,
        }
    }
}

/// An interval boundary in `[0, 1]`, stored as billionths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Boundary(i64);

impl Boundary {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(FIXED_SCALE);

    #[allow(clippy::cast_possible_truncation)]
    fn from_exposure(exposure: f64) -> i64 {
        (exposure * FIXED_SCALE as f64).round() as i64
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / FIXED_SCALE as f64
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / FIXED_SCALE;
        let frac = self.0 % FIXED_SCALE;
        if frac == 0 {
            return write!(f, "{whole}.0");
        }
        let digits = format!("{frac:09}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl Serialize for Boundary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

/// Half-open interval `[low, high)` owned by one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CumulativeInterval {
    pub variant: String,
    pub low: Boundary,
    pub high: Boundary,
}

impl CumulativeInterval {
    #[must_use]
    pub fn contains(&self, bucket: f64) -> bool {
        bucket >= self.low.as_f64() && bucket < self.high.as_f64()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.low.0 >= self.high.0
    }
}

/// A validated, ordered, non-empty variant list.
///
/// Order is significant: it fixes which slice of the bucket domain each
/// variant owns. Nothing here sorts or normalizes.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantSet {
    variants: Vec<Variant>,
    intervals: Vec<CumulativeInterval>,
}

impl VariantSet {
    /// Validate `variants` for `experiment` and build the interval table.
    pub fn new(experiment: &str, variants: Vec<Variant>) -> Result<Self> {
        if variants.is_empty() {
            return Err(GxtError::EmptyVariants {
                experiment: experiment.to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (idx, variant) in variants.iter().enumerate() {
            if variant.name.trim().is_empty() {
                return Err(GxtError::EmptyVariantName {
                    experiment: experiment.to_string(),
                    position: idx + 1,
                });
            }
            if !seen.insert(variant.name.as_str()) {
                return Err(GxtError::DuplicateVariant {
                    experiment: experiment.to_string(),
                    variant: variant.name.clone(),
                });
            }
            if !variant.exposure.is_finite() || variant.exposure < 0.0 {
                return Err(GxtError::InvalidExposure {
                    experiment: experiment.to_string(),
                    variant: variant.name.clone(),
                    exposure: variant.exposure,
                });
            }
        }

        let sum: f64 = variants.iter().map(|v| v.exposure).sum();
        if (sum - 1.0).abs() > EXPOSURE_TOLERANCE {
            return Err(GxtError::ExposureSum {
                experiment: experiment.to_string(),
                sum,
            });
        }

        for variant in variants.iter().filter(|v| v.exposure == 0.0) {
            warn!(
                experiment,
                variant = %variant.name,
                "variant has zero exposure and will receive no units"
            );
        }

        let intervals = cumulative_intervals(&variants);
        Ok(Self {
            variants,
            intervals,
        })
    }

    #[must_use]
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    #[must_use]
    pub fn intervals(&self) -> &[CumulativeInterval] {
        &self.intervals
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    #[must_use]
    pub fn exposure_of(&self, name: &str) -> Option<f64> {
        self.variants
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.exposure)
    }

    /// Variant owning `bucket`: the first interval with `low <= bucket < high`.
    ///
    /// Mirrors the CASE expression emitted into SQL, so `None` here is the
    /// same condition that surfaces as a NULL variant at execution time.
    #[must_use]
    pub fn classify(&self, bucket: f64) -> Option<&str> {
        self.intervals
            .iter()
            .find(|interval| interval.contains(bucket))
            .map(|interval| interval.variant.as_str())
    }
}

impl Serialize for VariantSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.variants.serialize(serializer)
    }
}

fn cumulative_intervals(variants: &[Variant]) -> Vec<CumulativeInterval> {
    let last = variants.len() - 1;
    let mut cumulative = 0_i64;
    variants
        .iter()
        .enumerate()
        .map(|(idx, variant)| {
            let low = cumulative.min(FIXED_SCALE);
            cumulative += Boundary::from_exposure(variant.exposure);
            let high = if idx == last {
                FIXED_SCALE
            } else {
                cumulative.min(FIXED_SCALE)
            };
            CumulativeInterval {
                variant: variant.name.clone(),
                low: Boundary(low),
                high: Boundary(high),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(pairs: &[(&str, f64)]) -> Result<VariantSet> {
        VariantSet::new(
            "exp",
            pairs
                .iter()
                .map(|(name, exposure)| Variant::new(*name, *exposure))
                .collect(),
        )
    }

    fn bounds(set: &VariantSet) -> Vec<(String, String, String)> {
        set.intervals()
            .iter()
            .map(|i| (i.variant.clone(), i.low.to_string(), i.high.to_string()))
            .collect()
    }

    // =========================================================================
    // Interval construction
    // =========================================================================

    #[test]
    fn two_way_split_has_half_boundaries() {
        let set = set(&[("control", 0.5), ("treatment", 0.5)]).unwrap();
        assert_eq!(
            bounds(&set),
            vec![
                ("control".into(), "0.0".into(), "0.5".into()),
                ("treatment".into(), "0.5".into(), "1.0".into()),
            ]
        );
    }

    #[test]
    fn three_way_split_keeps_input_order_and_exact_decimals() {
        let set = set(&[("a", 0.3), ("b", 0.3), ("c", 0.4)]).unwrap();
        assert_eq!(
            bounds(&set),
            vec![
                ("a".into(), "0.0".into(), "0.3".into()),
                ("b".into(), "0.3".into(), "0.6".into()),
                ("c".into(), "0.6".into(), "1.0".into()),
            ]
        );
    }

    #[test]
    fn reordering_moves_boundaries_not_names() {
        let set = set(&[("c", 0.4), ("a", 0.3), ("b", 0.3)]).unwrap();
        assert_eq!(
            bounds(&set),
            vec![
                ("c".into(), "0.0".into(), "0.4".into()),
                ("a".into(), "0.4".into(), "0.7".into()),
                ("b".into(), "0.7".into(), "1.0".into()),
            ]
        );
    }

    #[test]
    fn tenths_accumulate_without_drift() {
        let pairs: Vec<(String, f64)> = (0..10).map(|i| (format!("v{i}"), 0.1)).collect();
        let refs: Vec<(&str, f64)> = pairs.iter().map(|(n, e)| (n.as_str(), *e)).collect();
        let set = set(&refs).unwrap();
        let highs: Vec<String> = set.intervals().iter().map(|i| i.high.to_string()).collect();
        assert_eq!(
            highs,
            vec!["0.1", "0.2", "0.3", "0.4", "0.5", "0.6", "0.7", "0.8", "0.9", "1.0"]
        );
    }

    #[test]
    fn last_boundary_is_pinned_to_one_within_tolerance() {
        let set = set(&[("a", 0.5), ("b", 0.4999995)]).unwrap();
        assert_eq!(set.intervals()[1].high, Boundary::ONE);
        assert_eq!(set.classify(0.999_999), Some("b"));
    }

    #[test]
    fn zero_exposure_variant_owns_an_empty_interval() {
        let set = set(&[("a", 0.5), ("holdout", 0.0), ("b", 0.5)]).unwrap();
        assert!(set.intervals()[1].is_empty());
        assert_eq!(set.classify(0.5), Some("b"));
    }

    #[test]
    fn classify_uses_half_open_intervals() {
        let set = set(&[("control", 0.5), ("treatment", 0.5)]).unwrap();
        assert_eq!(set.classify(0.0), Some("control"));
        assert_eq!(set.classify(0.1), Some("control"));
        assert_eq!(set.classify(0.49999), Some("control"));
        assert_eq!(set.classify(0.5), Some("treatment"));
        assert_eq!(set.classify(0.6), Some("treatment"));
        assert_eq!(set.classify(1.0), None);
    }

    // =========================================================================
    // Rejection
    // =========================================================================

    #[test]
    fn empty_list_is_rejected() {
        let err = VariantSet::new("exp", Vec::new()).unwrap_err();
        assert!(matches!(err, GxtError::EmptyVariants { .. }));
    }

    #[test]
    fn sums_off_by_a_tenth_are_rejected() {
        for pairs in [
            &[("a", 0.5), ("b", 0.4)][..],
            &[("a", 0.5), ("b", 0.6)][..],
        ] {
            match set(pairs).unwrap_err() {
                GxtError::ExposureSum { experiment, sum } => {
                    assert_eq!(experiment, "exp");
                    assert!((sum - 1.0).abs() > 0.09);
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn tolerance_boundary_below() {
        assert!(set(&[("a", 0.5), ("b", 0.499_999_1)]).is_ok());
        assert!(set(&[("a", 0.5), ("b", 0.499_998)]).is_err());
    }

    #[test]
    fn tolerance_boundary_above() {
        assert!(set(&[("a", 0.5), ("b", 0.500_000_9)]).is_ok());
        assert!(set(&[("a", 0.5), ("b", 0.500_002)]).is_err());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = set(&[("a", 0.5), ("a", 0.5)]).unwrap_err();
        assert!(matches!(err, GxtError::DuplicateVariant { variant, .. } if variant == "a"));
    }

    #[test]
    fn blank_names_are_rejected() {
        let err = set(&[("a", 0.5), ("  ", 0.5)]).unwrap_err();
        assert!(matches!(err, GxtError::EmptyVariantName { position: 2, .. }));
    }

    #[test]
    fn negative_and_nan_exposures_are_rejected() {
        let err = set(&[("a", 1.5), ("b", -0.5)]).unwrap_err();
        assert!(matches!(err, GxtError::InvalidExposure { .. }));
        let err = set(&[("a", f64::NAN), ("b", 1.0)]).unwrap_err();
        assert!(matches!(err, GxtError::InvalidExposure { .. }));
    }

    #[test]
    fn weights_are_never_normalized() {
        assert!(set(&[("a", 1.0), ("b", 1.0)]).is_err());
    }

    #[test]
    fn boundary_display() {
        assert_eq!(Boundary::ZERO.to_string(), "0.0");
        assert_eq!(Boundary::ONE.to_string(), "1.0");
        assert_eq!(Boundary(250_000_000).to_string(), "0.25");
        assert_eq!(Boundary(123_456_789).to_string(), "0.123456789");
    }

    // =========================================================================
    // Properties
    // =========================================================================

    fn weights() -> impl Strategy<Value = Vec<u32>> {
        prop::collection::vec(0_u32..1000, 1..12).prop_filter("non-zero total", |w| {
            w.iter().copied().map(u64::from).sum::<u64>() > 0
        })
    }

    proptest! {
        #[test]
        fn intervals_partition_unit_range(raw in weights()) {
            let total: f64 = raw.iter().copied().map(f64::from).sum();
            let variants: Vec<Variant> = raw
                .iter()
                .enumerate()
                .map(|(i, w)| Variant::new(format!("v{i}"), f64::from(*w) / total))
                .collect();
            let set = VariantSet::new("prop", variants).unwrap();
            let intervals = set.intervals();

            prop_assert_eq!(intervals[0].low, Boundary::ZERO);
            prop_assert_eq!(intervals[intervals.len() - 1].high, Boundary::ONE);
            for pair in intervals.windows(2) {
                prop_assert_eq!(pair[0].high, pair[1].low);
            }
            for interval in intervals {
                prop_assert!(interval.low <= interval.high);
            }
        }

        #[test]
        fn every_bucket_in_domain_is_classified(raw in weights(), bucket in 0_u32..1_000_000) {
            let total: f64 = raw.iter().copied().map(f64::from).sum();
            let variants: Vec<Variant> = raw
                .iter()
                .enumerate()
                .map(|(i, w)| Variant::new(format!("v{i}"), f64::from(*w) / total))
                .collect();
            let set = VariantSet::new("prop", variants).unwrap();
            prop_assert!(set.classify(f64::from(bucket) / 1_000_000.0).is_some());
        }
    }
}
