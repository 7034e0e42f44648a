//! Probability to risk category bucketing.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::FeatureVector;

/// Lower bound (inclusive) of the medium bucket
pub const MEDIUM_THRESHOLD: f64 = 0.30;
/// Lower bound (inclusive) of the high bucket
pub const HIGH_THRESHOLD: f64 = 0.70;

/// Discrete sepsis risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    /// Bucket a probability: `[0, 0.3)` low, `[0.3, 0.7)` medium, `[0.7, 1]` high
    pub fn from_probability(probability: f64) -> Self {
        if probability < MEDIUM_THRESHOLD {
            Self::Low
        } else if probability < HIGH_THRESHOLD {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "low probability of sepsis",
            Self::Medium => "medium probability of sepsis",
            Self::High => "high probability of sepsis",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Medium => f.write_str("medium"),
            Self::High => f.write_str("high"),
        }
    }
}

/// Bucket a probability into a [`RiskCategory`]
pub fn bucket(probability: f64) -> RiskCategory {
    RiskCategory::from_probability(probability)
}

/// Result of scoring one set of lab values.
///
/// The category is always derived from the probability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    features: FeatureVector,
    probability: f64,
    category: RiskCategory,
}

impl RiskAssessment {
    pub fn new(features: FeatureVector, probability: f64) -> Self {
        Self {
            features,
            probability,
            category: bucket(probability),
        }
    }

    pub fn features(&self) -> &FeatureVector {
        &self.features
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn category(&self) -> RiskCategory {
        self.category
    }

    /// One-line result, e.g. "Sepsis probability: 0.82, high probability of sepsis"
    pub fn summary(&self) -> String {
        format!(
            "Sepsis probability: {:.2}, {}",
            self.probability,
            self.category.description()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(bucket(0.0), RiskCategory::Low);
        assert_eq!(bucket(0.2999), RiskCategory::Low);
        assert_eq!(bucket(0.30), RiskCategory::Medium);
        assert_eq!(bucket(0.6999), RiskCategory::Medium);
        assert_eq!(bucket(0.70), RiskCategory::High);
        assert_eq!(bucket(1.0), RiskCategory::High);
    }

    #[test]
    fn test_summary() {
        let assessment = RiskAssessment::new(FeatureVector::all_missing(), 0.8234);
        assert_eq!(assessment.category(), RiskCategory::High);
        assert_eq!(
            assessment.summary(),
            "Sepsis probability: 0.82, high probability of sepsis"
        );

        let assessment = RiskAssessment::new(FeatureVector::all_missing(), 0.1);
        assert_eq!(
            assessment.summary(),
            "Sepsis probability: 0.10, low probability of sepsis"
        );
    }

    #[test]
    fn test_category_follows_probability() {
        for p in [0.0, 0.29, 0.3, 0.5, 0.7, 0.99] {
            let assessment = RiskAssessment::new(FeatureVector::all_missing(), p);
            assert_eq!(assessment.probability(), p);
            assert_eq!(assessment.category(), bucket(p));
        }
    }

    #[test]
    fn test_category_serde() {
        let json = serde_json::to_string(&RiskCategory::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
        assert_eq!(RiskCategory::High.to_string(), "high");
    }

    proptest! {
        #[test]
        fn prop_bucket_matches_thresholds(p in 0.0f64..=1.0) {
            let category = bucket(p);
            prop_assert_eq!(category == RiskCategory::Low, p < 0.30);
            prop_assert_eq!(category == RiskCategory::Medium, (0.30..0.70).contains(&p));
            prop_assert_eq!(category == RiskCategory::High, p >= 0.70);
            prop_assert_eq!(bucket(p), category);
        }
    }
}
