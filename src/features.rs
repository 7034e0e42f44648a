//! Feature vector assembly from raw form input.

use serde::{Deserialize, Serialize};

use crate::schema::{FeatureField, FEATURE_COUNT};

/// Value substituted for a missing or unparseable measurement.
///
/// The model was trained with this marker; lab values are non-negative.
pub const MISSING_VALUE: f64 = -1.0;

/// One value per schema field, in schema order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    /// Build a vector from already-numeric values.
    ///
    /// Non-finite values are replaced with [`MISSING_VALUE`].
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values.map(|v| if v.is_finite() { v } else { MISSING_VALUE }))
    }

    /// Vector with every field missing
    pub fn all_missing() -> Self {
        Self([MISSING_VALUE; FEATURE_COUNT])
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    pub fn get(&self, field: FeatureField) -> f64 {
        self.0[field.position()]
    }

    pub fn is_missing(&self, field: FeatureField) -> bool {
        self.get(field) == MISSING_VALUE
    }

    pub fn missing_count(&self) -> usize {
        self.0.iter().filter(|&&v| v == MISSING_VALUE).count()
    }

    /// Iterate `(field, value)` pairs in schema order
    pub fn iter(&self) -> impl Iterator<Item = (FeatureField, f64)> + '_ {
        FeatureField::ALL.iter().copied().zip(self.0.iter().copied())
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::all_missing()
    }
}

/// Parse one raw field, falling back to [`MISSING_VALUE`]
pub fn coerce(raw: Option<&str>) -> f64 {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(MISSING_VALUE)
}

/// Assemble a vector from optional raw inputs in schema order.
///
/// Each position is coerced independently; this never fails.
pub fn assemble<S: AsRef<str>>(raw: &[Option<S>; FEATURE_COUNT]) -> FeatureVector {
    let mut values = [MISSING_VALUE; FEATURE_COUNT];
    for (slot, input) in values.iter_mut().zip(raw.iter()) {
        *slot = coerce(input.as_ref().map(AsRef::as_ref));
    }
    FeatureVector(values)
}

/// Assemble a vector from form text, where an empty string means absent
pub fn assemble_text<S: AsRef<str>>(raw: &[S; FEATURE_COUNT]) -> FeatureVector {
    let mut values = [MISSING_VALUE; FEATURE_COUNT];
    for (slot, input) in values.iter_mut().zip(raw.iter()) {
        *slot = coerce(Some(input.as_ref()));
    }
    FeatureVector(values)
}
