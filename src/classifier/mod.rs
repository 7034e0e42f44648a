//! Risk classifier wrapping a pretrained binary model.
//!
//! The model is loaded once and checked against the lab panel at load time:
//! its feature count must equal [`FEATURE_COUNT`] and, when the artifact
//! records feature names, they must follow the panel order.

pub mod xgboost;

pub use xgboost::GradientBoostedModel;

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::features::FeatureVector;
use crate::schema::{FeatureField, FEATURE_COUNT};

/// Errors that can occur while loading a model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model not found at path: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse model: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unsupported booster: {0}")]
    UnsupportedBooster(String),

    #[error("Unsupported objective: {0}")]
    UnsupportedObjective(String),

    #[error("Invalid model parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid base score: {0}")]
    InvalidBaseScore(String),

    #[error("Malformed tree {tree}: {reason}")]
    MalformedTree { tree: usize, reason: String },

    #[error("Model expects {expected} features, lab panel has {actual}")]
    FeatureCountMismatch { expected: usize, actual: usize },

    #[error("Model feature {position} is {found:?}, lab panel expects {expected:?}")]
    FeatureNameMismatch {
        position: usize,
        found: String,
        expected: &'static str,
    },
}

/// A pretrained binary classifier over a fixed-width numeric input
pub trait RiskModel: Send + Sync {
    /// Number of input features the model was trained with
    fn num_features(&self) -> usize;

    /// Feature names recorded at training time, if any
    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    /// Probability mass assigned to the positive class
    fn positive_probability(&self, features: &[f64]) -> f64;
}

/// Scores feature vectors with a loaded model
pub struct RiskClassifier {
    model: Box<dyn RiskModel>,
}

impl RiskClassifier {
    /// Wrap a model, verifying it matches the lab panel
    pub fn new<M: RiskModel + 'static>(model: M) -> Result<Self, ModelError> {
        check_layout(&model)?;
        Ok(Self {
            model: Box::new(model),
        })
    }

    /// Load an XGBoost JSON model from disk
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let model = GradientBoostedModel::load(path)?;
        let classifier = Self::new(model)?;
        info!("Risk classifier ready ({} features)", FEATURE_COUNT);
        Ok(classifier)
    }

    /// Probability of sepsis in `[0, 1]`
    pub fn score(&self, features: &FeatureVector) -> f64 {
        let values = features.values();
        // Holds for every classifier built through `new`.
        assert_eq!(values.len(), self.model.num_features(), "feature vector width");

        let probability = self.model.positive_probability(values).clamp(0.0, 1.0);
        debug!(
            "Scored vector with {} missing fields: {:.4}",
            features.missing_count(),
            probability
        );
        probability
    }
}

impl std::fmt::Debug for RiskClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskClassifier")
            .field("num_features", &self.model.num_features())
            .finish()
    }
}

fn check_layout(model: &dyn RiskModel) -> Result<(), ModelError> {
    if model.num_features() != FEATURE_COUNT {
        return Err(ModelError::FeatureCountMismatch {
            expected: model.num_features(),
            actual: FEATURE_COUNT,
        });
    }

    if let Some(names) = model.feature_names() {
        if names.len() != FEATURE_COUNT {
            return Err(ModelError::FeatureCountMismatch {
                expected: names.len(),
                actual: FEATURE_COUNT,
            });
        }
        for (position, (name, field)) in names.iter().zip(FeatureField::ALL).enumerate() {
            if FeatureField::from_name(name) != Some(field) {
                return Err(ModelError::FeatureNameMismatch {
                    position,
                    found: name.clone(),
                    expected: field.name(),
                });
            }
        }
    }

    Ok(())
}
