//! Scoring and record keeping behind one owned context.
//!
//! A [`RiskService`] owns the loaded classifier and the open store for the
//! life of the host process. Nothing here is global; hosts build one at
//! startup and call [`RiskService::shutdown`] when done.

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::classifier::RiskClassifier;
use crate::config::Config;
use crate::features::{assemble, assemble_text, FeatureVector};
use crate::risk::RiskAssessment;
use crate::schema::FEATURE_COUNT;
use crate::store::{PatientRecord, PatientStore, PatientSummary, StoreError};

#[derive(Debug)]
pub struct RiskService {
    classifier: RiskClassifier,
    store: PatientStore,
}

impl RiskService {
    pub fn new(classifier: RiskClassifier, store: PatientStore) -> Self {
        Self { classifier, store }
    }

    /// Load the model and open the store named by `config`.
    ///
    /// Logging is left to the host; see [`crate::logging::init_from_config`].
    pub fn open(config: &Config) -> Result<Self> {
        let model_path = config.get_model_path()?;
        let classifier = RiskClassifier::load(&model_path)
            .with_context(|| format!("Failed to load risk model from {:?}", model_path))?;

        let database_path = config.get_database_path()?;
        let store = PatientStore::open(&database_path)
            .with_context(|| format!("Failed to open patient store at {:?}", database_path))?;

        info!("Risk service ready");
        Ok(Self::new(classifier, store))
    }

    /// Score an already-assembled vector
    pub fn score(&self, features: FeatureVector) -> RiskAssessment {
        let probability = self.classifier.score(&features);
        let assessment = RiskAssessment::new(features, probability);
        debug!(
            "Assessment: probability {:.4}, category {}, {} fields missing",
            assessment.probability(),
            assessment.category(),
            features.missing_count()
        );
        assessment
    }

    /// Assemble, score and bucket form text (empty string means absent)
    pub fn assess_text<S: AsRef<str>>(&self, raw: &[S; FEATURE_COUNT]) -> RiskAssessment {
        self.score(assemble_text(raw))
    }

    /// Assemble, score and bucket optional raw inputs
    pub fn assess<S: AsRef<str>>(&self, raw: &[Option<S>; FEATURE_COUNT]) -> RiskAssessment {
        self.score(assemble(raw))
    }

    /// Persist an assessment under the given names
    pub fn save(
        &mut self,
        first_name: &str,
        last_name: &str,
        assessment: &RiskAssessment,
    ) -> Result<i64, StoreError> {
        self.store.save(
            first_name,
            last_name,
            assessment.features(),
            assessment.probability(),
        )
    }

    pub fn list_summary(&self) -> Result<Vec<PatientSummary>, StoreError> {
        self.store.list_summary()
    }

    pub fn get_full(&self, id: i64) -> Result<Option<PatientRecord>, StoreError> {
        self.store.get_full(id)
    }

    pub fn classifier(&self) -> &RiskClassifier {
        &self.classifier
    }

    pub fn store(&self) -> &PatientStore {
        &self.store
    }

    /// Release the model and close the store
    pub fn shutdown(self) -> Result<(), StoreError> {
        info!("Risk service shutting down");
        self.store.close()
    }
}
