//! Sepsis risk scoring from a fixed lab panel, with a local patient record store.
//!
//! Raw field text is assembled into a [`FeatureVector`], scored by a
//! pretrained [`RiskClassifier`], bucketed into a [`RiskCategory`], and can be
//! saved as a patient record through [`PatientStore`]. [`RiskService`] ties
//! these together for a host application.

pub mod classifier;
pub mod config;
pub mod features;
pub mod logging;
pub mod risk;
pub mod schema;
pub mod service;
pub mod store;


pub use classifier::{GradientBoostedModel, ModelError, RiskClassifier, RiskModel};
pub use config::Config;
pub use features::{assemble, assemble_text, FeatureVector, MISSING_VALUE};
pub use risk::{bucket, RiskAssessment, RiskCategory};
pub use schema::{FeatureField, FEATURE_COUNT};
pub use service::RiskService;
pub use store::{PatientRecord, PatientStore, PatientSummary, StoreError};
