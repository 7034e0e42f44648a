//! Evaluator for XGBoost models saved in the JSON format.
//!
//! Only what a binary `gbtree` classifier needs is supported: numeric splits,
//! the `binary:logistic` and `binary:logitraw` objectives, and the
//! `base_score` offset.

use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use super::{ModelError, RiskModel};

#[derive(Debug, Deserialize)]
struct ModelDocument {
    learner: LearnerDocument,
}

#[derive(Debug, Deserialize)]
struct LearnerDocument {
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: BoosterDocument,
    learner_model_param: LearnerModelParam,
    objective: ObjectiveDocument,
}

#[derive(Debug, Deserialize)]
struct BoosterDocument {
    name: String,
    #[serde(default)]
    model: Option<TreeEnsembleDocument>,
}

#[derive(Debug, Deserialize)]
struct TreeEnsembleDocument {
    trees: Vec<TreeDocument>,
}

#[derive(Debug, Deserialize)]
struct TreeDocument {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f32>,
    #[serde(default)]
    default_left: Vec<Flag>,
    #[serde(default)]
    split_type: Vec<u8>,
}

// Older releases write booleans, newer ones 0/1.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

// Numeric parameters are stored as strings.
#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    base_score: String,
    num_feature: String,
}

#[derive(Debug, Deserialize)]
struct ObjectiveDocument {
    name: String,
}

/// Supported training objectives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Margin passed through a sigmoid
    Logistic,
    /// Raw margin; the sigmoid is applied here instead
    LogitRaw,
}

impl Objective {
    fn from_name(name: &str) -> Result<Self, ModelError> {
        match name {
            "binary:logistic" => Ok(Self::Logistic),
            "binary:logitraw" => Ok(Self::LogitRaw),
            other => Err(ModelError::UnsupportedObjective(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    left: i32,
    right: i32,
    feature: usize,
    /// Split threshold, or the leaf value on leaves
    value: f32,
    default_left: bool,
}

impl Node {
    fn is_leaf(&self) -> bool {
        self.left < 0
    }
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_document(index: usize, doc: TreeDocument, num_features: usize) -> Result<Self, ModelError> {
        let malformed = |reason: String| ModelError::MalformedTree { tree: index, reason };

        let n = doc.left_children.len();
        if n == 0 {
            return Err(malformed("tree has no nodes".to_string()));
        }
        if doc.right_children.len() != n
            || doc.split_indices.len() != n
            || doc.split_conditions.len() != n
            || (!doc.default_left.is_empty() && doc.default_left.len() != n)
        {
            return Err(malformed("node arrays differ in length".to_string()));
        }
        if doc.split_type.iter().any(|&t| t != 0) {
            return Err(malformed("categorical splits are not supported".to_string()));
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let left = doc.left_children[i];
            let right = doc.right_children[i];
            let is_leaf = left < 0;

            if is_leaf != (right < 0) {
                return Err(malformed(format!("node {} has a single child", i)));
            }
            // Children always come after their parent, which also rules out cycles.
            if !is_leaf {
                for child in [left, right] {
                    let child = child as usize;
                    if child <= i || child >= n {
                        return Err(malformed(format!("node {} has invalid child {}", i, child)));
                    }
                }
            }

            let feature = doc.split_indices[i];
            if !is_leaf && (feature < 0 || feature as usize >= num_features) {
                return Err(malformed(format!("node {} splits on feature {}", i, feature)));
            }

            let value = doc.split_conditions[i];
            if !value.is_finite() {
                let kind = if is_leaf { "leaf value" } else { "split condition" };
                return Err(malformed(format!("node {} has non-finite {}", i, kind)));
            }

            nodes.push(Node {
                left,
                right,
                feature: feature.max(0) as usize,
                value,
                default_left: doc.default_left.get(i).map(|f| f.is_set()).unwrap_or(false),
            });
        }

        Ok(Self { nodes })
    }

    fn leaf_value(&self, features: &[f64]) -> f32 {
        let mut index = 0usize;
        loop {
            let node = &self.nodes[index];
            if node.is_leaf() {
                return node.value;
            }
            let x = features[node.feature];
            let go_left = if x.is_nan() {
                node.default_left
            } else {
                (x as f32) < node.value
            };
            index = if go_left { node.left } else { node.right } as usize;
        }
    }
}

/// A gradient-boosted tree ensemble trained as a binary classifier
#[derive(Debug, Clone)]
pub struct GradientBoostedModel {
    trees: Vec<Tree>,
    base_margin: f64,
    num_features: usize,
    feature_names: Vec<String>,
    objective: Objective,
}

impl GradientBoostedModel {
    /// Load a model saved with `save_model` in JSON format
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }

        info!("Loading risk model from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let model = Self::from_json(&content)?;
        info!(
            "Risk model loaded: {} trees, {} features",
            model.trees.len(),
            model.num_features
        );
        Ok(model)
    }

    /// Parse a model from its JSON text
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let doc: ModelDocument = serde_json::from_str(json)?;
        let learner = doc.learner;

        let objective = Objective::from_name(&learner.objective.name)?;

        let booster = learner.gradient_booster;
        if booster.name != "gbtree" {
            return Err(ModelError::UnsupportedBooster(booster.name));
        }
        let ensemble = booster
            .model
            .ok_or_else(|| ModelError::UnsupportedBooster("gbtree without trees".to_string()))?;

        let param = learner.learner_model_param;
        let num_features: usize = param
            .num_feature
            .trim()
            .parse()
            .map_err(|_| ModelError::InvalidParameter(format!("num_feature {:?}", param.num_feature)))?;
        let base_score = parse_base_score(&param.base_score)?;
        let base_margin = match objective {
            Objective::Logistic => {
                if !(base_score > 0.0 && base_score < 1.0) {
                    return Err(ModelError::InvalidBaseScore(param.base_score));
                }
                (base_score / (1.0 - base_score)).ln()
            }
            Objective::LogitRaw => base_score,
        };

        let trees = ensemble
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, t)| Tree::from_document(i, t, num_features))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "Parsed {:?} model, base margin {:.4}",
            objective, base_margin
        );

        Ok(Self {
            trees,
            base_margin,
            num_features,
            feature_names: learner.feature_names,
            objective,
        })
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Sum of the base margin and every tree's leaf value
    pub fn margin(&self, features: &[f64]) -> f64 {
        self.trees
            .iter()
            .map(|t| f64::from(t.leaf_value(features)))
            .sum::<f64>()
            + self.base_margin
    }
}

impl RiskModel for GradientBoostedModel {
    fn num_features(&self) -> usize {
        self.num_features
    }

    fn feature_names(&self) -> Option<&[String]> {
        if self.feature_names.is_empty() {
            None
        } else {
            Some(&self.feature_names)
        }
    }

    fn positive_probability(&self, features: &[f64]) -> f64 {
        sigmoid(self.margin(features))
    }
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Accepts both `"5E-1"` and the bracketed vector form `"[5E-1]"`
fn parse_base_score(raw: &str) -> Result<f64, ModelError> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    let first = trimmed.split(',').next().unwrap_or("").trim();
    first
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ModelError::InvalidBaseScore(raw.to_string()))
}

/// A small two-tree model over the lab panel, used by tests across the crate.
///
/// Tree 0 splits on basophils at 0.5 (left -1.0, right 2.0); tree 1 splits on
/// oxygen saturation at 90 (left 0.5, right -0.5). Base score 0.5.
#[cfg(test)]
pub(crate) fn fixture_json() -> String {
    use crate::schema::FeatureField;

    let names: Vec<String> = FeatureField::ALL.iter().map(|f| f.name().to_string()).collect();
    serde_json::json!({
        "learner": {
            "attributes": {},
            "feature_names": names,
            "feature_types": vec!["float"; 16],
            "gradient_booster": {
                "model": {
                    "gbtree_model_param": { "num_parallel_tree": "1", "num_trees": "2" },
                    "tree_info": [0, 0],
                    "trees": [
                        {
                            "base_weights": [0.0, -1.0, 2.0],
                            "default_left": [1, 0, 0],
                            "id": 0,
                            "left_children": [1, -1, -1],
                            "right_children": [2, -1, -1],
                            "parents": [2147483647, 0, 0],
                            "split_conditions": [0.5, -1.0, 2.0],
                            "split_indices": [0, 0, 0],
                            "split_type": [0, 0, 0],
                            "tree_param": { "num_feature": "16", "num_nodes": "3", "size_leaf_vector": "1" }
                        },
                        {
                            "base_weights": [0.0, 0.5, -0.5],
                            "default_left": [false, false, false],
                            "id": 1,
                            "left_children": [1, -1, -1],
                            "right_children": [2, -1, -1],
                            "parents": [2147483647, 0, 0],
                            "split_conditions": [90.0, 0.5, -0.5],
                            "split_indices": [12, 0, 0],
                            "split_type": [0, 0, 0],
                            "tree_param": { "num_feature": "16", "num_nodes": "3", "size_leaf_vector": "1" }
                        }
                    ]
                },
                "name": "gbtree"
            },
            "learner_model_param": {
                "base_score": "5E-1",
                "boost_from_average": "1",
                "num_class": "0",
                "num_feature": "16",
                "num_target": "1"
            },
            "objective": {
                "name": "binary:logistic",
                "reg_loss_param": { "scale_pos_weight": "1" }
            }
        },
        "version": [2, 0, 3]
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FEATURE_COUNT;

    fn features(basophils: f64, saturation: f64) -> Vec<f64> {
        let mut v = vec![-1.0; FEATURE_COUNT];
        v[0] = basophils;
        v[12] = saturation;
        v
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_parse_fixture() {
        let model = GradientBoostedModel::from_json(&fixture_json()).unwrap();
        assert_eq!(model.tree_count(), 2);
        assert_eq!(model.num_features(), FEATURE_COUNT);
        assert_eq!(model.objective(), Objective::Logistic);
        assert_eq!(model.feature_names().map(|n| n.len()), Some(FEATURE_COUNT));
    }

    #[test]
    fn test_margin_follows_splits() {
        let model = GradientBoostedModel::from_json(&fixture_json()).unwrap();
        // -1 sentinel goes left on both splits
        assert!(approx(model.margin(&features(-1.0, -1.0)), -0.5));
        assert!(approx(model.margin(&features(1.0, -1.0)), 2.5));
        assert!(approx(model.margin(&features(0.2, 97.0)), -1.5));
        // Equal to threshold goes right
        assert!(approx(model.margin(&features(0.5, 90.0)), 1.5));
    }

    #[test]
    fn test_nan_follows_default_direction() {
        let model = GradientBoostedModel::from_json(&fixture_json()).unwrap();
        // Tree 0 defaults left (-1.0), tree 1 defaults right (-0.5)
        assert!(approx(model.margin(&features(f64::NAN, f64::NAN)), -1.5));
    }

    #[test]
    fn test_probability_is_sigmoid_of_margin() {
        let model = GradientBoostedModel::from_json(&fixture_json()).unwrap();
        let p = model.positive_probability(&features(1.0, 50.0));
        assert!(approx(p, 1.0 / (1.0 + (-2.5f64).exp())));
        assert!(p > 0.0 && p < 1.0);
    }

    #[test]
    fn test_bracketed_base_score() {
        let json = fixture_json().replace("\"5E-1\"", "\"[7.5E-1]\"");
        let model = GradientBoostedModel::from_json(&json).unwrap();
        let expected = -0.5 + 3.0f64.ln();
        assert!(approx(model.margin(&features(-1.0, -1.0)), expected));
    }

    #[test]
    fn test_parse_base_score() {
        assert_eq!(parse_base_score("5E-1").unwrap(), 0.5);
        assert_eq!(parse_base_score("[2.5E-1]").unwrap(), 0.25);
        assert!(parse_base_score("abc").is_err());
        assert!(parse_base_score("").is_err());
    }

    #[test]
    fn test_logitraw_uses_raw_base_score() {
        let json = fixture_json()
            .replace("binary:logistic", "binary:logitraw")
            .replace("\"5E-1\"", "\"0\"");
        let model = GradientBoostedModel::from_json(&json).unwrap();
        assert_eq!(model.objective(), Objective::LogitRaw);
        assert!(approx(model.margin(&features(-1.0, -1.0)), -0.5));
    }

    #[test]
    fn test_unsupported_objective() {
        let json = fixture_json().replace("binary:logistic", "multi:softprob");
        assert!(matches!(
            GradientBoostedModel::from_json(&json),
            Err(ModelError::UnsupportedObjective(_))
        ));
    }

    #[test]
    fn test_unsupported_booster() {
        let json = fixture_json().replace("\"gbtree\"", "\"gblinear\"");
        assert!(matches!(
            GradientBoostedModel::from_json(&json),
            Err(ModelError::UnsupportedBooster(_))
        ));
    }

    #[test]
    fn test_out_of_range_split_rejected() {
        let json = fixture_json().replace("\"split_indices\":[12,0,0]", "\"split_indices\":[40,0,0]");
        assert!(matches!(
            GradientBoostedModel::from_json(&json),
            Err(ModelError::MalformedTree { tree: 1, .. })
        ));
    }

    #[test]
    fn test_overflowing_leaf_rejected() {
        // 1e39 does not fit in an f32 and would turn margins into inf or NaN
        let json = fixture_json().replace(
            "\"split_conditions\":[0.5,-1.0,2.0]",
            "\"split_conditions\":[0.5,-1.0,1e39]",
        );
        assert_ne!(json, fixture_json());
        match GradientBoostedModel::from_json(&json) {
            Err(ModelError::MalformedTree { tree, reason }) => {
                assert_eq!(tree, 0);
                assert!(reason.contains("non-finite leaf value"));
            }
            other => panic!("expected MalformedTree, got {:?}", other),
        }
    }

    #[test]
    fn test_backward_child_rejected() {
        let json = fixture_json().replace("\"left_children\":[1,-1,-1]", "\"left_children\":[0,-1,-1]");
        assert!(matches!(
            GradientBoostedModel::from_json(&json),
            Err(ModelError::MalformedTree { .. })
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            GradientBoostedModel::from_json("not a model"),
            Err(ModelError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boosting.txt");
        std::fs::write(&path, fixture_json()).unwrap();
        let model = GradientBoostedModel::load(&path).unwrap();
        assert_eq!(model.tree_count(), 2);
    }
}
