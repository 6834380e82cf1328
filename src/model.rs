use crate::features::{FeatureVector, TRAINING_COLUMNS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed model artifact: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    Checksum { expected: String, actual: String },

    #[error("Invalid model: {0}")]
    Invalid(String),

    #[error("Prediction failed: {0}")]
    Predict(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prediction {
    Phishing,
    Legitimate,
}

impl Prediction {
    pub fn from_code(code: i64) -> Result<Self, ModelError> {
        match code {
            -1 => Ok(Prediction::Phishing),
            1 => Ok(Prediction::Legitimate),
            other => Err(ModelError::Predict(format!("unexpected class code {}", other))),
        }
    }

    pub fn code(&self) -> i8 {
        match self {
            Prediction::Phishing => -1,
            Prediction::Legitimate => 1,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Prediction::Phishing => "phishing",
            Prediction::Legitimate => "an_toan",
        }
    }
}

pub trait Classifier: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, ModelError>;
}

/// One decision tree in the parallel-array layout scikit-learn exports.
/// A node is a leaf when its left child is negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNodes {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Per-node class weights (counts or fractions), one entry per class.
    pub value: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestArtifact {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    pub classes: Vec<i64>,
    pub trees: Vec<TreeNodes>,
}

/// Random-forest classifier: trees vote with their leaf class distributions,
/// the averaged distribution's argmax wins.
#[derive(Debug, Clone)]
pub struct ForestModel {
    artifact: ForestArtifact,
}

impl ForestModel {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let model = Self::from_slice(&data)?;
        debug!(
            "Loaded forest model from {}: version {:?}, {} trees",
            path.display(),
            model.artifact.version,
            model.artifact.trees.len()
        );
        Ok(model)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, ModelError> {
        let artifact: ForestArtifact = serde_json::from_slice(data)?;
        Self::from_artifact(artifact)
    }

    pub fn from_artifact(artifact: ForestArtifact) -> Result<Self, ModelError> {
        validate(&artifact)?;
        Ok(Self { artifact })
    }

    pub fn version(&self) -> Option<&str> {
        self.artifact.version.as_deref()
    }

    pub fn tree_count(&self) -> usize {
        self.artifact.trees.len()
    }

    fn leaf_for<'a>(tree: &'a TreeNodes, x: &[f64]) -> Result<&'a [f64], ModelError> {
        let mut node = 0usize;
        // A well-formed tree reaches a leaf in fewer steps than it has nodes.
        for _ in 0..=tree.children_left.len() {
            let left = tree.children_left[node];
            if left < 0 {
                return Ok(&tree.value[node]);
            }
            let feature = tree.feature[node] as usize;
            node = if x[feature] <= tree.threshold[node] {
                left as usize
            } else {
                tree.children_right[node] as usize
            };
        }
        Err(ModelError::Predict("tree traversal did not terminate".to_string()))
    }
}

impl Classifier for ForestModel {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, ModelError> {
        let x: Vec<f64> = features.values().iter().map(|v| f64::from(*v)).collect();
        let classes = &self.artifact.classes;
        let mut proba = vec![0.0; classes.len()];

        for tree in &self.artifact.trees {
            let leaf = Self::leaf_for(tree, &x)?;
            let total: f64 = leaf.iter().sum();
            if total <= 0.0 {
                continue;
            }
            for (p, weight) in proba.iter_mut().zip(leaf) {
                *p += weight / total;
            }
        }

        // First maximum wins ties, matching numpy's argmax.
        let mut best = 0;
        for (i, p) in proba.iter().enumerate() {
            if *p > proba[best] {
                best = i;
            }
        }

        Prediction::from_code(classes[best])
    }
}

fn validate(artifact: &ForestArtifact) -> Result<(), ModelError> {
    if let Some(names) = &artifact.feature_names {
        if names.iter().map(String::as_str).ne(TRAINING_COLUMNS.iter().copied()) {
            return Err(ModelError::Invalid(
                "feature_names do not match the training columns".to_string(),
            ));
        }
    }

    if artifact.classes.is_empty() {
        return Err(ModelError::Invalid("no classes".to_string()));
    }
    if let Some(bad) = artifact.classes.iter().find(|c| **c != -1 && **c != 1) {
        return Err(ModelError::Invalid(format!("unsupported class code {}", bad)));
    }
    if artifact.trees.is_empty() {
        return Err(ModelError::Invalid("no trees".to_string()));
    }

    for (i, tree) in artifact.trees.iter().enumerate() {
        validate_tree(tree, artifact.classes.len()).map_err(|e| ModelError::Invalid(format!("tree {}: {}", i, e)))?;
    }

    Ok(())
}

fn validate_tree(tree: &TreeNodes, n_classes: usize) -> Result<(), String> {
    let n = tree.children_left.len();
    if n == 0 {
        return Err("empty tree".to_string());
    }
    if tree.children_right.len() != n || tree.feature.len() != n || tree.threshold.len() != n || tree.value.len() != n {
        return Err("node arrays differ in length".to_string());
    }

    for node in 0..n {
        let (left, right) = (tree.children_left[node], tree.children_right[node]);
        if left < 0 {
            if tree.value[node].len() != n_classes {
                return Err(format!("leaf {} has {} class weights", node, tree.value[node].len()));
            }
            continue;
        }
        if left as usize >= n || right < 0 || right as usize >= n {
            return Err(format!("node {} has out-of-range children", node));
        }
        let feature = tree.feature[node];
        if feature < 0 || feature as usize >= TRAINING_COLUMNS.len() {
            return Err(format!("node {} splits on unknown feature {}", node, feature));
        }
    }

    Ok(())
}
