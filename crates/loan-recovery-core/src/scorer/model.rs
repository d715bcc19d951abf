//! Serialized classifier artifacts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Classifier;

/// Trained classifier as stored on disk, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierModel {
    RandomForest(RandomForest),
    Logistic(LogisticModel),
}

impl ClassifierModel {
    /// Check structural invariants so prediction never indexes out of range.
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        match self {
            Self::RandomForest(forest) => forest.validate(),
            Self::Logistic(model) => model.validate(),
        }
    }
}

impl Classifier for ClassifierModel {
    fn n_features(&self) -> usize {
        match self {
            Self::RandomForest(forest) => forest.n_features,
            Self::Logistic(model) => model.coefficients.len(),
        }
    }

    fn predict_proba(&self, features: &[f64]) -> f64 {
        match self {
            Self::RandomForest(forest) => forest.predict_proba(features),
            Self::Logistic(model) => model.predict_proba(features),
        }
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        Some(match self {
            Self::RandomForest(forest) => forest.feature_importances(),
            Self::Logistic(model) => model.feature_importances(),
        })
    }
}

/// Ensemble of decision trees whose leaf probabilities are averaged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
    #[serde(default)]
    pub feature_importances: Option<Vec<f64>>,
}

impl RandomForest {
    fn validate(&self) -> Result<(), ModelValidationError> {
        if self.n_features == 0 {
            return Err(ModelValidationError::NoFeatures);
        }
        if self.trees.is_empty() {
            return Err(ModelValidationError::NoTrees);
        }
        for (tree_idx, tree) in self.trees.iter().enumerate() {
            tree.validate(tree_idx, self.n_features)?;
        }
        validate_importances(self.feature_importances.as_deref(), self.n_features)
    }

    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        let total: f64 = self
            .trees
            .iter()
            .map(|tree| tree.leaf_probability(features))
            .sum();
        total / self.trees.len() as f64
    }

    /// Stored importances, or normalized split counts per feature.
    pub fn feature_importances(&self) -> Vec<f64> {
        if let Some(stored) = &self.feature_importances {
            return stored.clone();
        }
        let mut counts = vec![0.0; self.n_features];
        for tree in &self.trees {
            for node in &tree.nodes {
                if let TreeNode::Split { feature, .. } = node {
                    counts[*feature] += 1.0;
                }
            }
        }
        normalize(counts)
    }
}

/// Binary tree stored as a flat node list; node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    /// Samples with `features[feature] <= threshold` descend to `left`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Positive-class probability at this leaf.
    Leaf { probability: f64 },
}

impl DecisionTree {
    fn validate(&self, tree_idx: usize, n_features: usize) -> Result<(), ModelValidationError> {
        if self.nodes.is_empty() {
            return Err(ModelValidationError::EmptyTree { tree: tree_idx });
        }
        for (node_idx, node) in self.nodes.iter().enumerate() {
            match *node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if feature >= n_features {
                        return Err(ModelValidationError::FeatureOutOfRange {
                            tree: tree_idx,
                            node: node_idx,
                            feature,
                            n_features,
                        });
                    }
                    if !threshold.is_finite() {
                        return Err(ModelValidationError::NonFiniteThreshold {
                            tree: tree_idx,
                            node: node_idx,
                        });
                    }
                    // Children must point forward, which rules out cycles.
                    for child in [left, right] {
                        if child <= node_idx || child >= self.nodes.len() {
                            return Err(ModelValidationError::InvalidChild {
                                tree: tree_idx,
                                node: node_idx,
                                child,
                            });
                        }
                    }
                }
                TreeNode::Leaf { probability } => {
                    if !(0.0..=1.0).contains(&probability) {
                        return Err(ModelValidationError::ProbabilityOutOfRange {
                            tree: tree_idx,
                            node: node_idx,
                            probability,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn leaf_probability(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                TreeNode::Leaf { probability } => return probability,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[feature] <= threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

/// Logistic regression: `sigmoid(intercept + coefficients · features)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    #[serde(default)]
    pub feature_importances: Option<Vec<f64>>,
}

impl LogisticModel {
    fn validate(&self) -> Result<(), ModelValidationError> {
        if self.coefficients.is_empty() {
            return Err(ModelValidationError::NoFeatures);
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ModelValidationError::NonFiniteCoefficient);
        }
        validate_importances(self.feature_importances.as_deref(), self.coefficients.len())
    }

    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        let z = self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(coef, value)| coef * value)
                .sum::<f64>();
        sigmoid(z)
    }

    /// Stored importances, or normalized absolute coefficients.
    pub fn feature_importances(&self) -> Vec<f64> {
        match &self.feature_importances {
            Some(stored) => stored.clone(),
            None => normalize(self.coefficients.iter().map(|c| c.abs()).collect()),
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn normalize(mut weights: Vec<f64>) -> Vec<f64> {
    let sum: f64 = weights.iter().sum();
    if sum > 0.0 {
        for weight in &mut weights {
            *weight /= sum;
        }
    }
    weights
}

fn validate_importances(
    importances: Option<&[f64]>,
    n_features: usize,
) -> Result<(), ModelValidationError> {
    let Some(importances) = importances else {
        return Ok(());
    };
    if importances.len() != n_features {
        return Err(ModelValidationError::ImportanceLength {
            expected: n_features,
            found: importances.len(),
        });
    }
    if importances.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(ModelValidationError::InvalidImportance);
    }
    Ok(())
}

/// Structural problems found in a model artifact.
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelValidationError {
    #[error("model must accept at least one feature")]
    NoFeatures,
    #[error("random forest must contain at least one tree")]
    NoTrees,
    #[error("tree {tree} has no nodes")]
    EmptyTree { tree: usize },
    #[error("tree {tree} node {node} splits on feature {feature}, but the model has {n_features}")]
    FeatureOutOfRange {
        tree: usize,
        node: usize,
        feature: usize,
        n_features: usize,
    },
    #[error("tree {tree} node {node} has a non-finite threshold")]
    NonFiniteThreshold { tree: usize, node: usize },
    #[error("tree {tree} node {node} points at invalid child {child}")]
    InvalidChild {
        tree: usize,
        node: usize,
        child: usize,
    },
    #[error("tree {tree} node {node} leaf probability {probability} is outside 0.0..=1.0")]
    ProbabilityOutOfRange {
        tree: usize,
        node: usize,
        probability: f64,
    },
    #[error("logistic model coefficients must be finite")]
    NonFiniteCoefficient,
    #[error("expected {expected} feature importance(s), found {found}")]
    ImportanceLength { expected: usize, found: usize },
    #[error("feature importances must be finite and non-negative")]
    InvalidImportance,
}
