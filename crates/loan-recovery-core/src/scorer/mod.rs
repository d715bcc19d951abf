use std::{collections::BTreeMap, fmt, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod file_repository;
pub mod model;
pub mod model_scorer;

use model::{ClassifierModel, ModelValidationError};

/// Ordered, named numeric inputs a classifier requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Build a schema, rejecting empty lists, blank names and duplicates.
    pub fn new<I, S>(names: I) -> Result<Self, SchemaValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(SchemaValidationError::Empty);
        }
        for (index, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(SchemaValidationError::BlankName { index });
            }
            if names[..index].contains(name) {
                return Err(SchemaValidationError::DuplicateName { name: name.clone() });
            }
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|candidate| candidate == name)
    }

    /// Schema names for which `present` returns false, in schema order.
    pub fn missing_by<F>(&self, present: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        self.names
            .iter()
            .filter(|name| !present(name.as_str()))
            .cloned()
            .collect()
    }

    /// Pull the schema's values out of `vector` in schema order.
    ///
    /// Every missing name is reported together; otherwise the first value that
    /// does not coerce to a finite number fails the record.
    pub fn extract(&self, vector: &FeatureVector, row: usize) -> Result<Vec<f64>, ScoreError> {
        let missing = self.missing_by(|name| vector.get(name).is_some());
        if !missing.is_empty() {
            return Err(ScoreError::SchemaMismatch {
                row: Some(row),
                missing,
            });
        }
        let mut values = Vec::with_capacity(self.names.len());
        for name in &self.names {
            let field = vector.get(name).ok_or_else(|| ScoreError::SchemaMismatch {
                row: Some(row),
                missing: vec![name.clone()],
            })?;
            let value = field.as_f64().ok_or_else(|| ScoreError::InvalidValue {
                row,
                feature: name.clone(),
                value: field.to_string(),
            })?;
            values.push(value);
        }
        Ok(values)
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = SchemaValidationError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(names)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.names
    }
}

/// Errors emitted while validating a feature schema.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaValidationError {
    #[error("feature schema must list at least one feature")]
    Empty,
    #[error("feature name at position {index} must not be blank")]
    BlankName { index: usize },
    #[error("feature `{name}` is listed more than once")]
    DuplicateName { name: String },
}

/// Raw field as supplied by a caller: already numeric, or text to be coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Finite numeric interpretation of the field, if any.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Self::Number(value) => *value,
            Self::Text(text) => text.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// One borrower record keyed by field name. Fields outside the schema are kept
/// but ignored for scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    fields: BTreeMap<String, FieldValue>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl<K, V> FromIterator<(K, V)> for FeatureVector
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

/// Probability of the positive (high-risk) class, always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Score(f64);

impl Score {
    /// Accept a probability, returning `None` for NaN or values outside `[0, 1]`.
    pub fn new(value: f64) -> Option<Self> {
        (0.0..=1.0).contains(&value).then_some(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Per-feature weight exposed by the underlying model, for display only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Errors raised while turning records into scores. `row` indexes the record
/// within the batch being scored.
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreError {
    #[error("{}missing required feature(s): {}", row_prefix(.row), .missing.join(", "))]
    SchemaMismatch {
        row: Option<usize>,
        missing: Vec<String>,
    },
    #[error("row {row}: feature `{feature}` has invalid value `{value}`")]
    InvalidValue {
        row: usize,
        feature: String,
        value: String,
    },
    #[error("row {row}: classifier produced {value}, which is not a probability")]
    InvalidProbability { row: usize, value: f64 },
}

fn row_prefix(row: &Option<usize>) -> String {
    row.map(|row| format!("row {row}: ")).unwrap_or_default()
}

/// Failures while loading the model or schema artifacts. Fatal at startup.
#[derive(Debug, Error)]
pub enum ArtifactLoadError {
    #[error("failed to read artifact at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact at {} is not valid JSON for its format", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("model artifact at {} is invalid", .path.display())]
    InvalidModel {
        path: PathBuf,
        #[source]
        source: ModelValidationError,
    },
    #[error("feature schema at {} is invalid", .path.display())]
    InvalidSchema {
        path: PathBuf,
        #[source]
        source: SchemaValidationError,
    },
    #[error("model expects {model} feature(s) but the schema lists {schema}")]
    FeatureCountMismatch { model: usize, schema: usize },
}

/// Probability-producing binary classifier over a fixed-width feature slice.
///
/// Implementations must be pure with respect to `&self` so a single loaded
/// instance can be shared across callers.
pub trait Classifier: Send + Sync {
    /// Width of the feature slice accepted by [`Classifier::predict_proba`].
    fn n_features(&self) -> usize;

    /// Probability of the positive class; `features.len() == self.n_features()`.
    fn predict_proba(&self, features: &[f64]) -> f64;

    /// Optional per-feature weights, aligned with the feature slice.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }
}

/// Scores borrower records against a fixed feature schema.
pub trait Scorer: Send + Sync {
    fn schema(&self) -> &FeatureSchema;

    /// One score per record, order-preserving. Fails on the first bad record.
    fn score(&self, vectors: &[FeatureVector]) -> Result<Vec<Score>, ScoreError>;

    /// Feature weights ranked from most to least important, when the model has them.
    fn feature_importances(&self) -> Option<Vec<FeatureImportance>> {
        None
    }
}

/// Source of the trained model and its feature schema.
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    async fn load_model(&self) -> Result<Arc<ClassifierModel>, ArtifactLoadError>;

    async fn load_schema(&self) -> Result<FeatureSchema, ArtifactLoadError>;
}
