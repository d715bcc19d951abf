use std::{cmp::Ordering, sync::Arc};

use tracing::{debug, instrument};

use super::{
    model::ClassifierModel, ArtifactLoadError, ArtifactRepository, Classifier, FeatureImportance,
    FeatureSchema, FeatureVector, Score, ScoreError, Scorer,
};

/// Scorer backed by an injected, read-only classifier and its feature schema.
///
/// The classifier is shared through `Arc` and only ever borrowed immutably, so
/// one instance serves any number of concurrent callers.
pub struct ModelScorer<C: Classifier = ClassifierModel> {
    classifier: Arc<C>,
    schema: FeatureSchema,
}

impl<C: Classifier> std::fmt::Debug for ModelScorer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelScorer")
            .field("schema", &self.schema)
            .field("n_features", &self.classifier.n_features())
            .finish()
    }
}

impl<C: Classifier> ModelScorer<C> {
    pub fn new(classifier: Arc<C>, schema: FeatureSchema) -> Result<Self, ArtifactLoadError> {
        if classifier.n_features() != schema.len() {
            return Err(ArtifactLoadError::FeatureCountMismatch {
                model: classifier.n_features(),
                schema: schema.len(),
            });
        }
        Ok(Self { classifier, schema })
    }

    pub fn classifier(&self) -> &Arc<C> {
        &self.classifier
    }

    /// A NaN probability from finite inputs means intermediate terms overflowed.
    /// Blame the largest-magnitude feature of the record.
    fn overflowing_value(&self, row: usize, features: &[f64]) -> ScoreError {
        let idx = features
            .iter()
            .enumerate()
            .fold(0, |best, (idx, value)| {
                if value.abs() > features[best].abs() {
                    idx
                } else {
                    best
                }
            });
        ScoreError::InvalidValue {
            row,
            feature: self.schema.names()[idx].clone(),
            value: features[idx].to_string(),
        }
    }
}

impl ModelScorer<ClassifierModel> {
    /// Load both artifacts once and wire them into a scorer.
    pub async fn from_repository<R>(repo: &R) -> Result<Self, ArtifactLoadError>
    where
        R: ArtifactRepository + ?Sized,
    {
        let classifier = repo.load_model().await?;
        let schema = repo.load_schema().await?;
        Self::new(classifier, schema)
    }
}

impl<C: Classifier> Scorer for ModelScorer<C> {
    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    #[instrument(name = "score_records", skip_all, fields(records = vectors.len()))]
    fn score(&self, vectors: &[FeatureVector]) -> Result<Vec<Score>, ScoreError> {
        let mut scores = Vec::with_capacity(vectors.len());
        for (row, vector) in vectors.iter().enumerate() {
            let features = self.schema.extract(vector, row)?;
            let probability = self.classifier.predict_proba(&features);
            if probability.is_nan() {
                return Err(self.overflowing_value(row, &features));
            }
            let score = Score::new(probability).ok_or(ScoreError::InvalidProbability {
                row,
                value: probability,
            })?;
            scores.push(score);
        }
        debug!(scored = scores.len(), "scoring completed");
        Ok(scores)
    }

    fn feature_importances(&self) -> Option<Vec<FeatureImportance>> {
        let weights = self.classifier.feature_importances()?;
        let mut ranking: Vec<_> = self
            .schema
            .names()
            .iter()
            .zip(weights)
            .map(|(feature, importance)| FeatureImportance {
                feature: feature.clone(),
                importance,
            })
            .collect();
        ranking.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.feature.cmp(&b.feature))
        });
        Some(ranking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::model::{LogisticModel, RandomForest};
    use async_trait::async_trait;

    /// Probability is the first feature, clamped into range.
    struct Passthrough {
        width: usize,
    }

    impl Classifier for Passthrough {
        fn n_features(&self) -> usize {
            self.width
        }

        fn predict_proba(&self, features: &[f64]) -> f64 {
            features[0]
        }
    }

    fn scorer() -> ModelScorer<Passthrough> {
        ModelScorer::new(
            Arc::new(Passthrough { width: 2 }),
            FeatureSchema::new(["income", "age"]).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn scores_preserve_input_order() {
        let vectors: Vec<_> = [0.9, 0.1, 0.5]
            .into_iter()
            .map(|p| FeatureVector::new().with("income", p).with("age", 30.0))
            .collect();
        let scores: Vec<f64> = scorer()
            .score(&vectors)
            .unwrap()
            .into_iter()
            .map(Score::value)
            .collect();
        assert_eq!(scores, vec![0.9, 0.1, 0.5]);
    }

    #[test]
    fn reports_the_failing_row() {
        let vectors = vec![
            FeatureVector::new().with("income", 0.2).with("age", 30.0),
            FeatureVector::new().with("income", 0.3),
        ];
        let err = scorer().score(&vectors).unwrap_err();
        assert_eq!(
            err,
            ScoreError::SchemaMismatch {
                row: Some(1),
                missing: vec!["age".into()],
            }
        );
    }

    #[test]
    fn out_of_range_probability_is_an_error() {
        let vectors = vec![FeatureVector::new().with("income", 1.5).with("age", 1.0)];
        let err = scorer().score(&vectors).unwrap_err();
        assert!(matches!(err, ScoreError::InvalidProbability { row: 0, .. }));
    }

    #[test]
    fn overflowing_logistic_terms_name_the_largest_value() {
        let model = ClassifierModel::Logistic(LogisticModel {
            intercept: 0.0,
            coefficients: vec![1e300, -1e300],
            feature_importances: None,
        });
        let scorer = ModelScorer::new(
            Arc::new(model),
            FeatureSchema::new(["income", "debt"]).unwrap(),
        )
        .unwrap();
        let vectors = vec![
            FeatureVector::new().with("income", 1.0).with("debt", 1.0),
            FeatureVector::new().with("income", 1e10).with("debt", 2e10),
        ];
        let err = scorer.score(&vectors).unwrap_err();
        assert_eq!(
            err,
            ScoreError::InvalidValue {
                row: 1,
                feature: "debt".into(),
                value: "20000000000".into(),
            }
        );
    }

    #[test]
    fn rejects_schema_of_wrong_width() {
        let err = ModelScorer::new(
            Arc::new(Passthrough { width: 3 }),
            FeatureSchema::new(["income"]).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ArtifactLoadError::FeatureCountMismatch {
                model: 3,
                schema: 1
            }
        ));
    }

    #[test]
    fn importances_are_ranked_descending() {
        let model = ClassifierModel::Logistic(LogisticModel {
            intercept: 0.0,
            coefficients: vec![0.1, 0.3, 0.1],
            feature_importances: Some(vec![0.2, 0.5, 0.3]),
        });
        let scorer = ModelScorer::new(
            Arc::new(model),
            FeatureSchema::new(["age", "income", "tenure"]).unwrap(),
        )
        .unwrap();
        let ranking: Vec<_> = scorer
            .feature_importances()
            .unwrap()
            .into_iter()
            .map(|item| item.feature)
            .collect();
        assert_eq!(ranking, vec!["income", "tenure", "age"]);
    }

    struct StaticRepo {
        model: Arc<ClassifierModel>,
        schema: FeatureSchema,
    }

    #[async_trait]
    impl ArtifactRepository for StaticRepo {
        async fn load_model(&self) -> Result<Arc<ClassifierModel>, ArtifactLoadError> {
            Ok(Arc::clone(&self.model))
        }

        async fn load_schema(&self) -> Result<FeatureSchema, ArtifactLoadError> {
            Ok(self.schema.clone())
        }
    }

    #[tokio::test]
    async fn builds_from_repository() {
        let repo = StaticRepo {
            model: Arc::new(ClassifierModel::RandomForest(RandomForest {
                n_features: 1,
                trees: vec![crate::scorer::model::DecisionTree {
                    nodes: vec![crate::scorer::model::TreeNode::Leaf { probability: 0.8 }],
                }],
                feature_importances: None,
            })),
            schema: FeatureSchema::new(["income"]).unwrap(),
        };
        let scorer = ModelScorer::from_repository(&repo).await.unwrap();
        let scores = scorer
            .score(&[FeatureVector::new().with("income", 1000.0)])
            .unwrap();
        assert_eq!(scores[0].value(), 0.8);
    }

    #[tokio::test]
    async fn repository_width_mismatch_aborts() {
        let repo = StaticRepo {
            model: Arc::new(ClassifierModel::Logistic(LogisticModel {
                intercept: 0.0,
                coefficients: vec![1.0, 1.0],
                feature_importances: None,
            })),
            schema: FeatureSchema::new(["income"]).unwrap(),
        };
        let err = ModelScorer::from_repository(&repo).await.unwrap_err();
        assert!(matches!(err, ArtifactLoadError::FeatureCountMismatch { .. }));
    }
}
