pub mod dataset;
pub mod policy;
pub mod report;
pub mod scorer;

pub use dataset::{Dataset, DatasetError};
pub use policy::{
    classify, enrich::enrich, enrich::BatchSummary, enrich::EnrichedDataset, recommend,
    Assessment, RiskLabel, RiskTier, Strategy,
};
pub use scorer::{
    file_repository::FileArtifactRepository, model::ClassifierModel, model_scorer::ModelScorer,
    ArtifactLoadError, ArtifactRepository, Classifier, FeatureImportance, FeatureSchema,
    FeatureVector, FieldValue, Score, ScoreError, Scorer,
};
