use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{model::ClassifierModel, ArtifactLoadError, ArtifactRepository, FeatureSchema};

/// Loads the model artifact and feature schema from JSON files on disk.
pub struct FileArtifactRepository {
    model_path: PathBuf,
    schema_path: PathBuf,
    model: OnceCell<Arc<ClassifierModel>>,
    schema: OnceCell<FeatureSchema>,
}

impl FileArtifactRepository {
    pub fn new(model_path: impl Into<PathBuf>, schema_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            schema_path: schema_path.into(),
            model: OnceCell::new(),
            schema: OnceCell::new(),
        }
    }

    /// Repository over `model.json` and `features.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join("model.json"), dir.join("features.json"))
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn schema_path(&self) -> &Path {
        &self.schema_path
    }

    fn read_model(&self) -> Result<ClassifierModel, ArtifactLoadError> {
        let model: ClassifierModel = read_json(&self.model_path)?;
        model
            .validate()
            .map_err(|source| ArtifactLoadError::InvalidModel {
                path: self.model_path.clone(),
                source,
            })?;
        debug!(path = %self.model_path.display(), "loaded model artifact");
        Ok(model)
    }

    fn read_schema(&self) -> Result<FeatureSchema, ArtifactLoadError> {
        let names: Vec<String> = read_json(&self.schema_path)?;
        let schema =
            FeatureSchema::new(names).map_err(|source| ArtifactLoadError::InvalidSchema {
                path: self.schema_path.clone(),
                source,
            })?;
        debug!(
            path = %self.schema_path.display(),
            features = schema.len(),
            "loaded feature schema"
        );
        Ok(schema)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| ArtifactLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ArtifactLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait::async_trait]
impl ArtifactRepository for FileArtifactRepository {
    async fn load_model(&self) -> Result<Arc<ClassifierModel>, ArtifactLoadError> {
        let model = self
            .model
            .get_or_try_init(|| self.read_model().map(Arc::new))?;
        Ok(Arc::clone(model))
    }

    async fn load_schema(&self) -> Result<FeatureSchema, ArtifactLoadError> {
        let schema = self.schema.get_or_try_init(|| self.read_schema())?;
        Ok(schema.clone())
    }
}
