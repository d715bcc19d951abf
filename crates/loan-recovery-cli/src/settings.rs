use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Artifact locations resolved from defaults, an optional config file and the environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppSettings {
    pub model_path: PathBuf,
    pub features_path: PathBuf,
}

impl AppSettings {
    const ENV_PREFIX: &'static str = "LOAN_RECOVERY";
    const DEFAULT_MODEL_PATH: &'static str = "artifacts/model.json";
    const DEFAULT_FEATURES_PATH: &'static str = "artifacts/features.json";

    /// Layer sources, later ones winning:
    ///
    /// * built-in defaults (`artifacts/model.json`, `artifacts/features.json`)
    /// * `config_file`, when given (format picked from its extension)
    /// * `LOAN_RECOVERY_MODEL_PATH` / `LOAN_RECOVERY_FEATURES_PATH`
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("model_path", Self::DEFAULT_MODEL_PATH)?
            .set_default("features_path", Self::DEFAULT_FEATURES_PATH)?;
        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(Environment::with_prefix(Self::ENV_PREFIX))
            .build()
            .context("failed to assemble configuration")?
            .try_deserialize()
            .context("configuration is missing artifact paths")
    }

    /// Apply command-line flags on top of the loaded settings.
    pub fn with_overrides(mut self, model: Option<PathBuf>, features: Option<PathBuf>) -> Self {
        if let Some(model) = model {
            self.model_path = model;
        }
        if let Some(features) = features {
            self.features_path = features;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const MODEL_ENV: &str = "LOAN_RECOVERY_MODEL_PATH";
    const FEATURES_ENV: &str = "LOAN_RECOVERY_FEATURES_PATH";

    fn with_env_lock<F: FnOnce()>(func: F) {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var(MODEL_ENV);
        env::remove_var(FEATURES_ENV);
        func();
        env::remove_var(MODEL_ENV);
        env::remove_var(FEATURES_ENV);
    }

    #[test]
    fn defaults_point_at_artifacts_dir() {
        with_env_lock(|| {
            let settings = AppSettings::load(None).expect("defaults should load");
            assert_eq!(settings.model_path, PathBuf::from("artifacts/model.json"));
            assert_eq!(
                settings.features_path,
                PathBuf::from("artifacts/features.json")
            );
        });
    }

    #[test]
    fn environment_overrides_defaults() {
        with_env_lock(|| {
            env::set_var(MODEL_ENV, "/srv/models/rf.json");
            let settings = AppSettings::load(None).expect("env should load");
            assert_eq!(settings.model_path, PathBuf::from("/srv/models/rf.json"));
            assert_eq!(
                settings.features_path,
                PathBuf::from("artifacts/features.json")
            );
        });
    }

    #[test]
    fn config_file_then_environment() {
        with_env_lock(|| {
            let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
            std::fs::write(
                file.path(),
                "model_path = \"/opt/model.json\"\nfeatures_path = \"/opt/features.json\"\n",
            )
            .unwrap();
            env::set_var(FEATURES_ENV, "/env/features.json");

            let settings = AppSettings::load(Some(file.path())).expect("file should load");
            assert_eq!(settings.model_path, PathBuf::from("/opt/model.json"));
            assert_eq!(settings.features_path, PathBuf::from("/env/features.json"));
        });
    }

    #[test]
    fn missing_config_file_is_an_error() {
        with_env_lock(|| {
            let err = AppSettings::load(Some(Path::new("/nonexistent/loan-recovery.toml")))
                .expect_err("required file should fail");
            assert!(err.to_string().contains("configuration"));
        });
    }

    #[test]
    fn flags_win_over_settings() {
        let settings = AppSettings {
            model_path: "a.json".into(),
            features_path: "b.json".into(),
        }
        .with_overrides(Some("cli.json".into()), None);
        assert_eq!(settings.model_path, PathBuf::from("cli.json"));
        assert_eq!(settings.features_path, PathBuf::from("b.json"));
    }
}
