use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Threshold must be within 0..=1, got {0}")]
    Threshold(f32),
    #[error("review_candidates must be at least 1")]
    NoCandidates,
}

/// Settings for a labeling run. Every field has a default so a partial
/// `shelfscan.toml` is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelerConfig {
    pub dataset_dir: PathBuf,
    pub corrections_path: PathBuf,
    /// Auto-label when the best match scores at or above this.
    pub threshold: f32,
    /// How many ranked candidates the reviewer is shown.
    pub review_candidates: usize,
    pub image_extensions: Vec<String>,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("dataset/prototype"),
            corrections_path: PathBuf::from("corrections.json"),
            threshold: 0.70,
            review_candidates: 5,
            image_extensions: ["jpg", "jpeg", "png", "webp"].map(String::from).to_vec(),
        }
    }
}

impl LabelerConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: LabelerConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::Threshold(self.threshold));
        }
        if self.review_candidates == 0 {
            return Err(ConfigError::NoCandidates);
        }
        Ok(())
    }

    /// Case-insensitive check against `image_extensions`.
    pub fn is_image_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.image_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}
