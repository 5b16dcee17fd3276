use serde_json::{Map, Value};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("Correction pairs need a non-empty bad and good substring")]
    EmptyPair,
    #[error("Expected 'bad->good', got '{0}'")]
    Malformed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize corrections: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A learned literal replacement for a recurring OCR misread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionPair {
    pub bad: String,
    pub good: String,
}

impl CorrectionPair {
    pub fn new(bad: &str, good: &str) -> Result<Self, CorrectionError> {
        let (bad, good) = (bad.trim(), good.trim());
        if bad.is_empty() || good.is_empty() {
            return Err(CorrectionError::EmptyPair);
        }
        Ok(Self { bad: bad.to_string(), good: good.to_string() })
    }
}

impl FromStr for CorrectionPair {
    type Err = CorrectionError;

    /// Parses `bad->good`, splitting on the first arrow.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bad, good) = s.split_once("->").ok_or_else(|| CorrectionError::Malformed(s.to_string()))?;
        Self::new(bad, good)
    }
}

/// Persisted bad → good substring map, applied to every raw OCR string.
///
/// Pairs are applied in file/insertion order. When one key contains another
/// the earlier pair wins; no longest-first precedence is attempted.
#[derive(Debug, Clone)]
pub struct CorrectionStore {
    path: PathBuf,
    map: Map<String, Value>,
}

impl CorrectionStore {
    /// An empty store that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), map: Map::new() }
    }

    /// Load the map at `path`. A missing or unparseable file yields an empty
    /// store; this never fails.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), "no corrections loaded: {e}");
                return Self::empty(path);
            }
        };
        match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(map) => {
                info!(path = %path.display(), pairs = map.len(), "corrections loaded");
                Self { path, map }
            }
            Err(e) => {
                warn!(path = %path.display(), "ignoring unparseable corrections file: {e}");
                Self::empty(path)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, bad: &str) -> Option<&str> {
        self.map.get(bad).and_then(Value::as_str)
    }

    /// Replace every `bad` substring with its `good` counterpart, pair by
    /// pair. Pairs that cannot be applied (an empty key, a non-string value)
    /// are skipped without affecting the others.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (bad, good) in &self.map {
            let Some(good) = good.as_str() else {
                debug!(bad = %bad, "skipping correction with non-string replacement");
                continue;
            };
            if bad.is_empty() {
                debug!("skipping correction with empty key");
                continue;
            }
            if out.contains(bad.as_str()) {
                out = out.replace(bad.as_str(), good);
            }
        }
        out
    }

    /// Insert or overwrite a pair and write the whole map back to disk.
    ///
    /// The in-memory map keeps the pair even when persisting fails.
    pub fn record(&mut self, pair: CorrectionPair) -> Result<(), CorrectionError> {
        if pair.bad.is_empty() || pair.good.is_empty() {
            return Err(CorrectionError::EmptyPair);
        }
        self.map.insert(pair.bad, Value::String(pair.good));
        self.persist()
    }

    /// Serialize the full map (2-space indent) to a sibling temp file and
    /// rename it over the target so readers never see a partial file.
    pub fn persist(&self) -> Result<(), CorrectionError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.map)?;
        let mut tmp_name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
