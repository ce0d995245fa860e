use crate::memory::error::MemoryError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Weights of the ranking formula
/// `keyword·overlap + semantic·cosine − age·age_penalty + confidence·strength`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Weight of the fraction of query tokens present in the record
    pub keyword: f32,
    /// Weight of the cosine similarity of the semantic vectors
    pub semantic: f32,
    /// Weight of the age penalty (days since last update)
    pub age: f32,
    /// Weight of the record strength
    pub confidence: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            keyword: 0.6,
            semantic: 0.25,
            age: 0.05,
            confidence: 0.1,
        }
    }
}

impl ScoringWeights {
    fn validate(&self) -> Result<(), MemoryError> {
        for (name, value) in [
            ("keyword", self.keyword),
            ("semantic", self.semantic),
            ("age", self.age),
            ("confidence", self.confidence),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MemoryError::Config(format!(
                    "scoring.{} must be a finite, non-negative number (got {})",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Memory service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Directory holding the snapshot and journal files
    pub root: PathBuf,
    /// Multiplier applied to every committed record by a decay sweep
    pub decay_factor: f32,
    /// Committed-store journal lines tolerated before an automatic checkpoint (0 disables)
    pub journal_compact_threshold: usize,
    /// Ranking weights
    pub scoring: ScoringWeights,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/memory"),
            decay_factor: 0.98,
            journal_compact_threshold: 512,
            scoring: ScoringWeights::default(),
        }
    }
}

impl MemoryConfig {
    /// Defaults rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, MemoryError> {
        if !path.exists() {
            log::debug!("[Memory] No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            MemoryError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: MemoryConfig = toml::from_str(&content).map_err(|e| {
            MemoryError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, MemoryError> {
        toml::to_string_pretty(self).map_err(|e| MemoryError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.root.as_os_str().is_empty() {
            return Err(MemoryError::Config("root must not be empty".to_string()));
        }
        if !self.decay_factor.is_finite() || !(0.0..=1.0).contains(&self.decay_factor) {
            return Err(MemoryError::Config(format!(
                "decay_factor must be within [0, 1] (got {})",
                self.decay_factor
            )));
        }
        self.scoring.validate()
    }
}
