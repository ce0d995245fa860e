//! CLI context - configuration and service handle shared by all commands

use crate::output::OutputFormat;
use anyhow::Context;
use mnemo::{MemoryConfig, MemoryService};
use std::path::PathBuf;

const DEFAULT_CONFIG_PATHS: &[&str] = &["mnemo.toml", "config/mnemo.toml"];

pub struct CliContext {
    /// Configuration file in use, if any
    pub config_path: Option<PathBuf>,
    pub config: MemoryConfig,
    pub output_format: OutputFormat,
}

impl CliContext {
    /// Load configuration from `config_path` (or the first default path that
    /// exists), then apply a `--root` override.
    pub fn new(
        config_path: Option<PathBuf>,
        root: Option<PathBuf>,
        output_format: OutputFormat,
    ) -> anyhow::Result<Self> {
        let config_path = config_path.or_else(|| {
            DEFAULT_CONFIG_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|p| p.exists())
        });

        let mut config = match &config_path {
            Some(path) => MemoryConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => MemoryConfig::default(),
        };
        if let Some(root) = root {
            config.root = root;
        }
        config.validate().context("invalid configuration")?;

        tracing::debug!(
            "Using memory root {} (config: {:?})",
            config.root.display(),
            config_path
        );

        Ok(Self {
            config_path,
            config,
            output_format,
        })
    }

    pub fn open_service(&self) -> anyhow::Result<MemoryService> {
        MemoryService::open(self.config.clone())
            .with_context(|| format!("opening memory at {}", self.config.root.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_root_override_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mnemo.toml");
        fs::write(&path, "root = \"from-file\"\ndecay_factor = 0.5\n").unwrap();

        let ctx = CliContext::new(
            Some(path.clone()),
            Some(dir.path().join("override")),
            OutputFormat::Json,
        )
        .unwrap();
        assert_eq!(ctx.config.root, dir.path().join("override"));
        assert_eq!(ctx.config.decay_factor, 0.5);
        assert_eq!(ctx.config_path, Some(path));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mnemo.toml");
        fs::write(&path, "decay_factor = 3.0\n").unwrap();
        assert!(CliContext::new(Some(path), None, OutputFormat::Table).is_err());
    }
}
