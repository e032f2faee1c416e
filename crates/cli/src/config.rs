use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Optional TOML configuration for the collaborator endpoints and seed
/// discovery knobs. Every field has a default; command-line flags win
/// over file values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub search_endpoint: Option<String>,
    pub semantic_limit: usize,
    pub k: usize,
    pub threshold: f32,
    pub exclude_keywords: Vec<String>,
    pub workers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            search_endpoint: None,
            semantic_limit: 20,
            k: 100,
            threshold: 0.5,
            exclude_keywords: Vec::new(),
            workers: 4,
        }
    }
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("Invalid config {}", path.display()))
    }
}
