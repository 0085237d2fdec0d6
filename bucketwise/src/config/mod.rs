//! Configuration management for bucketwise
//!
//! Default config location: ~/.bucketwise/config.toml

use crate::aggs::{AggTree, AggType, DEFAULT_MISSING_BUCKET_LABEL, DEFAULT_OTHER_BUCKET_LABEL};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub labels: LabelConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Display labels for synthesized buckets, used when an aggregation sets none
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LabelConfig {
    #[serde(default = "default_other_label")]
    pub other_bucket: String,
    #[serde(default = "default_missing_label")]
    pub missing_bucket: String,
}

fn default_other_label() -> String {
    DEFAULT_OTHER_BUCKET_LABEL.to_string()
}

fn default_missing_label() -> String {
    DEFAULT_MISSING_BUCKET_LABEL.to_string()
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            other_bucket: default_other_label(),
            missing_bucket: default_missing_label(),
        }
    }
}

impl LabelConfig {
    /// Fill in labels on terms aggregations that do not set their own
    pub fn apply(&self, tree: &mut AggTree) {
        let handles: Vec<_> = tree.iter().map(|(handle, _)| handle).collect();
        for handle in handles {
            let Ok(node) = tree.node_mut(handle) else {
                continue;
            };
            if node.agg_type != AggType::Terms {
                continue;
            }
            node.params
                .other_bucket_label
                .get_or_insert_with(|| self.other_bucket.clone());
            node.params
                .missing_bucket_label
                .get_or_insert_with(|| self.missing_bucket.clone());
        }
    }
}

/// Monitoring cluster settings for the high-level stats rollup
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Maximum number of hits fetched per product (default: 10000)
    #[serde(default = "default_max_bucket_size")]
    pub max_bucket_size: usize,
    /// Index pattern per product; `{product}` is substituted in the default
    #[serde(default)]
    pub index_patterns: HashMap<String, String>,
    #[serde(default = "default_index_pattern")]
    pub default_index_pattern: String,
}

fn default_max_bucket_size() -> usize {
    10_000
}

fn default_index_pattern() -> String {
    ".monitoring-{product}-6-*".to_string()
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            max_bucket_size: default_max_bucket_size(),
            index_patterns: HashMap::new(),
            default_index_pattern: default_index_pattern(),
        }
    }
}

impl MonitoringConfig {
    pub fn index_pattern(&self, product: &str) -> String {
        self.index_patterns
            .get(product)
            .cloned()
            .unwrap_or_else(|| self.default_index_pattern.replace("{product}", product))
    }
}

/// Search backend connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Log output format: "pretty" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

/// ~/.bucketwise/config.toml
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bucketwise")
        .join("config.toml")
}

impl Config {
    /// Load config from the default location
    pub fn load() -> Result<Self> {
        Self::load_or_create(&default_config_path())
    }

    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        let config_path = expand_tilde(config_path)?;
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            // Try to save default config
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = config.save(&config_path);
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))
    } else {
        Ok(path.to_path_buf())
    }
}
