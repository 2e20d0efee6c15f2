// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Evalview configuration
//!
//! Loaded from a TOML file, then overridden by `EVALVIEW_*` environment
//! variables. Command-line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::discover::{DiscoveryDepths, DEFAULT_DEPTH};
use crate::error::{EvalViewError, Result};
use crate::model::FeedbackGrouping;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EvalViewConfig {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Expansion depth for span `input_data`
    #[serde(default = "default_depth")]
    pub input_depth: usize,

    /// Expansion depth for span `output_data`
    #[serde(default = "default_depth")]
    pub output_depth: usize,

    /// Expansion depth for span `meta_info`
    #[serde(default = "default_depth")]
    pub meta_depth: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub grouping: FeedbackGrouping,

    /// Histogram bin count
    #[serde(default = "default_bins")]
    pub bins: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedbackConfig {
    /// Base URL of the experiment API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Maximum number of queued submissions
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding column schemas
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_depth() -> usize {
    DEFAULT_DEPTH
}

fn default_bins() -> usize {
    20
}

fn default_api_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_request_timeout() -> u64 {
    30
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./evalview-data")
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            input_depth: default_depth(),
            output_depth: default_depth(),
            meta_depth: default_depth(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            grouping: FeedbackGrouping::default(),
            bins: default_bins(),
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            queue_capacity: default_queue_capacity(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DiscoveryConfig {
    pub fn depths(&self) -> DiscoveryDepths {
        DiscoveryDepths {
            input: self.input_depth,
            output: self.output_depth,
            meta: self.meta_depth,
        }
    }
}

impl EvalViewConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - EVALVIEW_INPUT_DEPTH / EVALVIEW_OUTPUT_DEPTH / EVALVIEW_META_DEPTH
    /// - EVALVIEW_GROUPING: feedback grouping (default: none)
    /// - EVALVIEW_BINS: histogram bins (default: 20)
    /// - EVALVIEW_API_URL: experiment API base URL
    /// - EVALVIEW_QUEUE_CAPACITY: submission queue bound (default: 1024)
    /// - EVALVIEW_REQUEST_TIMEOUT: request timeout in seconds (default: 30)
    /// - EVALVIEW_DATA_DIR: schema directory (default: ./evalview-data)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override fields whose variable is set. Unparseable values are
    /// ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
                    None
                }
            }
        }

        if let Some(v) = parsed("EVALVIEW_INPUT_DEPTH", lookup("EVALVIEW_INPUT_DEPTH")) {
            self.discovery.input_depth = v;
        }
        if let Some(v) = parsed("EVALVIEW_OUTPUT_DEPTH", lookup("EVALVIEW_OUTPUT_DEPTH")) {
            self.discovery.output_depth = v;
        }
        if let Some(v) = parsed("EVALVIEW_META_DEPTH", lookup("EVALVIEW_META_DEPTH")) {
            self.discovery.meta_depth = v;
        }
        if let Some(v) = parsed("EVALVIEW_GROUPING", lookup("EVALVIEW_GROUPING")) {
            self.display.grouping = v;
        }
        if let Some(v) = parsed("EVALVIEW_BINS", lookup("EVALVIEW_BINS")) {
            self.display.bins = v;
        }
        if let Some(url) = lookup("EVALVIEW_API_URL") {
            self.feedback.api_base_url = url;
        }
        if let Some(v) = parsed("EVALVIEW_QUEUE_CAPACITY", lookup("EVALVIEW_QUEUE_CAPACITY")) {
            self.feedback.queue_capacity = v;
        }
        if let Some(v) = parsed("EVALVIEW_REQUEST_TIMEOUT", lookup("EVALVIEW_REQUEST_TIMEOUT")) {
            self.feedback.request_timeout_secs = v;
        }
        if let Some(dir) = lookup("EVALVIEW_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.display.bins == 0 {
            return Err(EvalViewError::Config("display.bins must be at least 1".to_string()));
        }
        if self.feedback.queue_capacity == 0 {
            return Err(EvalViewError::Config(
                "feedback.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.feedback.api_base_url.trim().is_empty() {
            return Err(EvalViewError::Config(
                "feedback.api_base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EvalViewConfig::default();
        assert_eq!(config.discovery.depths(), DiscoveryDepths::default());
        assert_eq!(config.display.grouping, FeedbackGrouping::None);
        assert_eq!(config.display.bins, 20);
        assert_eq!(config.feedback.queue_capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EvalViewConfig = toml::from_str(
            r#"
            [discovery]
            output_depth = 4

            [display]
            grouping = "latestByUser"
            "#,
        )
        .unwrap();

        assert_eq!(config.discovery.input_depth, 2);
        assert_eq!(config.discovery.output_depth, 4);
        assert_eq!(config.display.grouping, FeedbackGrouping::LatestByUser);
        assert_eq!(config.display.bins, 20);
        assert_eq!(config.storage.data_dir, PathBuf::from("./evalview-data"));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("evalview.toml");
        std::fs::write(&path, "[display]\nbins = 5\n\n[feedback]\nqueue_capacity = 8\n").unwrap();

        let mut config = EvalViewConfig::from_file(&path).unwrap();
        let vars: HashMap<&str, &str> = HashMap::from([
            ("EVALVIEW_BINS", "12"),
            ("EVALVIEW_GROUPING", "average_by_type"),
            ("EVALVIEW_META_DEPTH", "not-a-number"),
        ]);
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.display.bins, 12);
        assert_eq!(config.display.grouping, FeedbackGrouping::AverageByType);
        assert_eq!(config.feedback.queue_capacity, 8);
        assert_eq!(config.discovery.meta_depth, 2);
    }

    #[test]
    fn test_validate_rejects_zero_bins() {
        let mut config = EvalViewConfig::default();
        config.display.bins = 0;
        assert!(matches!(config.validate(), Err(EvalViewError::Config(_))));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(&path, "[display\nbins = ").unwrap();
        assert!(matches!(
            EvalViewConfig::from_file(&path),
            Err(EvalViewError::Config(_))
        ));
    }
}
