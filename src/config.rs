//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.order-insights.toml` files.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use order_insights::processor::stats::DEFAULT_BINS;
use order_insights::{Analysis, AnalysisParams, ColumnMap, DEFAULT_TOP_N, LoadOptions, Theme};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = ".order-insights.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input file and parsing settings.
    #[serde(default)]
    pub data: DataConfig,

    /// Column names the views read.
    #[serde(default)]
    pub columns: ColumnMap,

    /// View settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Chart styling.
    #[serde(default)]
    pub theme: Theme,
}

/// Where the data comes from and how it is parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Default CSV path.
    #[serde(default = "default_path")]
    pub path: String,

    /// Columns parsed as timestamps.
    #[serde(default = "default_timestamp_columns")]
    pub timestamp_columns: Vec<String>,

    /// Rows sampled for type inference.
    #[serde(default = "default_infer_rows")]
    pub infer_rows: usize,

    /// Fail on rows with the wrong field count instead of skipping them.
    #[serde(default = "default_true")]
    pub strict: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            timestamp_columns: default_timestamp_columns(),
            infer_rows: default_infer_rows(),
            strict: true,
        }
    }
}

fn default_path() -> String {
    "data/sample_orders.csv".to_string()
}

fn default_timestamp_columns() -> Vec<String> {
    vec!["shipping_limit_date".to_string()]
}

fn default_infer_rows() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

/// View settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Ranked rows per view.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Bins in the price histogram.
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,

    /// Views computed when `--analysis` is not given.
    #[serde(default = "default_views")]
    pub views: Vec<String>,

    /// Ranked results remembered per session.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            histogram_bins: default_histogram_bins(),
            views: default_views(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_histogram_bins() -> usize {
    DEFAULT_BINS
}

fn default_views() -> Vec<String> {
    vec!["all".to_string()]
}

fn default_cache_capacity() -> usize {
    128
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data) = args.data {
            self.data.path = data.display().to_string();
        }
        if args.lenient {
            self.data.strict = false;
        }
        if let Some(top_n) = args.top_n {
            self.analysis.top_n = top_n;
        }
    }

    /// Check values the parser cannot reject on its own.
    pub fn validate(&self) -> Result<()> {
        if self.analysis.top_n == 0 {
            anyhow::bail!("analysis.top_n must be at least 1");
        }
        if self.analysis.histogram_bins == 0 {
            anyhow::bail!("analysis.histogram_bins must be at least 1");
        }
        if self.data.infer_rows == 0 {
            anyhow::bail!("data.infer_rows must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.theme.scatter_alpha) {
            anyhow::bail!("theme.scatter_alpha must be between 0.0 and 1.0");
        }
        crate::cli::parse_analyses(&self.analysis.views)
            .map_err(|e| anyhow::anyhow!("analysis.views: {}", e))?;
        Ok(())
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            timestamp_columns: self.data.timestamp_columns.clone(),
            infer_rows: self.data.infer_rows,
            strict: self.data.strict,
        }
    }

    pub fn params(&self, range: Option<(NaiveDateTime, NaiveDateTime)>) -> AnalysisParams {
        AnalysisParams {
            columns: self.columns.clone(),
            top_n: self.analysis.top_n,
            bins: self.analysis.histogram_bins,
            range,
        }
    }

    /// Views to run when none are named on the command line.
    pub fn default_views(&self) -> Vec<Analysis> {
        crate::cli::parse_analyses(&self.analysis.views).unwrap_or_else(|_| Analysis::ALL.to_vec())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.data.path, "data/sample_orders.csv");
        assert_eq!(config.analysis.top_n, 10);
        assert_eq!(config.analysis.histogram_bins, 50);
        assert_eq!(config.columns.price, "price");
        assert!(config.data.strict);
        assert_eq!(config.default_views(), Analysis::ALL.to_vec());
    }

    #[test]
    fn test_default_data_path_ships_with_the_repo() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(default_path());
        assert!(path.is_file(), "{} missing", path.display());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[data]
path = "exports/olist.csv"
strict = false

[columns]
category = "category"

[analysis]
top_n = 5
views = ["revenue", "top-sellers"]

[theme]
width = 20
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.data.path, "exports/olist.csv");
        assert!(!config.data.strict);
        assert_eq!(config.data.infer_rows, 1000);
        assert_eq!(config.columns.category, "category");
        assert_eq!(config.columns.seller, "seller_id");
        assert_eq!(config.analysis.top_n, 5);
        assert_eq!(
            config.default_views(),
            vec![Analysis::Revenue, Analysis::TopSellers]
        );
        assert_eq!(config.theme.width, 20);
        assert_eq!(config.theme.style, "whitegrid");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_with_args() {
        let mut config = Config::default();
        let args = crate::cli::Args::try_parse_from([
            "order-insights",
            "--data",
            "other.csv",
            "--lenient",
            "-n",
            "3",
        ])
        .unwrap();
        config.merge_with_args(&args);
        assert_eq!(config.data.path, "other.csv");
        assert!(!config.load_options().strict);
        assert_eq!(config.params(None).top_n, 3);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.analysis.views = vec!["pie".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.theme.scatter_alpha = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[data]"));
        assert!(toml_str.contains("[columns]"));
        assert!(toml_str.contains("[analysis]"));
        assert!(toml_str.contains("[theme]"));
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.analysis.top_n, 10);
    }
}
