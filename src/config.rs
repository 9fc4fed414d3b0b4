use crate::features::clean::OutlierPasses;
use crate::models::ModelKind;
use crate::preprocess::ScalerKind;
use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub data_config: DataConfig,
    #[serde(default)]
    pub feature_config: FeatureConfig,
    #[serde(default)]
    pub split_config: SplitConfig,
    #[serde(default)]
    pub model_config: ModelBankConfig,
    #[serde(default)]
    pub output_config: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_yahoo_base_url")]
    pub yahoo_base_url: String,
    #[serde(default = "default_coingecko_base_url")]
    pub coingecko_base_url: String,
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Extra ticker -> catalog id entries for the fallback source
    #[serde(default)]
    pub coin_id_overrides: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_target_column")]
    pub target_column: String,
    #[serde(default = "default_lags")]
    pub lags: Vec<usize>,
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    #[serde(default)]
    pub outlier_passes: OutlierPasses,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default)]
    pub scaler: ScalerKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBankConfig {
    #[serde(default = "default_enabled_models")]
    pub enabled: Vec<ModelKind>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_alpha")]
    pub ridge_alpha: f64,
    #[serde(default = "default_alpha")]
    pub lasso_alpha: f64,
    #[serde(default = "default_lasso_max_iter")]
    pub lasso_max_iter: usize,
    #[serde(default = "default_n_estimators")]
    pub forest_trees: usize,
    #[serde(default = "default_forest_max_depth")]
    pub forest_max_depth: usize,
    #[serde(default = "default_n_estimators")]
    pub boosting_stages: usize,
    #[serde(default = "default_boosting_learning_rate")]
    pub boosting_learning_rate: f64,
    #[serde(default = "default_boosting_max_depth")]
    pub boosting_max_depth: usize,
    #[serde(default = "default_svr_c")]
    pub svr_c: f64,
    #[serde(default = "default_svr_epsilon")]
    pub svr_epsilon: f64,
    #[serde(default = "default_hidden_layers")]
    pub mlp_hidden_layers: Vec<usize>,
    #[serde(default = "default_mlp_max_epochs")]
    pub mlp_max_epochs: usize,
    #[serde(default = "default_mlp_learning_rate")]
    pub mlp_learning_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_report_top_features")]
    pub report_top_features: usize,
    #[serde(default = "default_report_prediction_rows")]
    pub report_prediction_rows: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            yahoo_base_url: default_yahoo_base_url(),
            coingecko_base_url: default_coingecko_base_url(),
            quote_currency: default_quote_currency(),
            request_timeout_secs: default_request_timeout_secs(),
            coin_id_overrides: HashMap::new(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            target_column: default_target_column(),
            lags: default_lags(),
            horizon: default_horizon(),
            outlier_passes: OutlierPasses::default(),
        }
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            scaler: ScalerKind::default(),
        }
    }
}

impl Default for ModelBankConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_models(),
            seed: default_seed(),
            ridge_alpha: default_alpha(),
            lasso_alpha: default_alpha(),
            lasso_max_iter: default_lasso_max_iter(),
            forest_trees: default_n_estimators(),
            forest_max_depth: default_forest_max_depth(),
            boosting_stages: default_n_estimators(),
            boosting_learning_rate: default_boosting_learning_rate(),
            boosting_max_depth: default_boosting_max_depth(),
            svr_c: default_svr_c(),
            svr_epsilon: default_svr_epsilon(),
            mlp_hidden_layers: default_hidden_layers(),
            mlp_max_epochs: default_mlp_max_epochs(),
            mlp_learning_rate: default_mlp_learning_rate(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            report_top_features: default_report_top_features(),
            report_prediction_rows: default_report_prediction_rows(),
        }
    }
}

fn default_yahoo_base_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}

fn default_coingecko_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_quote_currency() -> String {
    "usd".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_target_column() -> String {
    "Close".to_string()
}

fn default_lags() -> Vec<usize> {
    vec![1, 2, 3, 5, 10]
}

fn default_horizon() -> usize {
    1 // predict the next day's close
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_enabled_models() -> Vec<ModelKind> {
    ModelKind::ALL.to_vec()
}

fn default_seed() -> u64 {
    42
}

fn default_alpha() -> f64 {
    1.0
}

fn default_lasso_max_iter() -> usize {
    1000
}

fn default_n_estimators() -> usize {
    100
}

fn default_forest_max_depth() -> usize {
    10
}

fn default_boosting_learning_rate() -> f64 {
    0.1
}

fn default_boosting_max_depth() -> usize {
    6
}

fn default_svr_c() -> f64 {
    1.0
}

fn default_svr_epsilon() -> f64 {
    0.1
}

fn default_hidden_layers() -> Vec<usize> {
    vec![100, 50]
}

fn default_mlp_max_epochs() -> usize {
    500
}

fn default_mlp_learning_rate() -> f64 {
    0.001
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_report_top_features() -> usize {
    10
}

fn default_report_prediction_rows() -> usize {
    10
}

impl PipelineConfig {
    /// Load configuration from a JSON file, falling back to defaults when the
    /// file does not exist. Missing fields take their defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "Config file {} not found, using default configuration",
                path.display()
            );
            return Ok(Self::default());
        }

        let config_str = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&config_str)?;
        config.validate()?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fraction = self.split_config.test_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            anyhow::bail!("test_fraction must be in (0, 1), got {}", fraction);
        }
        if self.feature_config.horizon == 0 {
            anyhow::bail!("horizon must be at least 1");
        }
        if self.feature_config.lags.contains(&0) {
            anyhow::bail!("lag offsets must be positive");
        }
        if self.model_config.enabled.is_empty() {
            anyhow::bail!("at least one model must be enabled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_catalogue() {
        let config = PipelineConfig::default();
        assert_eq!(config.feature_config.lags, vec![1, 2, 3, 5, 10]);
        assert_eq!(config.feature_config.horizon, 1);
        assert_eq!(config.split_config.test_fraction, 0.2);
        assert_eq!(config.model_config.enabled.len(), 7);
        assert_eq!(config.model_config.mlp_hidden_layers, vec![100, 50]);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "feature_config": { "lags": [1, 7] }, "split_config": { "scaler": "min_max" } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.feature_config.lags, vec![1, 7]);
        assert_eq!(config.feature_config.target_column, "Close");
        assert_eq!(config.split_config.scaler, ScalerKind::MinMax);
        assert_eq!(config.model_config.forest_trees, 100);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = PipelineConfig::load_from_file("/nonexistent/config.json").unwrap();
        assert_eq!(config.output_config.output_dir, "output");
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "split_config": {{ "test_fraction": 1.5 }} }}"#).unwrap();

        assert!(PipelineConfig::load_from_file(file.path()).is_err());
    }
}
