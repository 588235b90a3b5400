//! Runtime configuration — every tunable knob enumerated in §6, loaded from
//! a JSON file with `#[serde(default)]` on every field so older config files
//! keep loading after new fields are added, saved atomically (temp file +
//! rename), in the idiom of the teacher's `runtime_config.rs`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

fn default_drawdown_termination_pct() -> f64 {
    0.90
}

fn default_zero_volume_hours() -> i64 {
    48
}

fn default_poll_interval_secs() -> u64 {
    2 * 3_600
}

fn default_provider_timeout_secs() -> u64 {
    5
}

fn default_retry_attempts_per_checkpoint() -> u32 {
    3
}

fn default_td_learning_rate() -> f64 {
    0.10
}

fn default_td_weight_overall() -> f64 {
    0.40
}

fn default_td_weight_coin() -> f64 {
    0.50
}

fn default_td_weight_cross() -> f64 {
    0.10
}

fn default_reputation_weight_win() -> f64 {
    0.30
}

fn default_reputation_weight_roi() -> f64 {
    0.25
}

fn default_reputation_weight_sharpe() -> f64 {
    0.20
}

fn default_reputation_weight_speed() -> f64 {
    0.15
}

fn default_reputation_weight_conf() -> f64 {
    0.10
}

fn default_tier_elite() -> f64 {
    90.0
}

fn default_tier_excellent() -> f64 {
    75.0
}

fn default_tier_good() -> f64 {
    60.0
}

fn default_tier_average() -> f64 {
    40.0
}

fn default_tier_poor() -> f64 {
    20.0
}

fn default_unproven_min_signals() -> u32 {
    10
}

fn default_score_suppression_min_signals() -> u32 {
    5
}

fn default_hot_cache_ttl_secs() -> u64 {
    2 * 3_600
}

fn default_hot_cache_capacity() -> usize {
    10_000
}

fn default_historical_cache_capacity() -> usize {
    1_000_000
}

fn default_bootstrap_batch_size() -> usize {
    100
}

fn default_bootstrap_parallelism_per_channel() -> usize {
    5
}

fn default_tracking_window_days() -> i64 {
    30
}

fn default_extended_window_days() -> i64 {
    90
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

/// TD-learner blend weights (§4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TdWeights {
    #[serde(default = "default_td_weight_overall")]
    pub overall: f64,
    #[serde(default = "default_td_weight_coin")]
    pub coin: f64,
    #[serde(default = "default_td_weight_cross")]
    pub cross: f64,
}

impl Default for TdWeights {
    fn default() -> Self {
        Self {
            overall: default_td_weight_overall(),
            coin: default_td_weight_coin(),
            cross: default_td_weight_cross(),
        }
    }
}

/// Composite-score weights (§4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReputationWeights {
    #[serde(default = "default_reputation_weight_win")]
    pub win: f64,
    #[serde(default = "default_reputation_weight_roi")]
    pub roi: f64,
    #[serde(default = "default_reputation_weight_sharpe")]
    pub sharpe: f64,
    #[serde(default = "default_reputation_weight_speed")]
    pub speed: f64,
    #[serde(default = "default_reputation_weight_conf")]
    pub conf: f64,
}

impl Default for ReputationWeights {
    fn default() -> Self {
        Self {
            win: default_reputation_weight_win(),
            roi: default_reputation_weight_roi(),
            sharpe: default_reputation_weight_sharpe(),
            speed: default_reputation_weight_speed(),
            conf: default_reputation_weight_conf(),
        }
    }
}

/// Score thresholds for each tier, highest first (§4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierThresholds {
    #[serde(default = "default_tier_elite")]
    pub elite: f64,
    #[serde(default = "default_tier_excellent")]
    pub excellent: f64,
    #[serde(default = "default_tier_good")]
    pub good: f64,
    #[serde(default = "default_tier_average")]
    pub average: f64,
    #[serde(default = "default_tier_poor")]
    pub poor: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            elite: default_tier_elite(),
            excellent: default_tier_excellent(),
            good: default_tier_good(),
            average: default_tier_average(),
            poor: default_tier_poor(),
        }
    }
}

/// Top-level runtime configuration. Every field has a serde default so an
/// older JSON file missing newer fields still deserializes correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_tracking_window_days")]
    pub tracking_window_days: i64,
    #[serde(default = "default_extended_window_days")]
    pub extended_window_days: i64,

    #[serde(default = "default_drawdown_termination_pct")]
    pub drawdown_termination_pct: f64,
    #[serde(default = "default_zero_volume_hours")]
    pub zero_volume_hours: i64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    #[serde(default = "default_retry_attempts_per_checkpoint")]
    pub retry_attempts_per_checkpoint: u32,

    #[serde(default = "default_td_learning_rate")]
    pub td_learning_rate: f64,
    #[serde(default)]
    pub td_weights: TdWeights,

    #[serde(default)]
    pub reputation_weights: ReputationWeights,
    #[serde(default)]
    pub tier_thresholds: TierThresholds,

    #[serde(default = "default_unproven_min_signals")]
    pub unproven_min_signals: u32,
    #[serde(default = "default_score_suppression_min_signals")]
    pub score_suppression_min_signals: u32,

    #[serde(default = "default_hot_cache_ttl_secs")]
    pub hot_cache_ttl_secs: u64,
    #[serde(default = "default_hot_cache_capacity")]
    pub hot_cache_capacity: usize,
    #[serde(default = "default_historical_cache_capacity")]
    pub historical_cache_capacity: usize,

    #[serde(default = "default_bootstrap_batch_size")]
    pub bootstrap_batch_size: usize,
    #[serde(default = "default_bootstrap_parallelism_per_channel")]
    pub bootstrap_parallelism_per_channel: usize,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tracking_window_days: default_tracking_window_days(),
            extended_window_days: default_extended_window_days(),
            drawdown_termination_pct: default_drawdown_termination_pct(),
            zero_volume_hours: default_zero_volume_hours(),
            poll_interval_secs: default_poll_interval_secs(),
            provider_timeout_secs: default_provider_timeout_secs(),
            retry_attempts_per_checkpoint: default_retry_attempts_per_checkpoint(),
            td_learning_rate: default_td_learning_rate(),
            td_weights: TdWeights::default(),
            reputation_weights: ReputationWeights::default(),
            tier_thresholds: TierThresholds::default(),
            unproven_min_signals: default_unproven_min_signals(),
            score_suppression_min_signals: default_score_suppression_min_signals(),
            hot_cache_ttl_secs: default_hot_cache_ttl_secs(),
            hot_cache_capacity: default_hot_cache_capacity(),
            historical_cache_capacity: default_historical_cache_capacity(),
            bootstrap_batch_size: default_bootstrap_batch_size(),
            bootstrap_parallelism_per_channel: default_bootstrap_parallelism_per_channel(),
            bind_addr: default_bind_addr(),
            data_dir: default_data_dir(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`. Falls back to defaults
    /// (with a log) if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "no runtime config found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(path = %path.display(), "runtime config loaded");
        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write (temp file
    /// then rename), so a crash mid-write never corrupts the live config.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialize runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}
