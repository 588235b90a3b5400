//! Reputation Engine (§4.4): owns channel, coin, and cross-channel
//! reputation state, applies the three-level TD learner on every terminal
//! event, and recomputes the composite score and tier.

pub mod stats;
pub mod td;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ReputationWeights, TdWeights, TierThresholds};
use crate::outcome::OutcomeEvent;
use crate::types::{ChannelId, CoinKey, Tier};
use stats::{record_tier, PredictionError, RoiAccumulator, TierStats};
use td::{clamp_ath_mul, predict_roi, BlendWeights, TdEstimate};

/// Per-(channel, coin) reputation slice (§3 `CoinPerformance`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinPerformance {
    pub symbol: Option<String>,
    pub address: Option<String>,
    pub mentions_count: u64,
    pub signals: Vec<String>,
    pub expected_roi_coin: TdEstimate,
    pub prediction_errors: Vec<PredictionError>,
    pub accumulator: RoiAccumulator,
}

impl CoinPerformance {
    fn new() -> Self {
        Self {
            symbol: None,
            address: None,
            mentions_count: 0,
            signals: Vec::new(),
            expected_roi_coin: TdEstimate::new(1.50),
            prediction_errors: Vec::new(),
            accumulator: RoiAccumulator::default(),
        }
    }
}

/// Aggregate reputation for a single channel (§3 `ChannelReputation`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelReputation {
    pub channel_id: ChannelId,
    pub accumulator: RoiAccumulator,
    pub tier_breakdown: HashMap<String, TierStats>,
    pub expected_roi_overall: TdEstimate,
    pub prediction_errors: Vec<PredictionError>,
    pub composite_score: Option<f64>,
    pub tier: Tier,
    pub insufficient_data: bool,
    pub first_signal_at: Option<DateTime<Utc>>,
    pub last_signal_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub coin_performance: HashMap<CoinKey, CoinPerformance>,
    pub mean_entry_confidence: f64,
    sum_entry_confidence: f64,
    confidence_samples: u64,
    /// `signal_ref:reason` keys already applied, guarding against a replayed
    /// terminal event (§8).
    #[serde(default)]
    applied_terminal_keys: HashSet<String>,
}

impl ChannelReputation {
    fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            accumulator: RoiAccumulator::default(),
            tier_breakdown: HashMap::new(),
            expected_roi_overall: TdEstimate::new(1.50),
            prediction_errors: Vec::new(),
            composite_score: None,
            tier: Tier::Unproven,
            insufficient_data: false,
            first_signal_at: None,
            last_signal_at: None,
            updated_at: None,
            applied_terminal_keys: HashSet::new(),
            coin_performance: HashMap::new(),
            mean_entry_confidence: 0.0,
            sum_entry_confidence: 0.0,
            confidence_samples: 0,
        }
    }

    fn record_entry_confidence(&mut self, confidence: f64) {
        self.sum_entry_confidence += confidence;
        self.confidence_samples += 1;
        self.mean_entry_confidence = self.sum_entry_confidence / self.confidence_samples as f64;
    }

    fn total_terminal_signals(&self) -> u64 {
        self.accumulator.count
    }
}

/// Global per-coin aggregate across every channel that mentions it (§3
/// `CoinCrossChannel`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinCrossChannel {
    pub coin_key: CoinKey,
    pub channels_seen: HashSet<ChannelId>,
    pub mentions_total: u64,
    pub signals_total: u64,
    pub mean_roi_all_channels: TdEstimate,
    pub channel_performance: HashMap<ChannelId, RoiAccumulator>,
    pub best_channel_for_coin: Option<ChannelId>,
    pub worst_channel_for_coin: Option<ChannelId>,
}

impl CoinCrossChannel {
    fn new(coin_key: CoinKey) -> Self {
        Self {
            coin_key,
            channels_seen: HashSet::new(),
            mentions_total: 0,
            signals_total: 0,
            mean_roi_all_channels: TdEstimate::new(1.50),
            channel_performance: HashMap::new(),
            best_channel_for_coin: None,
            worst_channel_for_coin: None,
        }
    }

    /// Recompute `mean_roi_all_channels` as the unweighted mean of
    /// channel-level coin averages, and the best/worst channel pointers.
    fn recompute_cross_channel_mean(&mut self) {
        if self.channel_performance.is_empty() {
            return;
        }
        let sum: f64 = self.channel_performance.values().map(|a| a.mean_roi()).sum();
        self.mean_roi_all_channels.value = sum / self.channel_performance.len() as f64;
        self.mean_roi_all_channels.observations = self.channel_performance.len() as u64;

        let mut best: Option<(&ChannelId, f64)> = None;
        let mut worst: Option<(&ChannelId, f64)> = None;
        for (channel, acc) in &self.channel_performance {
            let roi = acc.mean_roi();
            if best.map(|(_, b)| roi > b).unwrap_or(true) {
                best = Some((channel, roi));
            }
            if worst.map(|(_, w)| roi < w).unwrap_or(true) {
                worst = Some((channel, roi));
            }
        }
        self.best_channel_for_coin = best.map(|(c, _)| c.clone());
        self.worst_channel_for_coin = worst.map(|(c, _)| c.clone());
    }
}

/// Owns all reputation state and applies updates from terminal
/// [`OutcomeEvent`]s. Mutated exclusively by this engine, per §3's lifetime
/// note.
pub struct ReputationEngine {
    channels: RwLock<HashMap<ChannelId, ChannelReputation>>,
    cross_channel: RwLock<HashMap<CoinKey, CoinCrossChannel>>,
    alpha: f64,
    td_weights: TdWeights,
    reputation_weights: ReputationWeights,
    tier_thresholds: TierThresholds,
    unproven_min_signals: u32,
    score_suppression_min_signals: u32,
}

impl ReputationEngine {
    pub fn new(
        alpha: f64,
        td_weights: TdWeights,
        reputation_weights: ReputationWeights,
        tier_thresholds: TierThresholds,
        unproven_min_signals: u32,
        score_suppression_min_signals: u32,
    ) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            cross_channel: RwLock::new(HashMap::new()),
            alpha,
            td_weights,
            reputation_weights,
            tier_thresholds,
            unproven_min_signals,
            score_suppression_min_signals,
        }
    }

    /// The weighted TD blend used to set a freshly registered signal's
    /// `predicted_roi` (§4.4). Called by the orchestration layer before
    /// `OutcomeEngine::register`.
    pub fn predict_roi(&self, channel_id: &ChannelId, coin_key: &CoinKey) -> f64 {
        let channels = self.channels.read();
        let Some(channel) = channels.get(channel_id) else {
            return 1.50;
        };
        let coin = channel.coin_performance.get(coin_key).map(|c| &c.expected_roi_coin);
        let cross_channel = self.cross_channel.read();
        let cross = cross_channel.get(coin_key).map(|c| &c.mean_roi_all_channels);

        predict_roi(
            &channel.expected_roi_overall,
            coin,
            cross,
            BlendWeights {
                overall: self.td_weights.overall,
                coin: self.td_weights.coin,
                cross: self.td_weights.cross,
            },
        )
    }

    /// Record a mention's entry confidence and bump the coin's mention
    /// count, independent of whether the signal ever terminates. Called at
    /// registration time so `confidence_n` reflects all attempts, not just
    /// terminal ones.
    pub fn record_mention(&self, channel_id: &ChannelId, coin_key: &CoinKey, symbol: Option<String>, address: Option<String>, entry_confidence: f64) {
        let mut channels = self.channels.write();
        let channel = channels.entry(channel_id.clone()).or_insert_with(|| ChannelReputation::new(channel_id.clone()));
        channel.record_entry_confidence(entry_confidence);
        let coin = channel.coin_performance.entry(coin_key.clone()).or_insert_with(CoinPerformance::new);
        coin.mentions_count += 1;
        if coin.symbol.is_none() {
            coin.symbol = symbol;
        }
        if coin.address.is_none() {
            coin.address = address;
        }

        let mut cross_channel = self.cross_channel.write();
        let cross = cross_channel.entry(coin_key.clone()).or_insert_with(|| CoinCrossChannel::new(coin_key.clone()));
        cross.channels_seen.insert(channel_id.clone());
        cross.mentions_total += 1;
    }

    /// Apply a terminal [`OutcomeEvent`]: TD-step both the overall and
    /// coin-specific estimates, append prediction errors, recompute
    /// cross-channel means, and refresh the composite score/tier (§4.4).
    ///
    /// Idempotency key is `(signal_ref, reason)`: replaying the same event
    /// twice is rejected (§8 property).
    pub fn apply_terminal_event(&self, event: &OutcomeEvent, now: DateTime<Utc>) -> Result<(), crate::error::Error> {
        let ath_mul_clamped = clamp_ath_mul(event.ath_mul);

        let mut channels = self.channels.write();
        let channel = channels
            .entry(event.channel_id.clone())
            .or_insert_with(|| ChannelReputation::new(event.channel_id.clone()));

        // Idempotency key is signal_ref + terminal reason (§8).
        let idempotency_key = format!("{}:{}", event.signal_ref, event.reason);
        if !channel.applied_terminal_keys.insert(idempotency_key) {
            return Err(crate::error::Error::DuplicateTerminalEvent(event.signal_ref.clone()));
        }

        if channel.first_signal_at.is_none() {
            channel.first_signal_at = Some(now);
        }
        channel.last_signal_at = Some(now);
        channel.updated_at = Some(now);

        // Overall level: always TD-steps.
        let overall_pre = channel.expected_roi_overall.td_step(ath_mul_clamped, self.alpha);
        let overall_err = PredictionError::new(
            now,
            event.signal_ref.clone(),
            event.coin_key.clone(),
            event.entry_price,
            event.ath_price,
            event.days_to_ath,
            overall_pre,
            ath_mul_clamped,
        );
        channel.accumulator.record_roi(ath_mul_clamped, event.days_to_ath);
        channel.accumulator.record_prediction_error(&overall_err);
        channel.prediction_errors.push(overall_err);

        record_tier(&mut channel.tier_breakdown, "default", ath_mul_clamped);

        // Coin level: initialize on first terminal signal, TD-step after.
        let coin = channel
            .coin_performance
            .entry(event.coin_key.clone())
            .or_insert_with(CoinPerformance::new);
        coin.signals.push(event.signal_ref.clone());

        if coin.expected_roi_coin.has_observations() {
            let coin_pre = coin.expected_roi_coin.td_step(ath_mul_clamped, self.alpha);
            let coin_err = PredictionError::new(
                now,
                event.signal_ref.clone(),
                event.coin_key.clone(),
                event.entry_price,
                event.ath_price,
                event.days_to_ath,
                coin_pre,
                ath_mul_clamped,
            );
            coin.accumulator.record_roi(ath_mul_clamped, event.days_to_ath);
            coin.accumulator.record_prediction_error(&coin_err);
            coin.prediction_errors.push(coin_err);
        } else {
            // Initializer: set the value directly, no TD step, no error.
            coin.expected_roi_coin.initialize(ath_mul_clamped);
            coin.accumulator.record_roi(ath_mul_clamped, event.days_to_ath);
        }

        let total_terminal = channel.total_terminal_signals() as u32;
        if total_terminal < self.score_suppression_min_signals as u32 {
            channel.composite_score = None;
        } else {
            channel.composite_score = Some(self.composite_score(channel));
        }
        channel.tier = self.tier_for(channel);

        let coin_key = event.coin_key.clone();
        let channel_id = event.channel_id.clone();
        drop(channels);

        let mut cross_channel = self.cross_channel.write();
        let cross = cross_channel.entry(coin_key.clone()).or_insert_with(|| CoinCrossChannel::new(coin_key.clone()));
        cross.signals_total += 1;
        cross.channels_seen.insert(channel_id.clone());
        let per_channel_acc = cross.channel_performance.entry(channel_id).or_default();
        // Feed the raw per-signal ath_mul, not the channel's running coin
        // average — channel_performance[channel].mean_roi() must equal the
        // channel's true mean ROI for this coin (§4.4, S6), not a mean of
        // means.
        per_channel_acc.record_roi(ath_mul_clamped, event.days_to_ath);
        cross.recompute_cross_channel_mean();

        info!(signal_ref = %event.signal_ref, ath_mul = ath_mul_clamped, "reputation updated from terminal event");
        Ok(())
    }

    fn composite_score(&self, channel: &ChannelReputation) -> f64 {
        let win_rate_n = channel.accumulator.win_rate();
        let roi_n = ((channel.accumulator.mean_roi() - 1.0) / 4.0).clamp(0.0, 1.0);
        let sharpe_n = (channel.accumulator.sharpe() / 2.0).clamp(0.0, 1.0);
        let speed_n = (1.0 - channel.accumulator.mean_days_to_ath() / 30.0).clamp(0.0, 1.0);
        let confidence_n = channel.mean_entry_confidence.clamp(0.0, 1.0);

        100.0
            * (self.reputation_weights.win * win_rate_n
                + self.reputation_weights.roi * roi_n
                + self.reputation_weights.sharpe * sharpe_n
                + self.reputation_weights.speed * speed_n
                + self.reputation_weights.conf * confidence_n)
    }

    fn tier_for(&self, channel: &ChannelReputation) -> Tier {
        if channel.total_terminal_signals() < self.unproven_min_signals as u64 {
            return Tier::Unproven;
        }
        let score = channel.composite_score.unwrap_or(0.0);
        let t = &self.tier_thresholds;
        if score >= t.elite {
            Tier::Elite
        } else if score >= t.excellent {
            Tier::Excellent
        } else if score >= t.good {
            Tier::Good
        } else if score >= t.average {
            Tier::Average
        } else if score >= t.poor {
            Tier::Poor
        } else {
            Tier::Unreliable
        }
    }

    /// Mark (or clear) a channel's `insufficient_data` flag, recomputed by
    /// the Historical Bootstrap Orchestrator from its own success ratio
    /// (§4.5). The flag clears automatically once coverage improves — the
    /// caller recomputes it fresh on every bootstrap pass rather than this
    /// engine tracking a running ratio itself.
    pub fn set_insufficient_data(&self, channel_id: &ChannelId, flagged: bool) {
        let mut channels = self.channels.write();
        let channel = channels.entry(channel_id.clone()).or_insert_with(|| ChannelReputation::new(channel_id.clone()));
        channel.insufficient_data = flagged;
    }

    pub fn get_channel(&self, channel_id: &ChannelId) -> Option<ChannelReputation> {
        self.channels.read().get(channel_id).cloned()
    }

    pub fn all_channels(&self) -> Vec<ChannelReputation> {
        self.channels.read().values().cloned().collect()
    }

    pub fn get_cross_channel(&self, coin_key: &CoinKey) -> Option<CoinCrossChannel> {
        self.cross_channel.read().get(coin_key).cloned()
    }

    pub fn restore_channels(&self, channels: Vec<ChannelReputation>) {
        let mut map = self.channels.write();
        for channel in channels {
            map.insert(channel.channel_id.clone(), channel);
        }
    }

    pub fn restore_cross_channel(&self, entries: Vec<CoinCrossChannel>) {
        let mut map = self.cross_channel.write();
        for entry in entries {
            map.insert(entry.coin_key.clone(), entry);
        }
    }
}
