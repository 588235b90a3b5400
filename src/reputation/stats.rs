//! Incremental statistics accumulators for the Reputation Engine (§3, §4.4).
//!
//! ROI observations are carried as `f64` from here down: prices themselves
//! stay `Decimal` everywhere upstream (§3 representation notes), but once a
//! terminal `ath_mul` becomes a statistical sample, `f64` plus a running
//! Welford accumulator is what lets MAE/MSE/stddev stay O(1) per terminal
//! event instead of re-scanning the unbounded history (§4.4 AMBIENT note).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, CoinKey, OutcomeCategory};

/// One append-only record of a TD prediction's error against the terminal
/// realized `ath_mul` (§3 `PredictionError`). The initializer of a fresh
/// `CoinPerformance.expected_roi_coin` logs none of these (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionError {
    pub at: DateTime<Utc>,
    pub signal_ref: String,
    pub coin_key: CoinKey,
    pub entry_price: rust_decimal::Decimal,
    pub ath_price: rust_decimal::Decimal,
    pub days_to_ath: f64,
    pub predicted_roi: f64,
    pub actual_roi: f64,
    pub error: f64,
    pub error_pct: f64,
    pub outcome_category: OutcomeCategory,
}

impl PredictionError {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        at: DateTime<Utc>,
        signal_ref: String,
        coin_key: CoinKey,
        entry_price: rust_decimal::Decimal,
        ath_price: rust_decimal::Decimal,
        days_to_ath: f64,
        predicted_roi: f64,
        actual_roi: f64,
    ) -> Self {
        let error = actual_roi - predicted_roi;
        let error_pct = if predicted_roi.abs() > f64::EPSILON {
            error / predicted_roi
        } else {
            0.0
        };
        Self {
            at,
            signal_ref,
            coin_key,
            entry_price,
            ath_price,
            days_to_ath,
            predicted_roi,
            actual_roi,
            error,
            error_pct,
            outcome_category: OutcomeCategory::classify(actual_roi),
        }
    }
}

/// Welford running accumulator for mean and (population) variance of ROI
/// observations, plus the auxiliary counters the composite score and error
/// ledger need. Every `record` call is O(1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoiAccumulator {
    pub count: u64,
    pub mean: f64,
    m2: f64,
    pub best: f64,
    pub worst: f64,
    pub winners: u64,
    pub losers: u64,
    pub neutrals: u64,
    pub sum_days_to_ath: f64,
    /// Unbounded, append-only raw `ath_mul` history backing `median_roi`
    /// (§3/§9: the visible record is never truncated; only the physical
    /// representation may eventually be paged).
    pub roi_history: Vec<f64>,

    // MAE/MSE accumulators over prediction errors (not over raw ROI).
    pub total_predictions: u64,
    pub correct_within_10pct: u64,
    pub overestimations: u64,
    pub underestimations: u64,
    pub sum_abs_error: f64,
    pub sum_sq_error: f64,
}

impl RoiAccumulator {
    /// Record one terminal `ath_mul` observation (already safety-clamped to
    /// `[0.01, 100.0]` by the caller per §4.4).
    pub fn record_roi(&mut self, ath_mul: f64, days_to_ath: f64) {
        if self.count == 0 {
            self.best = ath_mul;
            self.worst = ath_mul;
        } else {
            self.best = self.best.max(ath_mul);
            self.worst = self.worst.min(ath_mul);
        }

        self.count += 1;
        let delta = ath_mul - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = ath_mul - self.mean;
        self.m2 += delta * delta2;

        self.sum_days_to_ath += days_to_ath;
        self.roi_history.push(ath_mul);

        if ath_mul >= 2.0 {
            self.winners += 1;
        } else if ath_mul < 1.0 {
            self.losers += 1;
        } else {
            self.neutrals += 1;
        }
    }

    /// Record one prediction-error observation (skipped for TD
    /// initializers, §4.4).
    pub fn record_prediction_error(&mut self, err: &PredictionError) {
        self.total_predictions += 1;
        if err.error_pct.abs() <= 0.10 {
            self.correct_within_10pct += 1;
        }
        if err.error > 0.0 {
            self.underestimations += 1;
        } else if err.error < 0.0 {
            self.overestimations += 1;
        }
        self.sum_abs_error += err.error.abs();
        self.sum_sq_error += err.error * err.error;
    }

    pub fn mean_roi(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Population standard deviation (sample size *is* the full population
    /// of terminal signals observed so far).
    pub fn stddev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }

    /// `sharpe = (mean_roi - 1) / stddev`, `0` when `stddev = 0` (§4.4).
    pub fn sharpe(&self) -> f64 {
        let sd = self.stddev();
        if sd <= f64::EPSILON {
            0.0
        } else {
            (self.mean_roi() - 1.0) / sd
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.winners as f64 / self.count as f64
        }
    }

    pub fn mean_days_to_ath(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_days_to_ath / self.count as f64
        }
    }

    /// Median of every raw `ath_mul` observation (§3 `median_roi`).
    pub fn median_roi(&self) -> f64 {
        if self.roi_history.is_empty() {
            return 0.0;
        }
        let mut sorted = self.roi_history.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    /// `speed_score ∈ [0,100]` (§3/§4.4): the same speed normalization the
    /// composite score uses, scaled to a human-facing 0-100 range.
    pub fn speed_score(&self) -> f64 {
        (1.0 - self.mean_days_to_ath() / 30.0).clamp(0.0, 1.0) * 100.0
    }

    pub fn best_roi(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.best
        }
    }

    pub fn worst_roi(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.worst
        }
    }

    pub fn mae(&self) -> f64 {
        if self.total_predictions == 0 {
            0.0
        } else {
            self.sum_abs_error / self.total_predictions as f64
        }
    }

    pub fn mse(&self) -> f64 {
        if self.total_predictions == 0 {
            0.0
        } else {
            self.sum_sq_error / self.total_predictions as f64
        }
    }
}

/// Per-market-tier win/loss breakdown (§3 `tier_breakdown`). Market-tier
/// classification itself is an external collaborator (§1); this struct only
/// carries whatever tier label the caller supplies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierStats {
    pub total: u64,
    pub winners: u64,
    pub mean_roi: f64,
}

pub fn record_tier(
    breakdown: &mut std::collections::HashMap<String, TierStats>,
    tier: &str,
    ath_mul: f64,
) {
    let entry = breakdown.entry(tier.to_string()).or_default();
    let prior_total = entry.total as f64;
    entry.total += 1;
    entry.mean_roi = (entry.mean_roi * prior_total + ath_mul) / entry.total as f64;
    if ath_mul >= 2.0 {
        entry.winners += 1;
    }
}

/// A reference used only for doc purposes: reputation entities never hold
/// an actual `ChannelId`/`CoinKey` alias cycle back to `Signal` (§9 note on
/// breaking the cyclic Signal/ChannelReputation reference).
pub type ChannelRef = ChannelId;
