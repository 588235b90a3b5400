//! Three-level temporal-difference ROI estimator (§4.4).
//!
//! `TdEstimate` is the scalar `V` from the spec's TD update:
//! `V ← V + α · (R − V)`, `R` always the terminal `ath_mul`, never a
//! running price. Each of the three levels (overall, coin, cross-channel)
//! wraps one of these.

use serde::{Deserialize, Serialize};

/// A single TD-learned scalar estimate with an observation count so callers
/// can distinguish "never observed" (fallback to a neutral prior) from
/// "observed and converged toward zero".
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TdEstimate {
    pub value: f64,
    pub observations: u64,
}

impl TdEstimate {
    pub fn new(initial: f64) -> Self {
        Self {
            value: initial,
            observations: 0,
        }
    }

    pub fn has_observations(&self) -> bool {
        self.observations > 0
    }

    /// Apply one TD step: `V ← V + α · (R − V)`. Returns the *pre-update*
    /// value, which is what gets recorded as `predicted_roi` on the
    /// resulting `PredictionError` (§4.4).
    pub fn td_step(&mut self, observed: f64, alpha: f64) -> f64 {
        let pre = self.value;
        self.value += alpha * (observed - pre);
        self.observations += 1;
        pre
    }

    /// Initialize (not TD-step) this estimate to the first observed value,
    /// per the coin-level initializer rule in §4.4: no TD step, no error
    /// recorded.
    pub fn initialize(&mut self, observed: f64) {
        self.value = observed;
        self.observations = 1;
    }
}

/// Clamp a raw `ath_mul` observation into `[0.01, 100.0]` before any TD step
/// (§4.4 safety clamp — a single manipulated quote must not destabilize the
/// estimate).
pub fn clamp_ath_mul(ath_mul: f64) -> f64 {
    ath_mul.clamp(0.01, 100.0)
}

/// Blend weights for the registration-time prediction (§4.4 `td_weights`).
#[derive(Debug, Clone, Copy)]
pub struct BlendWeights {
    pub overall: f64,
    pub coin: f64,
    pub cross: f64,
}

/// Weighted blend of the three TD levels at registration time, with the
/// fallback/redistribution rules from §4.4:
/// - no coin observations yet → redistribute the coin weight pro-rata
///   between overall and cross;
/// - cross also empty → `predicted = overall`;
/// - channel has never seen a terminal signal → neutral prior `1.50`.
pub fn predict_roi(
    overall: &TdEstimate,
    coin: Option<&TdEstimate>,
    cross: Option<&TdEstimate>,
    weights: BlendWeights,
) -> f64 {
    if !overall.has_observations() {
        return 1.50;
    }

    let coin_has_obs = coin.map(|c| c.has_observations()).unwrap_or(false);
    let cross_has_obs = cross.map(|c| c.has_observations()).unwrap_or(false);

    if coin_has_obs {
        let coin_v = coin.unwrap().value;
        let cross_v = if cross_has_obs { cross.unwrap().value } else { 0.0 };
        let cross_w = if cross_has_obs { weights.cross } else { 0.0 };
        if cross_has_obs {
            weights.overall * overall.value + weights.coin * coin_v + cross_w * cross_v
        } else {
            // Cross empty: redistribute its weight pro-rata to overall/coin.
            let total = weights.overall + weights.coin;
            let overall_share = weights.overall + weights.cross * (weights.overall / total);
            let coin_share = weights.coin + weights.cross * (weights.coin / total);
            overall_share * overall.value + coin_share * coin_v
        }
    } else if cross_has_obs {
        // Coin empty: redistribute coin's weight pro-rata to overall/cross.
        let cross_v = cross.unwrap().value;
        let total = weights.overall + weights.cross;
        let overall_share = weights.overall + weights.coin * (weights.overall / total);
        let cross_share = weights.cross + weights.coin * (weights.cross / total);
        overall_share * overall.value + cross_share * cross_v
    } else {
        // Both coin and cross empty: predicted = overall.
        overall.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn td_step_moves_toward_observation() {
        let mut v = TdEstimate::new(1.5);
        let pre = v.td_step(3.0, 0.1);
        assert!((pre - 1.5).abs() < 1e-9);
        assert!((v.value - 1.65).abs() < 1e-9);
    }

    #[test]
    fn scenario_s3_two_signal_sequence() {
        let mut overall = TdEstimate::new(1.5);
        let pre1 = overall.td_step(3.0, 0.1);
        assert!((pre1 - 1.5).abs() < 1e-9);
        assert!((overall.value - 1.65).abs() < 1e-9);

        let pre2 = overall.td_step(1.0, 0.1);
        assert!((pre2 - 1.65).abs() < 1e-9);
        assert!((overall.value - 1.585).abs() < 1e-9);
        assert_eq!(overall.observations, 2);
    }

    #[test]
    fn no_terminal_signal_yet_uses_neutral_prior() {
        let overall = TdEstimate::new(1.5);
        let predicted = predict_roi(&overall, None, None, BlendWeights { overall: 0.4, coin: 0.5, cross: 0.1 });
        assert!((predicted - 1.50).abs() < 1e-9);
    }

    #[test]
    fn coin_empty_redistributes_to_overall_and_cross() {
        let mut overall = TdEstimate::new(1.5);
        overall.td_step(2.0, 0.1);
        let mut cross = TdEstimate::new(0.0);
        cross.initialize(2.5);

        let predicted = predict_roi(&overall, None, Some(&cross), BlendWeights { overall: 0.4, coin: 0.5, cross: 0.1 });
        // overall_share = 0.4 + 0.5*(0.4/0.5) = 0.8; cross_share = 0.1 + 0.5*(0.1/0.5) = 0.2
        let expected = 0.8 * overall.value + 0.2 * cross.value;
        assert!((predicted - expected).abs() < 1e-9);
    }
}
