//! Termination rule evaluation (§4.3), pure functions over signal state so
//! they're trivially unit-testable without spinning up the full engine.

use chrono::{DateTime, Utc};

use crate::types::TerminationReason;

/// Everything the termination rules need to read from a signal, decoupled
/// from the `Signal` struct itself so these functions stay pure.
pub struct TerminationInputs {
    pub created_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
    pub ath_price: rust_decimal::Decimal,
    pub current_price: Option<rust_decimal::Decimal>,
    pub tracking_window_days: i64,
    pub extended_window_days: i64,
    pub window_already_extended: bool,
    pub drawdown_termination_pct: f64,
    /// Strictly positive ROI trend across the last 3 polls (rule 4).
    pub roi_trend_positive: bool,
    pub zero_volume_since: Option<DateTime<Utc>>,
    pub zero_volume_hours: i64,
}

/// Outcome of one termination evaluation pass: either the signal should
/// terminate now, or (one-shot) its tracking window should extend.
pub enum TerminationDecision {
    Continue,
    ExtendWindow,
    Terminate(TerminationReason),
}

/// Evaluate the four termination rules in §4.3, in spec order. Rule 4 (the
/// one-shot window extension) is checked before rule 1 fires permanently,
/// since an extension defers rule 1 rather than replacing it.
pub fn evaluate(inputs: &TerminationInputs) -> TerminationDecision {
    let age = inputs.now - inputs.created_at;
    let window_days = if inputs.window_already_extended {
        inputs.extended_window_days
    } else {
        inputs.tracking_window_days
    };

    let window_elapsed = age >= chrono::Duration::days(window_days);

    if window_elapsed {
        if !inputs.window_already_extended && inputs.roi_trend_positive {
            return TerminationDecision::ExtendWindow;
        }
        return TerminationDecision::Terminate(TerminationReason::WindowElapsed);
    }

    if let Some(current) = inputs.current_price {
        if inputs.ath_price > rust_decimal::Decimal::ZERO {
            let ratio = current / inputs.ath_price;
            // `drawdown_termination_pct` is the *loss* fraction from ATH
            // (0.90 = a 90% loss), so the surviving-ratio threshold is its
            // complement (§4.3 rule 2 / S2: dead when ratio <= 0.10).
            let threshold = rust_decimal::Decimal::ONE
                - rust_decimal::Decimal::try_from(inputs.drawdown_termination_pct).unwrap_or_default();
            if ratio <= threshold {
                return TerminationDecision::Terminate(TerminationReason::Drawdown90Pct);
            }
        }
    }

    if let Some(since) = inputs.zero_volume_since {
        let hours_zero = (inputs.now - since).num_hours();
        if hours_zero >= inputs.zero_volume_hours {
            return TerminationDecision::Terminate(TerminationReason::ZeroVolume);
        }
    }

    TerminationDecision::Continue
}
