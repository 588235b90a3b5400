//! Keyword-matcher sentiment component (§4.1).

const POSITIVE: &[&str] = &[
    "moon", "bullish", "gem", "100x", "breakout", "accumulate", "undervalued", "send it", "lfg",
    "pump", "strong buy", "early",
];

const NEGATIVE: &[&str] = &[
    "rug", "scam", "dump", "bearish", "avoid", "honeypot", "exit liquidity", "dead", "ponzi",
    "sell now",
];

/// Sentiment score in `[0,1]`, with a conflicting-signal penalty when both
/// positive and negative keyword sets co-occur (up to 0.3 subtracted).
pub fn sentiment_component(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let pos_hits = POSITIVE.iter().filter(|kw| lower.contains(*kw)).count();
    let neg_hits = NEGATIVE.iter().filter(|kw| lower.contains(*kw)).count();

    if pos_hits == 0 && neg_hits == 0 {
        return 0.5;
    }

    let base = pos_hits as f64 / (pos_hits + neg_hits) as f64;

    let penalty = if pos_hits > 0 && neg_hits > 0 {
        0.3 * (neg_hits.min(pos_hits) as f64 / pos_hits.max(neg_hits) as f64).min(1.0)
    } else {
        0.0
    };

    (base - penalty).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_positive_scores_high() {
        assert!(sentiment_component("this is a gem, bullish breakout incoming") > 0.9);
    }

    #[test]
    fn pure_negative_scores_low() {
        assert!(sentiment_component("total rug, it's a scam, dump now") < 0.1);
    }

    #[test]
    fn neutral_text_scores_midpoint() {
        assert_eq!(sentiment_component("just checking the chart"), 0.5);
    }

    #[test]
    fn conflicting_signals_are_penalized() {
        let conflicted = sentiment_component("bullish gem but also kind of a rug, dyor");
        let pure_positive = sentiment_component("bullish gem, early accumulate");
        assert!(conflicted < pure_positive);
    }
}
