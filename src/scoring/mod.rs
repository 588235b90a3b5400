//! Signal Scorer (§4.1): blends engagement (HDRB), sentiment, and address
//! presence into a holistic `confidence ∈ [0,1]`.

pub mod keywords;

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;

use crate::message::Engagement;
use crate::types::ChannelId;

/// How many recent raw engagement scores are kept per channel to compute
/// the rolling `cohort_max` (§4.1).
const COHORT_WINDOW: usize = 100;

/// Tracks each channel's rolling engagement cohort and turns a message's
/// engagement + text into the final holistic confidence score.
pub struct SignalScorer {
    cohorts: RwLock<HashMap<ChannelId, VecDeque<f64>>>,
}

impl SignalScorer {
    pub fn new() -> Self {
        Self {
            cohorts: RwLock::new(HashMap::new()),
        }
    }

    fn raw_engagement(engagement: &Engagement) -> f64 {
        engagement.forwards as f64 + 2.0 * engagement.reactions as f64 + 0.5 * engagement.replies as f64
    }

    /// Record this message's raw engagement into the channel's cohort and
    /// return the normalized `engagement_component ∈ [0,1]`.
    fn engagement_component(&self, channel_id: &str, engagement: &Engagement) -> f64 {
        let raw = Self::raw_engagement(engagement);

        let mut cohorts = self.cohorts.write();
        let window = cohorts.entry(channel_id.to_string()).or_default();

        let cohort_max = window.iter().cloned().fold(1.0_f64, f64::max);
        let component = (raw / cohort_max).min(1.0);

        window.push_back(raw);
        while window.len() > COHORT_WINDOW {
            window.pop_front();
        }

        component
    }

    /// Compute the final holistic confidence for a mention (§4.1).
    pub fn score(
        &self,
        channel_id: &str,
        engagement: &Engagement,
        text: &str,
        has_address: bool,
    ) -> f64 {
        let engagement_component = self.engagement_component(channel_id, engagement);
        let sentiment_component = keywords::sentiment_component(text);
        let address_bonus = if has_address { 1.0 } else { 0.0 };

        (0.4 * engagement_component + 0.3 * sentiment_component + 0.3 * address_bonus)
            .clamp(0.0, 1.0)
    }
}

impl Default for SignalScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_message_in_a_channel_saturates_engagement() {
        let scorer = SignalScorer::new();
        let engagement = Engagement {
            forwards: 10,
            reactions: 5,
            replies: 2,
        };
        // cohort_max starts at 1 (floor), so the first observation always
        // normalizes to the full 1.0 engagement component.
        let score = scorer.score("c1", &engagement, "neutral text", false);
        assert!(score > 0.0);
    }

    #[test]
    fn address_presence_adds_bonus() {
        let scorer = SignalScorer::new();
        let engagement = Engagement::default();
        let without = scorer.score("c1", &engagement, "neutral", false);
        let with = scorer.score("c2", &engagement, "neutral", true);
        assert!(with > without);
    }

    #[test]
    fn confidence_is_always_bounded() {
        let scorer = SignalScorer::new();
        let engagement = Engagement {
            forwards: 1_000_000,
            reactions: 1_000_000,
            replies: 1_000_000,
        };
        let score = scorer.score("c1", &engagement, "moon gem bullish", true);
        assert!((0.0..=1.0).contains(&score));
    }
}
