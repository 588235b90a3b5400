//! Outcome Engine (§4.3): owns every in-progress signal, arms and realizes
//! its six checkpoints, polls for ATH/termination every two hours, and
//! emits exactly one [`OutcomeEvent`] per signal on termination.

pub mod scheduler;
pub mod termination;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::SharedClock;
use crate::error::PricingError;
use crate::extraction::TokenMention;
use crate::pricing::PricingFabric;
use crate::types::{
    signal_id, ChainId, CheckpointLabel, EntrySourceTag, OutcomeCategory, SignalFlag, SignalId,
    SignalStatus, TerminationReason,
};
use scheduler::CheckpointScheduler;
use termination::{evaluate, TerminationDecision, TerminationInputs};

/// One realized (or missing) checkpoint observation (§3 `Checkpoint`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub label: CheckpointLabel,
    pub due_at: DateTime<Utc>,
    pub realized_at: Option<DateTime<Utc>>,
    pub price: Option<Decimal>,
    pub missing: bool,
    pub attempts: u32,
}

impl Checkpoint {
    fn pending(label: CheckpointLabel, due_at: DateTime<Utc>) -> Self {
        Self {
            label,
            due_at,
            realized_at: None,
            price: None,
            missing: false,
            attempts: 0,
        }
    }

    /// `roi_multiplier = price / entry_price` (§3), `None` until realized.
    pub fn roi_multiplier(&self, entry_price: Decimal) -> Option<Decimal> {
        self.price.map(|p| p / entry_price)
    }
}

/// A tracked coin mention, owned exclusively by the Outcome Engine from
/// registration to termination (§3 `Signal`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub channel_id: String,
    pub message_id: i64,
    pub coin_key: String,
    pub chain: ChainId,
    pub created_at: DateTime<Utc>,
    pub entry_price: Decimal,
    pub entry_confidence: f64,
    pub entry_source_tag: EntrySourceTag,
    pub predicted_roi: f64,
    pub checkpoints: HashMap<CheckpointLabel, Checkpoint>,
    pub ath_price: Decimal,
    pub ath_at: DateTime<Utc>,
    pub status: SignalStatus,
    pub terminated_at: Option<DateTime<Utc>>,
    pub terminated_reason: Option<TerminationReason>,
    pub flags: Vec<SignalFlag>,
    pub window_extended: bool,
    /// Last three ROI readings from periodic polls, most recent last, used
    /// by termination rule 4's trend check.
    pub recent_roi_trend: Vec<f64>,
    pub zero_volume_since: Option<DateTime<Utc>>,
    pub suspicious: bool,
    /// The most recently observed price, from either a realized checkpoint
    /// or a periodic ATH poll — whichever happened last. This, not an
    /// arbitrary realized checkpoint, is what the drawdown termination rule
    /// evaluates against (§4.3).
    pub last_observed_price: Option<Decimal>,
}

impl Signal {
    fn new_in_progress(
        id: SignalId,
        channel_id: String,
        message_id: i64,
        coin_key: String,
        chain: ChainId,
        created_at: DateTime<Utc>,
        entry_price: Decimal,
        entry_confidence: f64,
        entry_source_tag: EntrySourceTag,
        predicted_roi: f64,
        flags: Vec<SignalFlag>,
    ) -> Self {
        let checkpoints = CheckpointLabel::ALL
            .into_iter()
            .map(|label| {
                let due_at = created_at + chrono::Duration::seconds(label.offset_secs());
                (label, Checkpoint::pending(label, due_at))
            })
            .collect();

        Self {
            id,
            channel_id,
            message_id,
            coin_key,
            chain,
            created_at,
            entry_price,
            entry_confidence,
            entry_source_tag,
            predicted_roi,
            checkpoints,
            ath_price: entry_price,
            ath_at: created_at,
            status: SignalStatus::InProgress,
            terminated_at: None,
            terminated_reason: None,
            flags,
            window_extended: false,
            recent_roi_trend: Vec::new(),
            zero_volume_since: None,
            suspicious: false,
            last_observed_price: None,
        }
    }

    fn data_unavailable(
        id: SignalId,
        channel_id: String,
        message_id: i64,
        coin_key: String,
        chain: ChainId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            channel_id,
            message_id,
            coin_key,
            chain,
            created_at,
            entry_price: Decimal::ZERO,
            entry_confidence: 0.0,
            entry_source_tag: EntrySourceTag::CurrentPriceFallback,
            predicted_roi: 0.0,
            checkpoints: HashMap::new(),
            ath_price: Decimal::ZERO,
            ath_at: created_at,
            status: SignalStatus::DataUnavailable,
            terminated_at: None,
            terminated_reason: None,
            flags: Vec::new(),
            window_extended: false,
            recent_roi_trend: Vec::new(),
            zero_volume_since: None,
            suspicious: false,
            last_observed_price: None,
        }
    }

    fn ath_mul(&self) -> f64 {
        if self.entry_price.is_zero() {
            0.0
        } else {
            (self.ath_price / self.entry_price)
                .to_string()
                .parse::<f64>()
                .unwrap_or(0.0)
        }
    }

    fn days_to_ath(&self) -> f64 {
        (self.ath_at - self.created_at).num_seconds() as f64 / 86_400.0
    }

    /// The earliest checkpoint label not yet realized and not yet marked
    /// missing, i.e. the one blocking the realization-order invariant.
    fn next_unrealized_label(&self) -> Option<CheckpointLabel> {
        CheckpointLabel::ALL
            .into_iter()
            .find(|label| {
                let cp = &self.checkpoints[label];
                cp.realized_at.is_none() && !cp.missing
            })
    }
}

/// Emitted exactly once per terminal signal (§3, §4.3), consumed by the
/// Reputation Engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub signal_ref: SignalId,
    pub channel_id: String,
    pub coin_key: String,
    pub entry_price: Decimal,
    pub ath_price: Decimal,
    pub ath_mul: f64,
    pub days_to_ath: f64,
    pub predicted_roi: f64,
    pub category: OutcomeCategory,
    pub reason: TerminationReason,
    pub suspicious: bool,
}

/// Owns the in-progress signal map, schedules and realizes checkpoints, and
/// runs the periodic ATH/termination poll. Registration computes
/// `predicted_roi` from a caller-supplied closure so the TD blend in
/// `reputation` stays decoupled from this module.
pub struct OutcomeEngine {
    pricing: Arc<PricingFabric>,
    scheduler: CheckpointScheduler,
    signals: RwLock<HashMap<SignalId, Signal>>,
    clock: SharedClock,
    retry_attempts_per_checkpoint: u32,
    drawdown_termination_pct: f64,
    tracking_window_days: i64,
    extended_window_days: i64,
    zero_volume_hours: i64,
}

impl OutcomeEngine {
    pub fn new(
        pricing: Arc<PricingFabric>,
        clock: SharedClock,
        retry_attempts_per_checkpoint: u32,
        drawdown_termination_pct: f64,
        tracking_window_days: i64,
        extended_window_days: i64,
        zero_volume_hours: i64,
    ) -> Self {
        Self {
            pricing,
            scheduler: CheckpointScheduler::new(),
            signals: RwLock::new(HashMap::new()),
            clock,
            retry_attempts_per_checkpoint,
            drawdown_termination_pct,
            tracking_window_days,
            extended_window_days,
            zero_volume_hours,
        }
    }

    /// Register a new signal candidate (§4.3 `register`). `predicted_roi`
    /// is computed by the caller (the Reputation Engine's TD blend) before
    /// this is invoked, since the Outcome Engine doesn't own reputation
    /// state.
    pub async fn register(
        &self,
        channel_id: String,
        message_id: i64,
        message_ts: DateTime<Utc>,
        mention: &TokenMention,
        predicted_roi: f64,
    ) -> Signal {
        let coin_key = mention.coin_key();
        let id = signal_id(message_id, &channel_id, &coin_key);

        match self.pricing.resolve_entry(mention, message_ts).await {
            Ok(resolution) => {
                let signal = Signal::new_in_progress(
                    id.clone(),
                    channel_id,
                    message_id,
                    coin_key,
                    mention.chain,
                    message_ts,
                    resolution.price,
                    resolution.confidence,
                    resolution.source_tag,
                    predicted_roi,
                    resolution.flags,
                );
                self.scheduler.arm_all(&id, message_ts);
                self.signals.write().insert(id.clone(), signal.clone());
                info!(signal_id = %id, "signal registered");
                signal
            }
            Err(PricingError::AllSourcesUnavailable { .. }) | Err(PricingError::RateLimited) => {
                let signal =
                    Signal::data_unavailable(id.clone(), channel_id, message_id, coin_key, mention.chain, message_ts);
                self.signals.write().insert(id.clone(), signal.clone());
                warn!(signal_id = %id, "entry price unavailable, signal recorded data_unavailable");
                signal
            }
        }
    }

    /// Drain and realize every due checkpoint (§4.3). Returns the
    /// `OutcomeEvent`s produced by any terminations triggered along the way.
    pub async fn realize_due_checkpoints(&self) -> Vec<OutcomeEvent> {
        let now = self.clock.now();
        let due = self.scheduler.drain_due(now);
        let mut events = Vec::new();

        for (signal_id, label) in due {
            if let Some(event) = self.realize_one(&signal_id, label, now).await {
                events.push(event);
            }
        }

        events
    }

    async fn realize_one(&self, signal_id: &SignalId, label: CheckpointLabel, now: DateTime<Utc>) -> Option<OutcomeEvent> {
        let (coin_key, chain, status) = {
            let signals = self.signals.read();
            let signal = signals.get(signal_id)?;
            (signal.coin_key.clone(), signal.chain, signal.status)
        };

        if status != SignalStatus::InProgress {
            return None;
        }

        // Ordering invariant: a later label cannot realize before an
        // earlier unrealized one. Re-arm this label and let the earlier
        // one's own due tick drain first.
        {
            let signals = self.signals.read();
            let signal = signals.get(signal_id)?;
            if let Some(blocking) = signal.next_unrealized_label() {
                if blocking != label {
                    drop(signals);
                    self.scheduler.re_arm_for_retry(signal_id.clone(), label, now);
                    return None;
                }
            }
        }

        match self.pricing.get_current(&coin_key, chain).await {
            Ok(quote) => {
                let mut signals = self.signals.write();
                let signal = signals.get_mut(signal_id)?;
                let cp = signal.checkpoints.get_mut(&label)?;
                cp.realized_at = Some(now);
                cp.price = Some(quote.price_usd);
                if quote.price_usd > signal.ath_price {
                    signal.ath_price = quote.price_usd;
                    signal.ath_at = now;
                }
                signal.last_observed_price = Some(quote.price_usd);
                info!(signal_id = %signal_id, label = %label, "checkpoint realized");
                drop(signals);
                self.evaluate_termination(signal_id, now).await
            }
            Err(e) => {
                let mut signals = self.signals.write();
                let signal = signals.get_mut(signal_id)?;
                let cp = signal.checkpoints.get_mut(&label)?;
                cp.attempts += 1;
                if cp.attempts >= self.retry_attempts_per_checkpoint {
                    cp.missing = true;
                    cp.realized_at = Some(now);
                    warn!(signal_id = %signal_id, label = %label, error = %e, "checkpoint missing after retries");
                } else {
                    drop(signals);
                    self.scheduler.re_arm_for_retry(signal_id.clone(), label, now);
                }
                None
            }
        }
    }

    /// Poll every in-progress signal's current price to update ATH and
    /// evaluate termination, without realizing a checkpoint (§4.3, the
    /// 2-hourly poll). Uses the collect-then-apply pattern: reads are taken
    /// under a read lock, terminations are applied after releasing it.
    pub async fn poll_ath_and_termination(&self) -> Vec<OutcomeEvent> {
        let now = self.clock.now();
        let candidates: Vec<(SignalId, String, ChainId)> = {
            let signals = self.signals.read();
            signals
                .values()
                .filter(|s| s.status == SignalStatus::InProgress)
                .map(|s| (s.id.clone(), s.coin_key.clone(), s.chain))
                .collect()
        };

        let mut events = Vec::new();
        for (signal_id, coin_key, chain) in candidates {
            match self.pricing.get_current(&coin_key, chain).await {
                Ok(quote) => {
                    let mut signals = self.signals.write();
                    if let Some(signal) = signals.get_mut(&signal_id) {
                        if quote.price_usd > signal.ath_price {
                            signal.ath_price = quote.price_usd;
                            signal.ath_at = now;
                        }
                        signal.last_observed_price = Some(quote.price_usd);
                        let roi = signal.ath_mul();
                        signal.recent_roi_trend.push(roi);
                        if signal.recent_roi_trend.len() > 3 {
                            let drop_n = signal.recent_roi_trend.len() - 3;
                            signal.recent_roi_trend.drain(0..drop_n);
                        }
                    }
                    drop(signals);
                    if let Some(event) = self.evaluate_termination(&signal_id, now).await {
                        events.push(event);
                    }
                }
                Err(e) => {
                    warn!(signal_id = %signal_id, error = %e, "ath poll failed, will retry next cycle");
                }
            }
        }

        events
    }

    /// Mark zero reported volume starting now if not already marked, or
    /// clear the marker if volume resumed. Checked only on periodic polls
    /// per §4.3.
    pub fn record_volume_observation(&self, signal_id: &SignalId, volume_is_zero: bool, now: DateTime<Utc>) {
        let mut signals = self.signals.write();
        if let Some(signal) = signals.get_mut(signal_id) {
            if volume_is_zero {
                signal.zero_volume_since.get_or_insert(now);
            } else {
                signal.zero_volume_since = None;
            }
        }
    }

    async fn evaluate_termination(&self, signal_id: &SignalId, now: DateTime<Utc>) -> Option<OutcomeEvent> {
        let inputs = {
            let signals = self.signals.read();
            let signal = signals.get(signal_id)?;
            if signal.status != SignalStatus::InProgress {
                return None;
            }

            let roi_trend_positive = signal.recent_roi_trend.len() >= 3
                && signal.recent_roi_trend.windows(2).all(|w| w[1] > w[0]);

            TerminationInputs {
                created_at: signal.created_at,
                now,
                ath_price: signal.ath_price,
                current_price: signal.last_observed_price,
                tracking_window_days: self.tracking_window_days,
                extended_window_days: self.extended_window_days,
                window_already_extended: signal.window_extended,
                drawdown_termination_pct: self.drawdown_termination_pct,
                roi_trend_positive,
                zero_volume_since: signal.zero_volume_since,
                zero_volume_hours: self.zero_volume_hours,
            }
        };

        match evaluate(&inputs) {
            TerminationDecision::Continue => None,
            TerminationDecision::ExtendWindow => {
                let mut signals = self.signals.write();
                if let Some(signal) = signals.get_mut(signal_id) {
                    signal.window_extended = true;
                    info!(signal_id = %signal_id, "tracking window extended to 90 days");
                }
                None
            }
            TerminationDecision::Terminate(reason) => {
                let mut signals = self.signals.write();
                let signal = signals.get_mut(signal_id)?;
                let status = match reason {
                    TerminationReason::WindowElapsed => SignalStatus::CompletedLive,
                    TerminationReason::Drawdown90Pct => SignalStatus::Dead,
                    TerminationReason::ZeroVolume => SignalStatus::Inactive,
                    TerminationReason::HistoricalReplay => SignalStatus::CompletedHistorical,
                };
                signal.status = status;
                signal.terminated_at = Some(now);
                signal.terminated_reason = Some(reason);

                let ath_mul = signal.ath_mul();
                let days_to_ath = signal.days_to_ath();
                let event = OutcomeEvent {
                    signal_ref: signal.id.clone(),
                    channel_id: signal.channel_id.clone(),
                    coin_key: signal.coin_key.clone(),
                    entry_price: signal.entry_price,
                    ath_price: signal.ath_price,
                    ath_mul,
                    days_to_ath,
                    predicted_roi: signal.predicted_roi,
                    category: OutcomeCategory::classify(ath_mul),
                    reason,
                    suspicious: signal.suspicious,
                };
                info!(signal_id = %signal_id, reason = %reason, ath_mul, "signal terminated");
                Some(event)
            }
        }
    }

    /// Insert an already-terminal signal synthesized by the Historical
    /// Bootstrap Orchestrator (§4.5). No checkpoints are armed: a historical
    /// signal's six checkpoints are already realized or marked missing at
    /// construction time.
    pub fn insert_historical(&self, signal: Signal) {
        let id = signal.id.clone();
        self.signals.write().insert(id, signal);
    }

    pub fn get(&self, signal_id: &SignalId) -> Option<Signal> {
        self.signals.read().get(signal_id).cloned()
    }

    pub fn all(&self) -> Vec<Signal> {
        self.signals.read().values().cloned().collect()
    }

    pub fn restore(&self, signals: Vec<Signal>) {
        let mut map = self.signals.write();
        for signal in signals {
            if signal.status == SignalStatus::InProgress {
                for cp in signal.checkpoints.values() {
                    if cp.realized_at.is_none() && !cp.missing {
                        self.scheduler.arm(signal.id.clone(), cp.label, cp.due_at);
                    }
                }
            }
            map.insert(signal.id.clone(), signal);
        }
    }

    pub fn scheduler_len(&self) -> usize {
        self.scheduler.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::error::ProviderError;
    use crate::pricing::provider::{Candle, Capability, PriceProvider, PriceQuote, RateBudget};
    use crate::types::{Granularity, PriceSource};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Arc as StdArc;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    struct ScriptedProvider {
        prices: Mutex<StdHashMap<String, Decimal>>,
    }

    #[async_trait]
    impl PriceProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn source_tag(&self) -> PriceSource {
            PriceSource::PrimaryDex
        }
        fn capability_set(&self) -> &[Capability] {
            &[Capability::Spot, Capability::At, Capability::Ohlc]
        }
        fn rate_budget(&self) -> RateBudget {
            RateBudget { capacity: 1000, refill_per_sec: 1000.0 }
        }
        async fn fetch_spot(&self, coin_key: &str, _chain: ChainId) -> Result<PriceQuote, ProviderError> {
            let price = *self.prices.lock().get(coin_key).unwrap_or(&dec!(1.0));
            Ok(PriceQuote {
                price_usd: price,
                source: PriceSource::PrimaryDex,
                as_of: t(0),
                market_cap_usd: None,
                volume_24h_usd: None,
                liquidity_usd: None,
                price_change_24h_pct: None,
                confidence: dec!(0.9),
            })
        }
        async fn fetch_at(&self, coin_key: &str, chain: ChainId, _ts: DateTime<Utc>) -> Result<PriceQuote, ProviderError> {
            self.fetch_spot(coin_key, chain).await
        }
        async fn fetch_ohlc(
            &self,
            _coin_key: &str,
            _chain: ChainId,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
            _granularity: Granularity,
        ) -> Result<Vec<Candle>, ProviderError> {
            Ok(Vec::new())
        }
    }

    fn fabric(price: Decimal) -> StdArc<PricingFabric> {
        let mut prices = StdHashMap::new();
        prices.insert("ABC".to_string(), price);
        let provider: StdArc<dyn PriceProvider> = StdArc::new(ScriptedProvider { prices: Mutex::new(prices) });
        let mut providers_by_chain = StdHashMap::new();
        providers_by_chain.insert(ChainId::Ethereum, vec![provider]);
        StdArc::new(PricingFabric::new(
            providers_by_chain,
            100,
            std::time::Duration::from_secs(7200),
            1000,
            std::time::Duration::from_secs(5),
        ))
    }

    fn mention() -> TokenMention {
        TokenMention {
            symbol: Some("ABC".to_string()),
            address: None,
            chain: ChainId::Ethereum,
            text_price: Some(dec!(1.0)),
            price_out_of_range: false,
        }
    }

    #[tokio::test]
    async fn register_arms_six_checkpoints_and_sets_entry_as_ath() {
        let clock = StdArc::new(TestClock::new(t(0)));
        let engine = OutcomeEngine::new(fabric(dec!(1.0)), clock, 3, 0.10, 30, 90, 48);
        let signal = engine.register("chan".to_string(), 1, t(0), &mention(), 1.5).await;
        assert_eq!(signal.status, SignalStatus::InProgress);
        assert_eq!(signal.checkpoints.len(), 6);
        assert_eq!(signal.ath_price, signal.entry_price);
        assert_eq!(engine.scheduler_len(), 6);
    }

    #[tokio::test]
    async fn drawdown_poll_terminates_dead() {
        // drawdown_termination_pct = 0.90 is the spec default: a signal
        // dies once current/ATH falls to 0.10 (a 90% loss), not at a 10%
        // loss.
        let clock = StdArc::new(TestClock::new(t(0)));
        let engine = OutcomeEngine::new(fabric(dec!(1.0)), clock.clone(), 3, 0.90, 30, 90, 48);
        let signal = engine.register("chan".to_string(), 1, t(0), &mention(), 1.5).await;

        {
            let mut signals = engine.signals.write();
            signals.get_mut(&signal.id).unwrap().ath_price = dec!(10.0);
        }

        // Provider reports current price 1.0: ratio = 1.0 / 10.0 = 0.10, at
        // the threshold.
        let events = engine.poll_ath_and_termination().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, TerminationReason::Drawdown90Pct);
        let stored = engine.get(&signal.id).unwrap();
        assert_eq!(stored.status, SignalStatus::Dead);
    }

    #[tokio::test]
    async fn healthy_drawdown_at_90pct_threshold_does_not_terminate() {
        // A 10% loss from ATH (ratio 0.90) must not trip the 90%-loss rule.
        let clock = StdArc::new(TestClock::new(t(0)));
        let engine = OutcomeEngine::new(fabric(dec!(0.90)), clock.clone(), 3, 0.90, 30, 90, 48);
        let signal = engine.register("chan".to_string(), 1, t(0), &mention(), 1.5).await;

        {
            let mut signals = engine.signals.write();
            signals.get_mut(&signal.id).unwrap().ath_price = dec!(1.0);
        }

        let events = engine.poll_ath_and_termination().await;
        assert!(events.is_empty());
        let stored = engine.get(&signal.id).unwrap();
        assert_eq!(stored.status, SignalStatus::InProgress);
    }

    #[tokio::test]
    async fn poll_drawdown_uses_latest_polled_price_not_arbitrary_checkpoint() {
        // A stale/unrelated realized checkpoint price must not leak into
        // the drawdown decision — only the most recently observed price
        // (from this poll) may.
        let clock = StdArc::new(TestClock::new(t(0)));
        let engine = OutcomeEngine::new(fabric(dec!(0.95)), clock.clone(), 3, 0.90, 30, 90, 48);
        let signal = engine.register("chan".to_string(), 1, t(0), &mention(), 1.5).await;

        {
            let mut signals = engine.signals.write();
            let stored = signals.get_mut(&signal.id).unwrap();
            stored.ath_price = dec!(1.0);
            // Simulate a long-realized checkpoint with a deep-drawdown
            // price that, if picked up by the termination evaluator
            // instead of the fresh poll quote, would wrongly terminate.
            stored.checkpoints.get_mut(&CheckpointLabel::H1).unwrap().price = Some(dec!(0.05));
            stored.checkpoints.get_mut(&CheckpointLabel::H1).unwrap().realized_at = Some(t(0));
        }

        let events = engine.poll_ath_and_termination().await;
        assert!(events.is_empty(), "0.95/1.0 ratio must not trigger drawdown termination");
        let stored = engine.get(&signal.id).unwrap();
        assert_eq!(stored.status, SignalStatus::InProgress);
        assert_eq!(stored.last_observed_price, Some(dec!(0.95)));
    }

    #[tokio::test]
    async fn data_unavailable_when_no_entry_price_resolvable() {
        let clock = StdArc::new(TestClock::new(t(0)));
        let engine = OutcomeEngine::new(
            StdArc::new(PricingFabric::new(StdHashMap::new(), 10, std::time::Duration::from_secs(1), 10, std::time::Duration::from_secs(1))),
            clock,
            3,
            0.10,
            30,
            90,
            48,
        );
        let mut m = mention();
        m.text_price = None;
        let signal = engine.register("chan".to_string(), 1, t(0), &m, 1.5).await;
        assert_eq!(signal.status, SignalStatus::DataUnavailable);
        assert_eq!(engine.scheduler_len(), 0);
    }

    #[tokio::test]
    async fn checkpoint_realization_respects_label_order() {
        let clock = StdArc::new(TestClock::new(t(0)));
        let engine = OutcomeEngine::new(fabric(dec!(1.0)), clock.clone(), 3, 0.10, 30, 90, 48);
        let signal = engine.register("chan".to_string(), 1, t(0), &mention(), 1.5).await;

        clock.advance(chrono::Duration::seconds(CheckpointLabel::H4.offset_secs()));
        engine.realize_due_checkpoints().await;

        let stored = engine.get(&signal.id).unwrap();
        assert!(stored.checkpoints[&CheckpointLabel::H1].realized_at.is_some());
        assert!(stored.checkpoints[&CheckpointLabel::H4].realized_at.is_some());
    }
}
