//! Central orchestration struct (§6): owns every engine, wires terminal
//! events from the Outcome Engine into the Reputation Engine and the
//! Persistence Layer, and exposes the read views the REST/WS surface
//! serializes. Grounded in the teacher's `AppState` — one `Arc`-shared
//! struct the binary constructs once and every subsystem/handler borrows.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bootstrap::BootstrapOrchestrator;
use crate::clock::SharedClock;
use crate::config::RuntimeConfig;
use crate::extraction::extract_mentions;
use crate::message::{Message, MessageSource};
use crate::outcome::{OutcomeEngine, OutcomeEvent, Signal};
use crate::persistence::PersistenceLayer;
use crate::pricing::provider::{PriceProvider, RateBudget};
use crate::pricing::rate_limit::TokenBucket;
use crate::pricing::PricingFabric;
use crate::reputation::ReputationEngine;
use crate::scoring::SignalScorer;
use crate::reputation::ChannelReputation;
use crate::types::{ChainId, ChannelId, CoinKey, SignalStatus, Tier};

/// Flatten a `ChannelReputation` into its wire-facing view (§3/§6), pulling
/// `median_roi`/`best_roi`/`worst_roi`/`speed_score` off the accumulator so
/// they're actually surfaced, not just computable internally.
fn channel_summary(c: &ChannelReputation) -> ChannelSummary {
    ChannelSummary {
        channel_id: c.channel_id.clone(),
        tier: c.tier,
        composite_score: c.composite_score,
        insufficient_data: c.insufficient_data,
        total_terminal_signals: c.accumulator.count,
        mean_roi: c.accumulator.mean_roi(),
        median_roi: c.accumulator.median_roi(),
        best_roi: c.accumulator.best_roi(),
        worst_roi: c.accumulator.worst_roi(),
        win_rate: c.accumulator.win_rate(),
        sharpe: c.accumulator.sharpe(),
        roi_stddev: c.accumulator.stddev(),
        mean_days_to_ath: c.accumulator.mean_days_to_ath(),
        speed_score: c.accumulator.speed_score(),
        first_signal_at: c.first_signal_at,
        last_signal_at: c.last_signal_at,
    }
}

/// Below this holistic confidence (§4.1), a mention is logged and discarded
/// rather than registered as a tracked signal — the scorer's whole job is to
/// keep low-quality noise out of the Outcome Engine.
const MIN_MENTION_SCORE: f64 = 0.30;

/// How many terminal events the in-memory ring buffer keeps for the REST
/// activity feed and WS push payloads, mirroring the teacher's bounded
/// `recent_decisions`/`recent_errors` logs.
const MAX_RECENT_EVENTS: usize = 200;

/// Shared budget for the Historical Bootstrap Orchestrator's OHLC window
/// calls, independent of any single provider's own per-provider budget
/// (§4.5) — bootstrapping a large channel must not starve live polling.
const GLOBAL_OHLC_BUDGET: RateBudget = RateBudget { capacity: 120, refill_per_sec: 2.0 };

/// Everything a REST/WS handler needs about one channel (§3
/// `ChannelReputation`, flattened for the wire).
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub channel_id: ChannelId,
    pub tier: Tier,
    pub composite_score: Option<f64>,
    pub insufficient_data: bool,
    pub total_terminal_signals: u64,
    pub mean_roi: f64,
    pub median_roi: f64,
    pub best_roi: f64,
    pub worst_roi: f64,
    pub win_rate: f64,
    pub sharpe: f64,
    pub roi_stddev: f64,
    pub mean_days_to_ath: f64,
    pub speed_score: f64,
    pub first_signal_at: Option<DateTime<Utc>>,
    pub last_signal_at: Option<DateTime<Utc>>,
}

/// Query filter for `GET /api/v1/signals`.
#[derive(Debug, Default, Deserialize)]
pub struct SignalFilter {
    pub channel_id: Option<ChannelId>,
    pub status: Option<SignalStatus>,
    pub coin_key: Option<CoinKey>,
    pub limit: Option<usize>,
}

/// High-level counters for the health/overview endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineOverview {
    pub uptime_secs: u64,
    pub state_version: u64,
    pub monitored_channels: usize,
    pub total_signals: usize,
    pub total_channels_tracked: usize,
}

pub struct EngineState {
    pub config: RuntimeConfig,
    pub persistence: Arc<PersistenceLayer>,
    pub pricing: Arc<PricingFabric>,
    pub scorer: Arc<SignalScorer>,
    pub outcome: Arc<OutcomeEngine>,
    pub reputation: Arc<ReputationEngine>,
    pub bootstrap: Arc<BootstrapOrchestrator>,
    pub message_source: Arc<dyn MessageSource>,
    pub clock: SharedClock,
    monitored_channels: RwLock<Vec<ChannelId>>,
    state_version: AtomicU64,
    start_time: Instant,
    recent_terminal_events: RwLock<VecDeque<OutcomeEvent>>,
}

impl EngineState {
    /// Build every engine from `config`, restore persisted state into them,
    /// and return the shared handle the binary threads through its
    /// ingestion loops and the axum router.
    pub fn new(
        config: RuntimeConfig,
        persistence: Arc<PersistenceLayer>,
        providers_by_chain: HashMap<ChainId, Vec<Arc<dyn PriceProvider>>>,
        message_source: Arc<dyn MessageSource>,
        clock: SharedClock,
        monitored_channels: Vec<ChannelId>,
    ) -> Arc<Self> {
        let pricing = Arc::new(PricingFabric::new(
            providers_by_chain,
            config.hot_cache_capacity,
            Duration::from_secs(config.hot_cache_ttl_secs),
            config.historical_cache_capacity,
            Duration::from_secs(config.provider_timeout_secs),
        ));

        let outcome = Arc::new(OutcomeEngine::new(
            pricing.clone(),
            clock.clone(),
            config.retry_attempts_per_checkpoint,
            config.drawdown_termination_pct,
            config.tracking_window_days,
            config.extended_window_days,
            config.zero_volume_hours,
        ));

        let reputation = Arc::new(ReputationEngine::new(
            config.td_learning_rate,
            config.td_weights,
            config.reputation_weights,
            config.tier_thresholds,
            config.unproven_min_signals,
            config.score_suppression_min_signals,
        ));

        let bootstrap = Arc::new(BootstrapOrchestrator::new(
            message_source.clone(),
            pricing.clone(),
            reputation.clone(),
            outcome.clone(),
            TokenBucket::new(GLOBAL_OHLC_BUDGET),
            config.bootstrap_parallelism_per_channel,
        ));

        outcome.restore(persistence.signals.all());
        reputation.restore_channels(persistence.channel_reputation.all());
        reputation.restore_cross_channel(persistence.coin_cross_channel.all());
        info!(
            signals = persistence.signals.len(),
            channels = persistence.channel_reputation.len(),
            "engine state restored from persistence"
        );

        Arc::new(Self {
            config,
            persistence,
            pricing,
            scorer: Arc::new(SignalScorer::new()),
            outcome,
            reputation,
            bootstrap,
            message_source,
            clock,
            monitored_channels: RwLock::new(monitored_channels),
            state_version: AtomicU64::new(0),
            start_time: Instant::now(),
            recent_terminal_events: RwLock::new(VecDeque::new()),
        })
    }

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    pub fn monitored_channels(&self) -> Vec<ChannelId> {
        self.monitored_channels.read().clone()
    }

    pub fn add_monitored_channel(&self, channel_id: ChannelId) {
        let mut channels = self.monitored_channels.write();
        if !channels.contains(&channel_id) {
            channels.push(channel_id);
            self.increment_version();
        }
    }

    /// Extract mentions from a live message, score each one, and register
    /// the ones that clear the confidence floor as tracked signals (§4.1,
    /// §4.3). Skipped-for-score mentions are not an error: most chatter in a
    /// call channel isn't a call.
    pub async fn ingest_message(&self, message: Message) {
        let mentions = extract_mentions(&message);
        if mentions.is_empty() {
            return;
        }

        for mention in &mentions {
            let coin_key = mention.coin_key();
            let has_address = mention.address.is_some();
            let score = self.scorer.score(&message.channel_id, &message.engagement, &message.text, has_address);

            if score < MIN_MENTION_SCORE {
                debug!(channel_id = %message.channel_id, coin_key, score, "mention below confidence floor, skipped");
                continue;
            }

            let predicted_roi = self.reputation.predict_roi(&message.channel_id, &coin_key);
            let signal = self
                .outcome
                .register(message.channel_id.clone(), message.id, message.timestamp, mention, predicted_roi)
                .await;

            self.reputation.record_mention(
                &message.channel_id,
                &coin_key,
                mention.symbol.clone(),
                mention.address.clone(),
                signal.entry_confidence,
            );

            self.persistence.signals.put(signal.id.clone(), signal);
            self.increment_version();
        }
    }

    /// Drain and realize due checkpoints (§4.3), wiring any terminations
    /// into reputation and persistence.
    pub async fn run_checkpoint_cycle(&self) {
        let events = self.outcome.realize_due_checkpoints().await;
        self.record_outcome_events(events);
    }

    /// The periodic ATH/termination poll (§4.3).
    pub async fn run_ath_poll_cycle(&self) {
        let events = self.outcome.poll_ath_and_termination().await;
        self.record_outcome_events(events);
    }

    /// Replay one channel's archive (§4.5), persisting the resulting
    /// progress record and wiring any synthesized terminations into
    /// reputation the same way a live termination would be.
    pub async fn run_bootstrap_for_channel(&self, channel_id: ChannelId) {
        let resume_from = self.persistence.bootstrap_progress.get(&channel_id);
        let now = self.clock.now();
        let (progress, events) = self.bootstrap.bootstrap(channel_id.clone(), resume_from, now).await;
        self.persistence.bootstrap_progress.put(channel_id.clone(), progress);
        self.record_outcome_events(events);
        info!(channel_id = %channel_id, "bootstrap pass complete");
    }

    /// Apply every terminal event to reputation, persist the touched
    /// signal/channel/cross-channel records, and append to the activity
    /// feed. A duplicate (already-applied) event is logged and otherwise
    /// ignored — it means the same termination was observed twice, not a
    /// bug in the caller.
    fn record_outcome_events(&self, events: Vec<OutcomeEvent>) {
        if events.is_empty() {
            return;
        }
        let now = self.clock.now();

        for event in events {
            match self.reputation.apply_terminal_event(&event, now) {
                Ok(()) => {
                    if let Some(channel) = self.reputation.get_channel(&event.channel_id) {
                        self.persistence.channel_reputation.put(channel.channel_id.clone(), channel);
                    }
                    if let Some(cross) = self.reputation.get_cross_channel(&event.coin_key) {
                        self.persistence.coin_cross_channel.put(cross.coin_key.clone(), cross);
                    }
                    if let Some(signal) = self.outcome.get(&event.signal_ref) {
                        self.persistence.signals.put(signal.id.clone(), signal);
                    }
                    self.push_terminal_event(event);
                    self.increment_version();
                }
                Err(crate::error::Error::DuplicateTerminalEvent(signal_ref)) => {
                    debug!(signal_ref, "duplicate terminal event suppressed");
                }
                Err(e) => {
                    warn!(error = %e, "failed to apply terminal event");
                }
            }
        }
    }

    fn push_terminal_event(&self, event: OutcomeEvent) {
        let mut recent = self.recent_terminal_events.write();
        recent.push_back(event);
        while recent.len() > MAX_RECENT_EVENTS {
            recent.pop_front();
        }
    }

    pub fn recent_terminal_events(&self) -> Vec<OutcomeEvent> {
        self.recent_terminal_events.read().iter().cloned().collect()
    }

    pub fn build_channels_view(&self) -> Vec<ChannelSummary> {
        self.reputation
            .all_channels()
            .into_iter()
            .map(|c| channel_summary(&c))
            .collect()
    }

    /// Same projection as [`EngineState::build_channels_view`], for a single
    /// channel (§6 `ChannelReputationView`).
    pub fn build_channel_summary(&self, channel_id: &ChannelId) -> Option<ChannelSummary> {
        self.reputation.get_channel(channel_id).map(|c| channel_summary(&c))
    }

    pub fn build_signals_view(&self, filter: &SignalFilter) -> Vec<Signal> {
        let mut signals = self.outcome.all();

        if let Some(channel_id) = &filter.channel_id {
            signals.retain(|s| &s.channel_id == channel_id);
        }
        if let Some(status) = filter.status {
            signals.retain(|s| s.status == status);
        }
        if let Some(coin_key) = &filter.coin_key {
            signals.retain(|s| &s.coin_key == coin_key);
        }

        signals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            signals.truncate(limit);
        }
        signals
    }

    pub fn build_overview(&self) -> EngineOverview {
        EngineOverview {
            uptime_secs: self.start_time.elapsed().as_secs(),
            state_version: self.current_version(),
            monitored_channels: self.monitored_channels().len(),
            total_signals: self.outcome.all().len(),
            total_channels_tracked: self.reputation.all_channels().len(),
        }
    }
}
