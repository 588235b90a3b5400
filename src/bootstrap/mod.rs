//! Historical Bootstrap Orchestrator (§4.5): replays a channel's full
//! message archive before live monitoring begins, synthesizing all six
//! checkpoints from a single retrospective OHLC window per signal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::extraction::extract_mentions;
use crate::message::{Message, MessageSource};
use crate::outcome::{Checkpoint, OutcomeEngine, OutcomeEvent};
use crate::pricing::PricingFabric;
use crate::pricing::provider::Candle;
use crate::pricing::rate_limit::TokenBucket;
use crate::reputation::ReputationEngine;
use crate::types::{
    signal_id, ChannelId, CheckpointLabel, EntrySourceTag, Granularity, MessageId, OutcomeCategory,
    SignalFlag, SignalStatus, TerminationReason,
};

/// Progress checkpoint for one channel's bootstrap pass (§4.5), persisted
/// every 100 processed messages so a crash resumes rather than restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapProgress {
    pub channel_id: ChannelId,
    pub total: u64,
    pub processed: u64,
    pub successes: u64,
    pub failures: u64,
    pub data_unavailable: u64,
    pub api_calls_spent: u64,
    pub last_message_id: Option<MessageId>,
    pub status: BootstrapStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootstrapStatus {
    InProgress,
    Completed,
}

impl BootstrapProgress {
    fn new(channel_id: ChannelId, now: DateTime<Utc>) -> Self {
        Self {
            channel_id,
            total: 0,
            processed: 0,
            successes: 0,
            failures: 0,
            data_unavailable: 0,
            api_calls_spent: 0,
            last_message_id: None,
            status: BootstrapStatus::InProgress,
            started_at: now,
            updated_at: now,
        }
    }

    /// Fraction of processed messages that yielded `data_unavailable`
    /// signals, used for the §4.5 `insufficient_data` threshold.
    pub fn data_unavailable_ratio(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.data_unavailable as f64 / self.processed as f64
        }
    }
}

const BATCH_SIZE: usize = 100;
const INSUFFICIENT_DATA_THRESHOLD: f64 = 0.30;
const ANOMALY_ATH_MUL_THRESHOLD: f64 = 100.0;
const ANOMALY_WINDOW_HOURS: i64 = 24;

/// Drives a batch replay of a channel's full archive through extraction,
/// historical entry resolution, and retrospective checkpoint synthesis.
pub struct BootstrapOrchestrator {
    message_source: Arc<dyn MessageSource>,
    pricing: Arc<PricingFabric>,
    reputation: Arc<ReputationEngine>,
    outcome: Arc<OutcomeEngine>,
    global_ohlc_bucket: TokenBucket,
    per_channel_parallelism: usize,
}

impl BootstrapOrchestrator {
    pub fn new(
        message_source: Arc<dyn MessageSource>,
        pricing: Arc<PricingFabric>,
        reputation: Arc<ReputationEngine>,
        outcome: Arc<OutcomeEngine>,
        global_ohlc_bucket: TokenBucket,
        per_channel_parallelism: usize,
    ) -> Self {
        Self {
            message_source,
            pricing,
            reputation,
            outcome,
            global_ohlc_bucket,
            per_channel_parallelism,
        }
    }

    /// Replay `channel_id`'s full history, resuming from `resume_from`'s
    /// `last_message_id` if given. Returns the final progress record and
    /// every `OutcomeEvent` produced, for the caller to feed into the
    /// Reputation Engine's terminal-event path and to persist.
    pub async fn bootstrap(
        &self,
        channel_id: ChannelId,
        resume_from: Option<BootstrapProgress>,
        now: DateTime<Utc>,
    ) -> (BootstrapProgress, Vec<OutcomeEvent>) {
        let mut progress = resume_from.unwrap_or_else(|| BootstrapProgress::new(channel_id.clone(), now));
        let mut from_id = progress.last_message_id;
        let semaphore = Arc::new(Semaphore::new(self.per_channel_parallelism));
        let mut all_events = Vec::new();

        loop {
            let batch = match self.message_source.fetch_history(&channel_id, from_id, BATCH_SIZE).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(channel_id = %channel_id, error = %e, "bootstrap fetch_history failed, stopping pass");
                    break;
                }
            };

            if batch.is_empty() {
                break;
            }

            progress.total += batch.len() as u64;

            // Each task acquires its own permit inside the future body, so
            // `join_all` can poll every task concurrently while the
            // semaphore itself caps how many run pricing calls at once —
            // acquiring permits eagerly before dispatch would deadlock
            // past the Kth message with nothing yet polling to release one.
            let mut tasks = Vec::new();
            for message in batch {
                let pricing = self.pricing.clone();
                let reputation = self.reputation.clone();
                let outcome = self.outcome.clone();
                let semaphore = semaphore.clone();
                tasks.push(self.process_message(message, pricing, reputation, outcome, now, semaphore));
            }

            let results = futures_util::future::join_all(tasks).await;
            for (last_id, outcome) in results {
                from_id = Some(last_id);
                progress.processed += 1;
                progress.last_message_id = Some(last_id);
                match outcome {
                    MessageOutcome::Success(events) => {
                        progress.successes += 1;
                        progress.api_calls_spent += 2;
                        all_events.extend(events);
                    }
                    MessageOutcome::DataUnavailable => {
                        progress.data_unavailable += 1;
                        progress.api_calls_spent += 1;
                    }
                    MessageOutcome::NoMention => {}
                    MessageOutcome::Failure => {
                        progress.failures += 1;
                    }
                }
            }

            progress.updated_at = now;
            info!(
                channel_id = %channel_id,
                processed = progress.processed,
                total = progress.total,
                "bootstrap batch committed"
            );

            if progress.data_unavailable_ratio() >= INSUFFICIENT_DATA_THRESHOLD {
                self.reputation.set_insufficient_data(&channel_id, true);
            } else {
                self.reputation.set_insufficient_data(&channel_id, false);
            }
        }

        progress.status = BootstrapStatus::Completed;
        progress.updated_at = now;
        (progress, all_events)
    }

    async fn process_message(
        &self,
        message: Message,
        pricing: Arc<PricingFabric>,
        reputation: Arc<ReputationEngine>,
        outcome: Arc<OutcomeEngine>,
        _now: DateTime<Utc>,
        semaphore: Arc<Semaphore>,
    ) -> (MessageId, MessageOutcome) {
        let mentions = extract_mentions(&message);
        if mentions.is_empty() {
            return (message.id, MessageOutcome::NoMention);
        }
        let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");

        let mut events = Vec::new();
        let mut any_success = false;
        let mut any_unavailable = false;

        for mention in &mentions {
            let coin_key = mention.coin_key();

            if !self.global_ohlc_bucket.try_consume() {
                // Global bucket empty: pause briefly and retry once rather
                // than failing the whole message.
                self.global_ohlc_bucket.wait_for_token(Duration::from_secs(30)).await;
            }

            let entry = match pricing.get_at(&coin_key, mention.chain, message.timestamp).await {
                Ok(quote) => quote,
                Err(_) => {
                    any_unavailable = true;
                    continue;
                }
            };

            let window_end = message.timestamp + chrono::Duration::days(30);
            let candles = match pricing
                .get_ohlc_window(&coin_key, mention.chain, message.timestamp, window_end, Granularity::Hourly)
                .await
            {
                Ok(c) => c,
                Err(_) => {
                    any_unavailable = true;
                    continue;
                }
            };

            reputation.record_mention(
                &message.channel_id,
                &coin_key,
                mention.symbol.clone(),
                mention.address.clone(),
                entry.confidence.to_string().parse::<f64>().unwrap_or(0.5),
            );

            let predicted_roi = reputation.predict_roi(&message.channel_id, &coin_key);
            let sid = signal_id(message.id, &message.channel_id, &coin_key);

            let synthesis = synthesize_checkpoints(entry.price_usd, message.timestamp, &candles);

            let mut ath_mul = if entry.price_usd.is_zero() {
                0.0
            } else {
                (synthesis.ath_price / entry.price_usd).to_string().parse::<f64>().unwrap_or(0.0)
            };

            let days_to_ath = (synthesis.ath_at - message.timestamp).num_seconds() as f64 / 86_400.0;
            let mut suspicious = false;
            if days_to_ath <= (ANOMALY_WINDOW_HOURS as f64 / 24.0) && ath_mul > ANOMALY_ATH_MUL_THRESHOLD {
                suspicious = true;
                ath_mul = ANOMALY_ATH_MUL_THRESHOLD;
            }

            let mut flags = Vec::new();
            if suspicious {
                flags.push(SignalFlag::Suspicious);
            }

            let terminated_at = synthesis
                .checkpoints
                .get(&CheckpointLabel::D30)
                .map(|cp| cp.due_at)
                .unwrap_or(message.timestamp);

            let signal = crate::outcome::Signal {
                id: sid.clone(),
                channel_id: message.channel_id.clone(),
                message_id: message.id,
                coin_key: coin_key.clone(),
                chain: mention.chain,
                created_at: message.timestamp,
                entry_price: entry.price_usd,
                entry_confidence: entry.confidence.to_string().parse::<f64>().unwrap_or(0.5),
                entry_source_tag: EntrySourceTag::HistoricalOhlc,
                predicted_roi,
                checkpoints: synthesis.checkpoints.clone(),
                ath_price: synthesis.ath_price,
                ath_at: synthesis.ath_at,
                status: SignalStatus::CompletedHistorical,
                terminated_at: Some(terminated_at),
                terminated_reason: Some(TerminationReason::HistoricalReplay),
                flags,
                window_extended: false,
                recent_roi_trend: Vec::new(),
                zero_volume_since: None,
                suspicious,
                last_observed_price: synthesis
                    .checkpoints
                    .get(&CheckpointLabel::D30)
                    .and_then(|cp| cp.price)
                    .or(Some(synthesis.ath_price)),
            };
            outcome.insert_historical(signal);

            let event = OutcomeEvent {
                signal_ref: sid,
                channel_id: message.channel_id.clone(),
                coin_key: coin_key.clone(),
                entry_price: entry.price_usd,
                ath_price: synthesis.ath_price,
                ath_mul,
                days_to_ath,
                predicted_roi,
                category: OutcomeCategory::classify(ath_mul),
                reason: TerminationReason::HistoricalReplay,
                suspicious,
            };

            events.push(event);
            any_success = true;
        }

        if any_success {
            (message.id, MessageOutcome::Success(events))
        } else if any_unavailable {
            (message.id, MessageOutcome::DataUnavailable)
        } else {
            (message.id, MessageOutcome::NoMention)
        }
    }
}

enum MessageOutcome {
    Success(Vec<OutcomeEvent>),
    DataUnavailable,
    Failure,
    NoMention,
}

struct CheckpointSynthesis {
    ath_price: Decimal,
    ath_at: DateTime<Utc>,
    checkpoints: HashMap<CheckpointLabel, Checkpoint>,
}

/// Pick, for each of the six checkpoint due timestamps, the candle closing
/// closest to it (forward-filling from the prior candle when none matches
/// exactly), and compute the window's ATH (§4.5 step 4). A label with no
/// candle at all (empty window) is recorded missing rather than omitted, so
/// a historical signal carries the same six-entry checkpoint map a live one
/// does.
fn synthesize_checkpoints(entry_price: Decimal, created_at: DateTime<Utc>, candles: &[Candle]) -> CheckpointSynthesis {
    let mut ath_price = entry_price;
    let mut ath_at = created_at;

    for candle in candles {
        if candle.high > ath_price {
            ath_price = candle.high;
            ath_at = candle.open_time;
        }
    }

    let mut checkpoints = HashMap::new();
    for label in CheckpointLabel::ALL {
        let due_at = created_at + chrono::Duration::seconds(label.offset_secs());
        let found = closest_candle(candles, due_at);
        let checkpoint = match found {
            Some(candle) => Checkpoint {
                label,
                due_at,
                realized_at: Some(candle.open_time),
                price: Some(candle.close),
                missing: false,
                attempts: 0,
            },
            None => Checkpoint {
                label,
                due_at,
                realized_at: Some(due_at),
                price: None,
                missing: true,
                attempts: 0,
            },
        };
        checkpoints.insert(label, checkpoint);
    }

    CheckpointSynthesis { ath_price, ath_at, checkpoints }
}

/// Forward-fill candle lookup: the candle whose `open_time` is closest to
/// (and not after) `due_at`, falling back to the nearest available candle
/// if none precede it.
fn closest_candle(candles: &[Candle], due_at: DateTime<Utc>) -> Option<&Candle> {
    candles
        .iter()
        .filter(|c| c.open_time <= due_at)
        .max_by_key(|c| c.open_time)
        .or_else(|| candles.iter().min_by_key(|c| c.open_time))
}
