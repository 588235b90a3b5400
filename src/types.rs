//! Closed-variant types shared across the engine.
//!
//! The source material (per DESIGN.md) represented these as dynamically
//! typed strings; here they are closed enums so invalid states don't
//! typecheck.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ChannelId = String;
pub type MessageId = i64;
/// `address` if the mention carries one, else the normalized (upper-cased)
/// symbol. Scoped per channel unless used as a map key in a cross-channel
/// structure, where the same string identifies the same coin everywhere.
pub type CoinKey = String;

/// Identity of a [`crate::outcome::Signal`]: `(message_id, channel_id, coin_key)`.
///
/// The spec describes this as `hash(message_id, channel_id, coin_key)`. A
/// formatted composite string is used instead of a numeric hash: it is
/// trivially deterministic across runs (required for byte-identical replay,
/// §8 property 8), collision-free by construction, and needs no hashing
/// dependency.
pub type SignalId = String;

/// Build the canonical [`SignalId`] for a mention.
pub fn signal_id(message_id: MessageId, channel_id: &str, coin_key: &str) -> SignalId {
    format!("{channel_id}:{message_id}:{coin_key}")
}

/// Chain a coin lives on. `Other` covers everything the extractor doesn't
/// have a dedicated address regex for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainId {
    Ethereum,
    Solana,
    Other,
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ethereum => write!(f, "ethereum"),
            Self::Solana => write!(f, "solana"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Identifies which provider a [`crate::pricing::PriceQuote`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceSource {
    PrimaryDex,
    SpotAggregatorA,
    SpotAggregatorB,
    OnChainIndexer,
    HistoricalOhlc,
}

/// Provenance of a signal's entry price, driving the confidence band in
/// §4.2 of the spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntrySourceTag {
    MessageText,
    HistoricalOhlc,
    CurrentPriceFallback,
}

/// Fixed checkpoint schedule. Order matters: it is the realization order
/// invariant from §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum CheckpointLabel {
    H1,
    H4,
    H24,
    D3,
    D7,
    D30,
}

impl CheckpointLabel {
    pub const ALL: [CheckpointLabel; 6] = [
        CheckpointLabel::H1,
        CheckpointLabel::H4,
        CheckpointLabel::H24,
        CheckpointLabel::D3,
        CheckpointLabel::D7,
        CheckpointLabel::D30,
    ];

    /// Offset from signal creation, in seconds.
    pub fn offset_secs(self) -> i64 {
        match self {
            Self::H1 => 3_600,
            Self::H4 => 4 * 3_600,
            Self::H24 => 24 * 3_600,
            Self::D3 => 3 * 86_400,
            Self::D7 => 7 * 86_400,
            Self::D30 => 30 * 86_400,
        }
    }
}

impl fmt::Display for CheckpointLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::H24 => "24h",
            Self::D3 => "3d",
            Self::D7 => "7d",
            Self::D30 => "30d",
        };
        write!(f, "{s}")
    }
}

/// Lifetime status of a [`crate::outcome::Signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStatus {
    InProgress,
    CompletedLive,
    CompletedHistorical,
    DataUnavailable,
    Dead,
    Inactive,
}

impl SignalStatus {
    /// Terminal statuses are the ones that feed the Reputation Engine and
    /// that may never transition again (property 3 in §8).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::CompletedLive | Self::CompletedHistorical | Self::Dead | Self::Inactive
        )
    }
}

/// Reason a signal was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    WindowElapsed,
    Drawdown90Pct,
    ZeroVolume,
    HistoricalReplay,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::WindowElapsed => "window_elapsed",
            Self::Drawdown90Pct => "drawdown_90pct",
            Self::ZeroVolume => "zero_volume",
            Self::HistoricalReplay => "historical_replay",
        };
        write!(f, "{s}")
    }
}

/// Winner classification bucket on termination (§3 `PredictionError.outcome_category`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeCategory {
    Moon,
    Great,
    Good,
    BreakEven,
    Loss,
}

impl OutcomeCategory {
    /// Classify an `ath_mul` observation into its outcome bucket.
    pub fn classify(ath_mul: f64) -> Self {
        if ath_mul >= 5.0 {
            Self::Moon
        } else if ath_mul >= 3.0 {
            Self::Great
        } else if ath_mul >= 2.0 {
            Self::Good
        } else if ath_mul >= 1.0 {
            Self::BreakEven
        } else {
            Self::Loss
        }
    }
}

/// Reputation tier, a total function of `(score, total_terminal_signals)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Elite,
    Excellent,
    Good,
    Average,
    Poor,
    Unreliable,
    Unproven,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// OHLC candle granularity. The spec only asks for hourly, but the type is
/// closed-variant rather than a bare string for future-proofing the
/// provider trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    Hourly,
}

/// Flags attached to a signal or quote, surfaced per the error table in §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalFlag {
    PriceDiscrepancy,
    LatePump,
    Suspicious,
}
