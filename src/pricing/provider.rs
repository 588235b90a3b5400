//! The `PriceProvider` boundary (§6 "Price providers (outbound)").
//!
//! Object-safe so the fabric can hold `Vec<Arc<dyn PriceProvider>>` per
//! chain, grounded in the pack's async-trait RPC/signal-provider boundaries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::types::{ChainId, Granularity, PriceSource};

/// A single OHLC observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// A single price observation returned by a provider call (§3). Never
/// stored directly — selected fields are copied into a `Signal` or
/// `Checkpoint`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price_usd: Decimal,
    pub source: PriceSource,
    pub as_of: DateTime<Utc>,
    pub market_cap_usd: Option<Decimal>,
    pub volume_24h_usd: Option<Decimal>,
    pub liquidity_usd: Option<Decimal>,
    pub price_change_24h_pct: Option<Decimal>,
    pub confidence: Decimal,
}

/// Which calls a provider can satisfy. The fabric statically skips a
/// provider that lacks the capability a given call needs (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Spot,
    At,
    Ohlc,
}

/// Declared rate budget: a token bucket capacity and refill rate (§6).
#[derive(Debug, Clone, Copy)]
pub struct RateBudget {
    pub capacity: u32,
    pub refill_per_sec: f64,
}

/// A price data source. Implementations are out of scope for the core
/// (§1); the core depends only on this boundary.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Stable identifier used in logs and circuit-breaker bookkeeping.
    fn name(&self) -> &str;

    fn source_tag(&self) -> PriceSource;

    fn capability_set(&self) -> &[Capability];

    fn rate_budget(&self) -> RateBudget;

    fn supports(&self, cap: Capability) -> bool {
        self.capability_set().contains(&cap)
    }

    async fn fetch_spot(&self, coin_key: &str, chain: ChainId) -> Result<PriceQuote, ProviderError>;

    async fn fetch_at(
        &self,
        coin_key: &str,
        chain: ChainId,
        ts: DateTime<Utc>,
    ) -> Result<PriceQuote, ProviderError>;

    async fn fetch_ohlc(
        &self,
        coin_key: &str,
        chain: ChainId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Vec<Candle>, ProviderError>;
}
