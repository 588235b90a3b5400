//! Pricing Fabric (§4.2): multi-source price resolution with failover,
//! caching, rate-limit arbitration, and entry-price provenance tagging.

pub mod cache;
pub mod circuit_breaker;
pub mod provider;
pub mod rate_limit;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::PricingError;
use crate::extraction::TokenMention;
use crate::types::{ChainId, EntrySourceTag, Granularity, SignalFlag};
use cache::{HistoricalCache, HotCache};
use circuit_breaker::CircuitBreaker;
use provider::{Candle, Capability, PriceProvider, PriceQuote};
use rate_limit::TokenBucket;

/// Confidence band bounds for each entry-price provenance source (§4.2).
struct Band {
    lo: f64,
    hi: f64,
}

const MESSAGE_TEXT_BAND: Band = Band { lo: 0.85, hi: 0.95 };
const HISTORICAL_OHLC_BAND: Band = Band { lo: 0.70, hi: 0.85 };
const CURRENT_FALLBACK_BAND: Band = Band { lo: 0.20, hi: 0.40 };

impl Band {
    /// Project a source-quality signal in `[0,1]` (or a fixed 0.5 when no
    /// such signal exists, e.g. a bare text-price parse) into this band.
    fn project(&self, quality: f64) -> f64 {
        self.lo + quality.clamp(0.0, 1.0) * (self.hi - self.lo)
    }
}

/// Per-provider bookkeeping the fabric needs alongside the provider itself.
struct ProviderSlot {
    provider: Arc<dyn PriceProvider>,
    bucket: TokenBucket,
    breaker: CircuitBreaker,
}

/// Outcome of entry-price resolution (§4.1/§4.2), fed into
/// `outcome::Signal` registration.
#[derive(Debug, Clone)]
pub struct EntryResolution {
    pub price: Decimal,
    pub confidence: f64,
    pub source_tag: EntrySourceTag,
    pub flags: Vec<SignalFlag>,
}

/// Routes price queries to ordered per-chain provider lists with failover,
/// rate/quota arbitration, and hot/historical caching.
pub struct PricingFabric {
    providers: HashMap<ChainId, Vec<ProviderSlot>>,
    hot_cache: HotCache,
    historical_cache: HistoricalCache,
    provider_timeout: Duration,
}

impl PricingFabric {
    pub fn new(
        providers_by_chain: HashMap<ChainId, Vec<Arc<dyn PriceProvider>>>,
        hot_cache_capacity: usize,
        hot_cache_ttl: Duration,
        historical_cache_capacity: usize,
        provider_timeout: Duration,
    ) -> Self {
        let providers = providers_by_chain
            .into_iter()
            .map(|(chain, list)| {
                let slots = list
                    .into_iter()
                    .map(|provider| {
                        let bucket = TokenBucket::new(provider.rate_budget());
                        ProviderSlot {
                            provider,
                            bucket,
                            breaker: CircuitBreaker::new(),
                        }
                    })
                    .collect();
                (chain, slots)
            })
            .collect();

        Self {
            providers,
            hot_cache: HotCache::new(hot_cache_capacity, hot_cache_ttl),
            historical_cache: HistoricalCache::new(historical_cache_capacity),
            provider_timeout,
        }
    }

    /// For-each-provider-in-order loop shared by every public operation
    /// (§4.2, §9 REDESIGN FLAGS: explicit result types, no exception-driven
    /// control flow for failover).
    async fn try_providers<F, Fut>(
        &self,
        chain: ChainId,
        coin_key: &str,
        cap: Capability,
        call: F,
    ) -> Result<PriceQuote, PricingError>
    where
        F: Fn(Arc<dyn PriceProvider>) -> Fut,
        Fut: std::future::Future<Output = Result<PriceQuote, crate::error::ProviderError>>,
    {
        let slots = match self.providers.get(&chain) {
            Some(s) => s,
            None => return Err(PricingError::AllSourcesUnavailable { coin_key: coin_key.to_string(), chain }),
        };

        let mut any_attempted = false;

        for slot in slots {
            if !slot.provider.supports(cap) {
                continue;
            }
            if slot.breaker.is_open() {
                debug!(provider = slot.provider.name(), "circuit open, skipping");
                continue;
            }
            if !slot.bucket.wait_for_token(self.provider_timeout).await {
                debug!(provider = slot.provider.name(), "rate bucket exhausted, skipping");
                continue;
            }

            any_attempted = true;
            let result = tokio::time::timeout(self.provider_timeout, call(slot.provider.clone())).await;

            match result {
                Ok(Ok(quote)) => {
                    slot.breaker.record_success();
                    return Ok(quote);
                }
                Ok(Err(e)) => {
                    warn!(provider = slot.provider.name(), error = %e, "provider call failed");
                    slot.breaker.record_failure(slot.provider.name());
                }
                Err(_) => {
                    warn!(provider = slot.provider.name(), "provider call timed out");
                    slot.breaker.record_failure(slot.provider.name());
                }
            }
        }

        if !any_attempted {
            Err(PricingError::RateLimited)
        } else {
            Err(PricingError::AllSourcesUnavailable { coin_key: coin_key.to_string(), chain })
        }
    }

    /// `get_current` (§4.2): spot price, hot-cached.
    pub async fn get_current(&self, coin_key: &str, chain: ChainId) -> Result<PriceQuote, PricingError> {
        if let Some(quote) = self.hot_cache.get(coin_key, chain) {
            return Ok(quote);
        }

        let quote = self
            .try_providers(chain, coin_key, Capability::Spot, |p| {
                let coin_key = coin_key.to_string();
                async move { p.fetch_spot(&coin_key, chain).await }
            })
            .await?;

        self.hot_cache.put(coin_key, chain, quote.clone());
        Ok(quote)
    }

    /// `get_at` (§4.2): historical spot at a specific timestamp.
    pub async fn get_at(
        &self,
        coin_key: &str,
        chain: ChainId,
        ts: DateTime<Utc>,
    ) -> Result<PriceQuote, PricingError> {
        self.try_providers(chain, coin_key, Capability::At, |p| {
            let coin_key = coin_key.to_string();
            async move { p.fetch_at(&coin_key, chain, ts).await }
        })
        .await
    }

    /// `get_ohlc_window` (§4.2): hourly OHLC candles, day-bucketed in the
    /// historical cache.
    pub async fn get_ohlc_window(
        &self,
        coin_key: &str,
        chain: ChainId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Vec<Candle>, PricingError> {
        let day = cache::day_bucket(from);
        if let Some(candles) = self.historical_cache.get(coin_key, chain, day, granularity) {
            return Ok(candles);
        }

        // Candle vectors don't fit try_providers' PriceQuote-shaped
        // signature, so OHLC runs its own copy of the same for-each-
        // provider loop.
        let slots = self
            .providers
            .get(&chain)
            .ok_or(PricingError::AllSourcesUnavailable { coin_key: coin_key.to_string(), chain })?;

        let mut any_attempted = false;
        for slot in slots {
            if !slot.provider.supports(Capability::Ohlc) {
                continue;
            }
            if slot.breaker.is_open() {
                continue;
            }
            if !slot.bucket.wait_for_token(self.provider_timeout).await {
                continue;
            }
            any_attempted = true;

            let result = tokio::time::timeout(
                self.provider_timeout,
                slot.provider.fetch_ohlc(coin_key, chain, from, to, granularity),
            )
            .await;

            match result {
                Ok(Ok(candles)) => {
                    slot.breaker.record_success();
                    self.historical_cache.put(coin_key, chain, day, granularity, candles.clone());
                    return Ok(candles);
                }
                Ok(Err(e)) => {
                    warn!(provider = slot.provider.name(), error = %e, "ohlc provider call failed");
                    slot.breaker.record_failure(slot.provider.name());
                }
                Err(_) => {
                    slot.breaker.record_failure(slot.provider.name());
                }
            }
        }

        if !any_attempted {
            Err(PricingError::RateLimited)
        } else {
            Err(PricingError::AllSourcesUnavailable { coin_key: coin_key.to_string(), chain })
        }
    }

    /// Resolve an entry price for a freshly extracted mention, applying the
    /// provenance-band, discrepancy, and late-pump rules of §4.2.
    pub async fn resolve_entry(
        &self,
        mention: &TokenMention,
        message_ts: DateTime<Utc>,
    ) -> Result<EntryResolution, PricingError> {
        let coin_key = mention.coin_key();
        let chain = mention.chain;
        let mut flags = Vec::new();

        if let Some(text_price) = mention.text_price {
            let hist = self.get_at(&coin_key, chain, message_ts).await.ok();

            let mut confidence = match &hist {
                Some(h) => {
                    let diff_ratio = (text_price.to_string().parse::<f64>().unwrap_or(0.0)
                        - h.price_usd.to_string().parse::<f64>().unwrap_or(0.0))
                    .abs()
                        / h.price_usd.to_string().parse::<f64>().unwrap_or(1.0).max(1e-12);

                    if diff_ratio > 0.10 {
                        flags.push(SignalFlag::PriceDiscrepancy);
                        MESSAGE_TEXT_BAND.project(0.5) - 0.10
                    } else {
                        MESSAGE_TEXT_BAND.project(h.confidence.to_string().parse::<f64>().unwrap_or(0.5))
                    }
                }
                None => MESSAGE_TEXT_BAND.project(0.5),
            };

            if let Ok(day_open) = self.day_open(&coin_key, chain, message_ts).await {
                let day_open_f = day_open.to_string().parse::<f64>().unwrap_or(0.0);
                let entry_f = text_price.to_string().parse::<f64>().unwrap_or(0.0);
                if day_open_f > 0.0 && (entry_f - day_open_f) / day_open_f > 0.50 {
                    flags.push(SignalFlag::LatePump);
                    confidence *= 0.80;
                }
            }

            return Ok(EntryResolution {
                price: text_price,
                confidence: confidence.clamp(0.0, 1.0),
                source_tag: EntrySourceTag::MessageText,
                flags,
            });
        }

        if let Ok(hist) = self.get_at(&coin_key, chain, message_ts).await {
            let quality = hist.confidence.to_string().parse::<f64>().unwrap_or(0.5);
            return Ok(EntryResolution {
                price: hist.price_usd,
                confidence: HISTORICAL_OHLC_BAND.project(quality).clamp(0.0, 1.0),
                source_tag: EntrySourceTag::HistoricalOhlc,
                flags,
            });
        }

        let current = self.get_current(&coin_key, chain).await?;
        let quality = current.confidence.to_string().parse::<f64>().unwrap_or(0.5);
        Ok(EntryResolution {
            price: current.price_usd,
            confidence: CURRENT_FALLBACK_BAND.project(quality).clamp(0.0, 1.0),
            source_tag: EntrySourceTag::CurrentPriceFallback,
            flags,
        })
    }

    /// The first-mention-day open, used by late-pump detection (§4.2, §9
    /// Open Question resolved in DESIGN.md: first-mention-day open, not
    /// ATH-day open).
    async fn day_open(
        &self,
        coin_key: &str,
        chain: ChainId,
        message_ts: DateTime<Utc>,
    ) -> Result<Decimal, PricingError> {
        let midnight = message_ts
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();
        let quote = self.get_at(coin_key, chain, midnight).await?;
        Ok(quote.price_usd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::pricing::provider::RateBudget;
    use crate::types::ChainId;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysFails {
        calls: AtomicU32,
    }

    #[async_trait]
    impl PriceProvider for AlwaysFails {
        fn name(&self) -> &str {
            "always_fails"
        }
        fn source_tag(&self) -> crate::types::PriceSource {
            crate::types::PriceSource::PrimaryDex
        }
        fn capability_set(&self) -> &[Capability] {
            &[Capability::Spot, Capability::At, Capability::Ohlc]
        }
        fn rate_budget(&self) -> RateBudget {
            RateBudget { capacity: 100, refill_per_sec: 100.0 }
        }
        async fn fetch_spot(&self, _coin_key: &str, _chain: ChainId) -> Result<PriceQuote, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Timeout)
        }
        async fn fetch_at(&self, _coin_key: &str, _chain: ChainId, _ts: DateTime<Utc>) -> Result<PriceQuote, ProviderError> {
            Err(ProviderError::Timeout)
        }
        async fn fetch_ohlc(
            &self,
            _coin_key: &str,
            _chain: ChainId,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
            _granularity: Granularity,
        ) -> Result<Vec<Candle>, ProviderError> {
            Err(ProviderError::Timeout)
        }
    }

    struct AlwaysSucceeds;

    #[async_trait]
    impl PriceProvider for AlwaysSucceeds {
        fn name(&self) -> &str {
            "always_succeeds"
        }
        fn source_tag(&self) -> crate::types::PriceSource {
            crate::types::PriceSource::SpotAggregatorA
        }
        fn capability_set(&self) -> &[Capability] {
            &[Capability::Spot, Capability::At, Capability::Ohlc]
        }
        fn rate_budget(&self) -> RateBudget {
            RateBudget { capacity: 100, refill_per_sec: 100.0 }
        }
        async fn fetch_spot(&self, _coin_key: &str, _chain: ChainId) -> Result<PriceQuote, ProviderError> {
            Ok(PriceQuote {
                price_usd: dec!(2.0),
                source: crate::types::PriceSource::SpotAggregatorA,
                as_of: Utc::now(),
                market_cap_usd: None,
                volume_24h_usd: None,
                liquidity_usd: None,
                price_change_24h_pct: None,
                confidence: dec!(0.9),
            })
        }
        async fn fetch_at(&self, _coin_key: &str, _chain: ChainId, _ts: DateTime<Utc>) -> Result<PriceQuote, ProviderError> {
            Ok(PriceQuote {
                price_usd: dec!(1.0),
                source: crate::types::PriceSource::HistoricalOhlc,
                as_of: Utc::now(),
                market_cap_usd: None,
                volume_24h_usd: None,
                liquidity_usd: None,
                price_change_24h_pct: None,
                confidence: dec!(0.8),
            })
        }
        async fn fetch_ohlc(
            &self,
            _coin_key: &str,
            _chain: ChainId,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
            _granularity: Granularity,
        ) -> Result<Vec<Candle>, ProviderError> {
            Ok(vec![])
        }
    }

    fn fabric_with(providers: Vec<Arc<dyn PriceProvider>>) -> PricingFabric {
        let mut map = HashMap::new();
        map.insert(ChainId::Other, providers);
        PricingFabric::new(map, 100, Duration::from_secs(7200), 1000, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn failover_to_next_provider_on_failure() {
        let fabric = fabric_with(vec![
            Arc::new(AlwaysFails { calls: AtomicU32::new(0) }),
            Arc::new(AlwaysSucceeds),
        ]);
        let quote = fabric.get_current("SOL", ChainId::Other).await.unwrap();
        assert_eq!(quote.price_usd, dec!(2.0));
    }

    #[tokio::test]
    async fn all_sources_unavailable_when_every_provider_fails() {
        let fabric = fabric_with(vec![Arc::new(AlwaysFails { calls: AtomicU32::new(0) })]);
        let err = fabric.get_current("SOL", ChainId::Other).await.unwrap_err();
        assert!(matches!(err, PricingError::AllSourcesUnavailable { .. }));
    }

    #[tokio::test]
    async fn hot_cache_avoids_second_provider_call() {
        let fabric = fabric_with(vec![Arc::new(AlwaysSucceeds)]);
        fabric.get_current("SOL", ChainId::Other).await.unwrap();
        let quote = fabric.get_current("SOL", ChainId::Other).await.unwrap();
        assert_eq!(quote.price_usd, dec!(2.0));
    }

    #[tokio::test]
    async fn resolve_entry_uses_message_text_band_when_no_discrepancy() {
        let fabric = fabric_with(vec![Arc::new(AlwaysSucceeds)]);
        let mention = TokenMention {
            symbol: Some("SOL".to_string()),
            address: None,
            chain: ChainId::Other,
            text_price: Some(dec!(1.02)),
            price_out_of_range: false,
        };
        let resolution = fabric.resolve_entry(&mention, Utc::now()).await.unwrap();
        assert_eq!(resolution.source_tag, EntrySourceTag::MessageText);
        assert!(resolution.confidence >= 0.70 && resolution.confidence <= 0.95);
    }
}
