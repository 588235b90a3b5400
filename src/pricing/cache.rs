//! Hot price cache and historical OHLC cache (§4.2).
//!
//! Both are the only shared mutable structures inside the Pricing Fabric
//! (§5) and use the `lru` crate, grounded in the pack's
//! `chainflip-io-chainflip-backend` dependency table.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use lru::LruCache;
use parking_lot::Mutex;

use crate::pricing::provider::{Candle, PriceQuote};
use crate::types::{ChainId, Granularity};

type HotKey = (String, ChainId);

struct HotEntry {
    quote: PriceQuote,
    cached_at: Instant,
}

/// Bounded in-memory cache for `get_current` results, TTL-gated and
/// LRU-evicted under its size cap.
pub struct HotCache {
    ttl: Duration,
    inner: Mutex<LruCache<HotKey, HotEntry>>,
}

impl HotCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity > 0");
        Self {
            ttl,
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn get(&self, coin_key: &str, chain: ChainId) -> Option<PriceQuote> {
        let key = (coin_key.to_string(), chain);
        let mut inner = self.inner.lock();
        let entry = inner.get(&key)?;
        if entry.cached_at.elapsed() > self.ttl {
            inner.pop(&key);
            return None;
        }
        Some(entry.quote.clone())
    }

    pub fn put(&self, coin_key: &str, chain: ChainId, quote: PriceQuote) {
        let key = (coin_key.to_string(), chain);
        self.inner.lock().put(
            key,
            HotEntry {
                quote,
                cached_at: Instant::now(),
            },
        );
    }
}

type HistoricalKey = (String, ChainId, NaiveDate, GranularityKey);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GranularityKey(u8);

impl From<Granularity> for GranularityKey {
    fn from(g: Granularity) -> Self {
        match g {
            Granularity::Hourly => GranularityKey(0),
        }
    }
}

/// Immutable historical-OHLC cache. Historical prices never change once
/// observed, so entries carry no TTL — only an overall candle-count budget
/// enforced via LRU eviction of whole day-buckets.
pub struct HistoricalCache {
    max_candles: usize,
    inner: Mutex<LruCache<HistoricalKey, Vec<Candle>>>,
    stored_candles: Mutex<usize>,
}

impl HistoricalCache {
    pub fn new(max_candles: usize) -> Self {
        // Unbounded logical capacity; a day-bucket budget is enforced
        // separately by candle count, so the underlying LRU itself is sized
        // generously by entry count.
        let cap = NonZeroUsize::new(100_000).expect("static capacity");
        Self {
            max_candles,
            inner: Mutex::new(LruCache::new(cap)),
            stored_candles: Mutex::new(0),
        }
    }

    pub fn get(
        &self,
        coin_key: &str,
        chain: ChainId,
        date: NaiveDate,
        granularity: Granularity,
    ) -> Option<Vec<Candle>> {
        let key = (coin_key.to_string(), chain, date, granularity.into());
        self.inner.lock().get(&key).cloned()
    }

    pub fn put(
        &self,
        coin_key: &str,
        chain: ChainId,
        date: NaiveDate,
        granularity: Granularity,
        candles: Vec<Candle>,
    ) {
        let key = (coin_key.to_string(), chain, date, granularity.into());
        let incoming_len = candles.len();

        let mut inner = self.inner.lock();
        let mut stored = self.stored_candles.lock();

        if let Some(old) = inner.put(key, candles) {
            *stored = stored.saturating_sub(old.len());
        }
        *stored += incoming_len;

        while *stored > self.max_candles {
            match inner.pop_lru() {
                Some((_, evicted)) => *stored = stored.saturating_sub(evicted.len()),
                None => break,
            }
        }
    }
}

/// Convert a quote timestamp to the day bucket used for historical caching.
pub fn day_bucket(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceSource;
    use rust_decimal_macros::dec;

    fn quote() -> PriceQuote {
        PriceQuote {
            price_usd: dec!(1.0),
            source: PriceSource::PrimaryDex,
            as_of: Utc::now(),
            market_cap_usd: None,
            volume_24h_usd: None,
            liquidity_usd: None,
            price_change_24h_pct: None,
            confidence: dec!(1.0),
        }
    }

    #[test]
    fn hot_cache_round_trips_within_ttl() {
        let cache = HotCache::new(10, Duration::from_secs(60));
        cache.put("BTC", ChainId::Other, quote());
        assert!(cache.get("BTC", ChainId::Other).is_some());
    }

    #[test]
    fn hot_cache_expires_after_ttl() {
        let cache = HotCache::new(10, Duration::from_millis(1));
        cache.put("BTC", ChainId::Other, quote());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("BTC", ChainId::Other).is_none());
    }

    #[test]
    fn historical_cache_evicts_past_candle_budget() {
        let cache = HistoricalCache::new(5);
        let day1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let candle = Candle {
            open_time: Utc::now(),
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: dec!(1),
        };
        cache.put("BTC", ChainId::Other, day1, Granularity::Hourly, vec![candle; 3]);
        cache.put("BTC", ChainId::Other, day2, Granularity::Hourly, vec![candle; 4]);
        // day1 (3 candles) should be evicted once day2 pushes total to 7 > 5.
        assert!(cache.get("BTC", ChainId::Other, day1, Granularity::Hourly).is_none());
        assert!(cache.get("BTC", ChainId::Other, day2, Granularity::Hourly).is_some());
    }
}
