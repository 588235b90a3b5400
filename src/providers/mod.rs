//! Concrete [`PriceProvider`](crate::pricing::provider::PriceProvider)
//! implementations against public, unsigned market-data endpoints.
//!
//! The pricing boundary itself is source-agnostic (§6): these two clients
//! exist so the binary has something real to route through. Neither talks
//! to an authenticated account endpoint, so there's no request signing here
//! — just a plain `reqwest::Client` on a timeout, same as any other outbound
//! HTTP call in this codebase.

pub mod message_source;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tracing::instrument;

pub use message_source::HttpPollingMessageSource;

use crate::error::ProviderError;
use crate::pricing::provider::{Candle, Capability, PriceProvider, PriceQuote, RateBudget};
use crate::types::{ChainId, Granularity, PriceSource};

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    value.as_f64().and_then(|f| Decimal::try_from(f).ok())
}

fn map_status(status: reqwest::StatusCode) -> ProviderError {
    if status.as_u16() == 429 {
        ProviderError::RateLimited
    } else {
        ProviderError::Transport(format!("http {status}"))
    }
}

/// Dex Screener: on-chain pair data keyed by token contract address.
/// Spot only — it has no historical or range endpoints.
pub struct DexScreenerProvider {
    client: reqwest::Client,
    base_url: String,
}

impl DexScreenerProvider {
    pub fn new() -> Self {
        Self::with_base_url("https://api.dexscreener.com".to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client builds with static config");
        Self { client, base_url }
    }
}

impl Default for DexScreenerProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceProvider for DexScreenerProvider {
    fn name(&self) -> &str {
        "dexscreener"
    }

    fn source_tag(&self) -> PriceSource {
        PriceSource::PrimaryDex
    }

    fn capability_set(&self) -> &[Capability] {
        &[Capability::Spot]
    }

    fn rate_budget(&self) -> RateBudget {
        RateBudget { capacity: 60, refill_per_sec: 5.0 }
    }

    #[instrument(skip(self), name = "dexscreener::fetch_spot")]
    async fn fetch_spot(&self, coin_key: &str, _chain: ChainId) -> Result<PriceQuote, ProviderError> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, coin_key);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(map_status(resp.status()));
        }

        let body: Value = resp.json().await.map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let pair = body
            .get("pairs")
            .and_then(Value::as_array)
            .and_then(|pairs| pairs.first())
            .ok_or_else(|| ProviderError::Malformed("no pairs for token".to_string()))?;

        let price_usd = pair
            .get("priceUsd")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Decimal>().ok())
            .ok_or_else(|| ProviderError::Malformed("missing priceUsd".to_string()))?;

        Ok(PriceQuote {
            price_usd,
            source: PriceSource::PrimaryDex,
            as_of: Utc::now(),
            market_cap_usd: pair.get("fdv").and_then(decimal_from_json),
            volume_24h_usd: pair.get("volume").and_then(|v| v.get("h24")).and_then(decimal_from_json),
            liquidity_usd: pair.get("liquidity").and_then(|l| l.get("usd")).and_then(decimal_from_json),
            price_change_24h_pct: pair.get("priceChange").and_then(|c| c.get("h24")).and_then(decimal_from_json),
            confidence: Decimal::try_from(0.9).unwrap_or_default(),
        })
    }

    async fn fetch_at(
        &self,
        _coin_key: &str,
        _chain: ChainId,
        _ts: DateTime<Utc>,
    ) -> Result<PriceQuote, ProviderError> {
        Err(ProviderError::CapabilityMismatch)
    }

    async fn fetch_ohlc(
        &self,
        _coin_key: &str,
        _chain: ChainId,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
        _granularity: Granularity,
    ) -> Result<Vec<Candle>, ProviderError> {
        Err(ProviderError::CapabilityMismatch)
    }
}

/// CoinGecko: spot, point-in-time history, and ranged market charts, keyed
/// by the CoinGecko coin id. Upstream mention extraction hands us a symbol
/// or contract address (§3); mapping that to a CoinGecko id is a catalog
/// lookup this provider doesn't own, so callers are expected to pass a
/// `coin_key` that is already a valid CoinGecko id.
pub struct CoinGeckoProvider {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoProvider {
    pub fn new() -> Self {
        Self::with_base_url("https://api.coingecko.com/api/v3".to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client builds with static config");
        Self { client, base_url }
    }
}

impl Default for CoinGeckoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        "coingecko"
    }

    fn source_tag(&self) -> PriceSource {
        PriceSource::SpotAggregatorA
    }

    fn capability_set(&self) -> &[Capability] {
        &[Capability::Spot, Capability::At, Capability::Ohlc]
    }

    fn rate_budget(&self) -> RateBudget {
        RateBudget { capacity: 50, refill_per_sec: 0.8 }
    }

    #[instrument(skip(self), name = "coingecko::fetch_spot")]
    async fn fetch_spot(&self, coin_key: &str, _chain: ChainId) -> Result<PriceQuote, ProviderError> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd&include_market_cap=true&include_24hr_vol=true&include_24hr_change=true",
            self.base_url, coin_key
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(map_status(resp.status()));
        }

        let body: Value = resp.json().await.map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let entry = body
            .get(coin_key)
            .ok_or_else(|| ProviderError::Malformed(format!("unknown coin id {coin_key}")))?;

        let price_usd = entry
            .get("usd")
            .and_then(decimal_from_json)
            .ok_or_else(|| ProviderError::Malformed("missing usd price".to_string()))?;

        Ok(PriceQuote {
            price_usd,
            source: PriceSource::SpotAggregatorA,
            as_of: Utc::now(),
            market_cap_usd: entry.get("usd_market_cap").and_then(decimal_from_json),
            volume_24h_usd: entry.get("usd_24h_vol").and_then(decimal_from_json),
            liquidity_usd: None,
            price_change_24h_pct: entry.get("usd_24h_change").and_then(decimal_from_json),
            confidence: Decimal::try_from(0.85).unwrap_or_default(),
        })
    }

    #[instrument(skip(self), name = "coingecko::fetch_at")]
    async fn fetch_at(
        &self,
        coin_key: &str,
        _chain: ChainId,
        ts: DateTime<Utc>,
    ) -> Result<PriceQuote, ProviderError> {
        let date = ts.format("%d-%m-%Y").to_string();
        let url = format!("{}/coins/{}/history?date={}&localization=false", self.base_url, coin_key, date);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(map_status(resp.status()));
        }

        let body: Value = resp.json().await.map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let market_data = body
            .get("market_data")
            .ok_or_else(|| ProviderError::Malformed("no market_data for date".to_string()))?;

        let price_usd = market_data
            .get("current_price")
            .and_then(|p| p.get("usd"))
            .and_then(decimal_from_json)
            .ok_or_else(|| ProviderError::Malformed("missing historical usd price".to_string()))?;

        Ok(PriceQuote {
            price_usd,
            source: PriceSource::HistoricalOhlc,
            as_of: ts,
            market_cap_usd: market_data.get("market_cap").and_then(|m| m.get("usd")).and_then(decimal_from_json),
            volume_24h_usd: market_data.get("total_volume").and_then(|v| v.get("usd")).and_then(decimal_from_json),
            liquidity_usd: None,
            price_change_24h_pct: None,
            confidence: Decimal::try_from(0.75).unwrap_or_default(),
        })
    }

    /// CoinGecko's range endpoint returns point samples
    /// (`[timestamp_ms, value]`), not OHLC bars — the free tier doesn't
    /// expose candles directly. Each sample becomes a degenerate candle
    /// (open = high = low = close) so the rest of the engine can treat this
    /// provider the same as one with real OHLC data.
    #[instrument(skip(self), name = "coingecko::fetch_ohlc")]
    async fn fetch_ohlc(
        &self,
        coin_key: &str,
        _chain: ChainId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        _granularity: Granularity,
    ) -> Result<Vec<Candle>, ProviderError> {
        let url = format!(
            "{}/coins/{}/market_chart/range?vs_currency=usd&from={}&to={}",
            self.base_url,
            coin_key,
            from.timestamp(),
            to.timestamp()
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(map_status(resp.status()));
        }

        let body: Value = resp.json().await.map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let prices = body
            .get("prices")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::Malformed("missing prices array".to_string()))?;
        let volumes = body.get("total_volumes").and_then(Value::as_array);

        let mut candles = Vec::with_capacity(prices.len());
        for (i, point) in prices.iter().enumerate() {
            let pair = match point.as_array() {
                Some(p) if p.len() == 2 => p,
                _ => continue,
            };
            let ts_ms = match pair[0].as_i64() {
                Some(v) => v,
                None => continue,
            };
            let price = match decimal_from_json(&pair[1]) {
                Some(p) => p,
                None => continue,
            };
            let open_time = DateTime::from_timestamp_millis(ts_ms).unwrap_or(from);
            let volume = volumes
                .and_then(|v| v.get(i))
                .and_then(|v| v.as_array())
                .and_then(|v| v.get(1))
                .and_then(decimal_from_json)
                .unwrap_or_default();

            candles.push(Candle {
                open_time,
                open: price,
                high: price,
                low: price,
                close: price,
                volume,
            });
        }

        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_from_json_reads_numeric_fields() {
        let v: Value = serde_json::json!(1.2345);
        assert_eq!(decimal_from_json(&v), Decimal::try_from(1.2345).ok());
    }

    #[test]
    fn decimal_from_json_rejects_non_numbers() {
        let v: Value = serde_json::json!("not a number");
        assert_eq!(decimal_from_json(&v), None);
    }

    #[test]
    fn map_status_rate_limits_on_429() {
        assert!(matches!(map_status(reqwest::StatusCode::TOO_MANY_REQUESTS), ProviderError::RateLimited));
    }

    #[test]
    fn map_status_transport_on_other_errors() {
        assert!(matches!(
            map_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            ProviderError::Transport(_)
        ));
    }
}
