//! Symbol detection: `$TICKER` or bare `TICKER` against a domain vocabulary.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Tokens that look like tickers but are never coins. Closed deny-list per
/// §4.1 ("USD, NFT, CEO, ROI, ATH, ...").
const DENY_LIST: &[&str] = &[
    "USD", "USDT", "USDC", "NFT", "CEO", "CTO", "ROI", "ATH", "ATL", "DYOR", "FOMO", "FUD",
    "PUMP", "DUMP", "MOON", "APY", "APR", "TVL", "DEX", "CEX", "KYC", "AML", "GDP", "API", "URL",
];

/// A small seed vocabulary of recognized ticker symbols. A production
/// deployment would load this from an exchange symbol list; the extractor's
/// contract only requires *some* domain vocabulary to match against.
const VOCABULARY: &[&str] = &[
    "BTC", "ETH", "SOL", "BNB", "XRP", "ADA", "DOGE", "SHIB", "MATIC", "DOT", "AVAX", "LINK",
    "UNI", "LTC", "ATOM", "NEAR", "APT", "ARB", "OP", "SUI", "PEPE", "WIF", "BONK", "FLOKI",
    "INJ", "TIA", "SEI", "JUP", "RENDER", "FET", "RUNE", "AVICI", "SCAM",
];

fn deny_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| DENY_LIST.iter().copied().collect())
}

fn vocabulary_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| VOCABULARY.iter().copied().collect())
}

fn token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$?([A-Za-z]{2,10})\b").expect("static symbol pattern"))
}

/// Scan `text` for candidate ticker symbols, upper-cased, 2-10 chars,
/// present in [`VOCABULARY`] and absent from [`DENY_LIST`].
pub fn extract_symbols(text: &str) -> Vec<String> {
    let deny = deny_set();
    let vocab = vocabulary_set();

    let mut found = Vec::new();
    for cap in token_pattern().captures_iter(text) {
        let raw = &cap[1];
        if raw.len() < 2 || raw.len() > 10 {
            continue;
        }
        let upper = raw.to_uppercase();
        if deny.contains(upper.as_str()) {
            continue;
        }
        if !vocab.contains(upper.as_str()) {
            continue;
        }
        if !found.contains(&upper) {
            found.push(upper);
        }
    }
    found
}
