//! Text-price detection (§4.1): `(bought|entry|at|@)\s*\$?(\d+(\.\d+)?)`,
//! accepted only within `[1e-8, 1e6]`.

use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const MIN_TEXT_PRICE: Decimal = dec!(0.00000001);
const MAX_TEXT_PRICE: Decimal = dec!(1000000);

fn price_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:bought|entry|at|@)\s*\$?(\d+(?:\.\d+)?)").expect("static price pattern")
    })
}

/// Outcome of a text-price parse attempt, distinguishing "no pattern
/// matched" from "pattern matched but value fell outside the accepted
/// range" (§4.1 failure modes: the out-of-range flag is recorded, not a
/// hard error).
pub enum PriceParse {
    None,
    Accepted(Decimal),
    OutOfRange(Decimal),
}

/// Parse the first matching price literal out of `text`.
pub fn extract_text_price(text: &str) -> PriceParse {
    let Some(cap) = price_pattern().captures(text) else {
        return PriceParse::None;
    };
    let Some(raw) = cap.get(1) else {
        return PriceParse::None;
    };
    let Ok(value) = raw.as_str().parse::<Decimal>() else {
        return PriceParse::None;
    };
    if value >= MIN_TEXT_PRICE && value <= MAX_TEXT_PRICE {
        PriceParse::Accepted(value)
    } else {
        PriceParse::OutOfRange(value)
    }
}
