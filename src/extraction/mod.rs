//! Mention Extractor (§4.1): per-message extraction of coin mentions.

pub mod address;
pub mod price;
pub mod symbol;

use rust_decimal::Decimal;

use crate::message::Message;
use crate::types::ChainId;
use price::PriceParse;

/// A candidate coin mention extracted from a message. Transient: only
/// materializes into a [`crate::outcome::Signal`] if pricing succeeds (§3).
#[derive(Debug, Clone)]
pub struct TokenMention {
    pub symbol: Option<String>,
    pub address: Option<String>,
    pub chain: ChainId,
    pub text_price: Option<Decimal>,
    /// Set when a text-price pattern matched but the value fell outside
    /// `[1e-8, 1e6]`; the value itself is dropped (§4.1).
    pub price_out_of_range: bool,
}

impl TokenMention {
    /// `coin_key` per §3: the address if present, else the normalized symbol.
    pub fn coin_key(&self) -> String {
        self.address
            .clone()
            .unwrap_or_else(|| self.symbol.clone().unwrap_or_default())
    }
}

/// Extract zero or more [`TokenMention`]s from a message. A message with
/// neither a recognized symbol nor a valid address yields no mentions (not
/// an error).
pub fn extract_mentions(message: &Message) -> Vec<TokenMention> {
    let (text_price, price_out_of_range) = match price::extract_text_price(&message.text) {
        PriceParse::Accepted(p) => (Some(p), false),
        PriceParse::OutOfRange(_) => (None, true),
        PriceParse::None => (None, false),
    };

    let symbols = symbol::extract_symbols(&message.text);
    let address_match = address::extract_address(&message.text);

    let mut mentions = Vec::new();

    if let Some(addr) = &address_match {
        mentions.push(TokenMention {
            symbol: symbols.first().cloned(),
            address: Some(addr.address.clone()),
            chain: addr.chain,
            text_price,
            price_out_of_range,
        });
    }

    let skip_first = address_match.is_some();
    for (i, sym) in symbols.into_iter().enumerate() {
        if skip_first && i == 0 {
            continue;
        }
        mentions.push(TokenMention {
            symbol: Some(sym),
            address: None,
            chain: ChainId::Other,
            text_price,
            price_out_of_range,
        });
    }

    mentions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Engagement;
    use chrono::Utc;

    fn msg(text: &str) -> Message {
        Message {
            id: 1,
            channel_id: "c1".into(),
            timestamp: Utc::now(),
            text: text.to_string(),
            engagement: Engagement::default(),
        }
    }

    #[test]
    fn no_mention_yields_empty() {
        assert!(extract_mentions(&msg("gm frens")).is_empty());
    }

    #[test]
    fn symbol_only_mention() {
        let mentions = extract_mentions(&msg("bought $SOL at $1.47"));
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].symbol.as_deref(), Some("SOL"));
        assert_eq!(mentions[0].coin_key(), "SOL");
    }

    #[test]
    fn address_mention_fixes_chain() {
        let text = "bought at 0x1234567890abcdef1234567890abcdef12345678";
        let mentions = extract_mentions(&msg(text));
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].chain, ChainId::Ethereum);
        assert!(mentions[0].address.is_some());
    }
}
