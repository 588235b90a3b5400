//! Address detection: exact chain-specific regexes. Matching implicitly
//! fixes the mention's `chain` (§4.1).

use std::sync::OnceLock;

use regex::Regex;

use crate::types::ChainId;

fn ethereum_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b0x[0-9a-fA-F]{40}\b").expect("static ethereum pattern"))
}

fn solana_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Base58 alphabet excludes 0, O, I, l. Solana addresses are 32-44 chars.
    RE.get_or_init(|| {
        Regex::new(r"\b[1-9A-HJ-NP-Za-km-z]{32,44}\b").expect("static solana pattern")
    })
}

/// A detected on-chain address plus the chain it implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMatch {
    pub address: String,
    pub chain: ChainId,
}

/// Find the first chain-specific address in `text`. Ethereum is checked
/// before Solana since `0x...` strings would otherwise also satisfy the
/// looser base58 length window if it were checked first on mixed-case hex.
pub fn extract_address(text: &str) -> Option<AddressMatch> {
    if let Some(m) = ethereum_pattern().find(text) {
        return Some(AddressMatch {
            address: m.as_str().to_string(),
            chain: ChainId::Ethereum,
        });
    }
    if let Some(m) = solana_pattern().find(text) {
        return Some(AddressMatch {
            address: m.as_str().to_string(),
            chain: ChainId::Solana,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_ethereum_address() {
        let text = "token at 0x1234567890abcdef1234567890abcdef12345678 is live";
        let m = extract_address(text).unwrap();
        assert_eq!(m.chain, ChainId::Ethereum);
    }

    #[test]
    fn detects_solana_address() {
        let text = "CA: DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263 on pump.fun";
        let m = extract_address(text).unwrap();
        assert_eq!(m.chain, ChainId::Solana);
    }

    #[test]
    fn no_address_returns_none() {
        assert!(extract_address("just chatting about BTC today").is_none());
    }
}
