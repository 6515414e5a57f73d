pub mod price;
pub mod report;
pub mod transfer;

pub use price::{PricePoint, PriceProvenance, PriceSample};
pub use report::{
    AnalysisPeriod, AnalysisStatus, DamageRank, Diagnostic, DiamondHandsWin, EmotionalDamageScore,
    RegretReport, RegretStats, TokenRegret, PATIENCE_FLOOR,
};
pub use transfer::{RawTransfer, TokenInfo, Transfer};

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Transfer direction relative to the analyzed wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// Derive the direction of a transfer for `wallet`. Returns `None` when the
    /// wallet is not a party to the transfer, or is both sender and recipient.
    pub fn for_wallet(wallet: &str, from: &str, to: &str) -> Option<Self> {
        let is_recipient = to.eq_ignore_ascii_case(wallet);
        let is_sender = from.eq_ignore_ascii_case(wallet);

        match (is_recipient, is_sender) {
            (true, false) => Some(Direction::Buy),
            (false, true) => Some(Direction::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// EVM chains with at least one supported price and transfer source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Polygon,
    Bsc,
    Arbitrum,
    Optimism,
    Base,
    Avalanche,
}

impl Chain {
    pub fn from_id(chain_id: u64) -> Option<Self> {
        match chain_id {
            1 => Some(Chain::Ethereum),
            137 => Some(Chain::Polygon),
            56 => Some(Chain::Bsc),
            42161 => Some(Chain::Arbitrum),
            10 => Some(Chain::Optimism),
            8453 => Some(Chain::Base),
            43114 => Some(Chain::Avalanche),
            _ => None,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Polygon => 137,
            Chain::Bsc => 56,
            Chain::Arbitrum => 42161,
            Chain::Optimism => 10,
            Chain::Base => 8453,
            Chain::Avalanche => 43114,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Polygon => "polygon",
            Chain::Bsc => "bsc",
            Chain::Arbitrum => "arbitrum",
            Chain::Optimism => "optimism",
            Chain::Base => "base",
            Chain::Avalanche => "avalanche",
        }
    }

    /// Asset-platform id used by the price index.
    pub fn price_platform(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Polygon => "polygon-pos",
            Chain::Bsc => "binance-smart-chain",
            Chain::Arbitrum => "arbitrum-one",
            Chain::Optimism => "optimistic-ethereum",
            Chain::Base => "base",
            Chain::Avalanche => "avalanche",
        }
    }

    /// Chain slug used by the DEX aggregator.
    pub fn dex_slug(&self) -> &'static str {
        self.as_str()
    }

    /// Network subdomain of the transfer indexer, if it covers this chain.
    pub fn indexer_network(&self) -> Option<&'static str> {
        match self {
            Chain::Ethereum => Some("eth-mainnet"),
            Chain::Polygon => Some("polygon-mainnet"),
            Chain::Arbitrum => Some("arb-mainnet"),
            Chain::Optimism => Some("opt-mainnet"),
            Chain::Base => Some("base-mainnet"),
            Chain::Bsc | Chain::Avalanche => None,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical lowercase key for an address (wallet or token contract).
pub fn address_key(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// `0x` followed by 40 hex digits.
pub fn is_evm_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALLET: &str = "0xAbC0000000000000000000000000000000000001";

    #[test]
    fn test_direction_recipient_is_buy() {
        let dir = Direction::for_wallet(WALLET, "0xdead", &WALLET.to_lowercase());
        assert_eq!(dir, Some(Direction::Buy));
    }

    #[test]
    fn test_direction_sender_is_sell() {
        let dir = Direction::for_wallet(WALLET, &WALLET.to_uppercase().replace("0X", "0x"), "0xbeef");
        assert_eq!(dir, Some(Direction::Sell));
    }

    #[test]
    fn test_direction_unrelated_or_self_transfer() {
        assert_eq!(Direction::for_wallet(WALLET, "0x1", "0x2"), None);
        assert_eq!(Direction::for_wallet(WALLET, WALLET, WALLET), None);
    }

    #[test]
    fn test_chain_id_round_trip() {
        for id in [1, 137, 56, 42161, 10, 8453, 43114] {
            let chain = Chain::from_id(id).expect("known chain");
            assert_eq!(chain.id(), id);
        }
        assert_eq!(Chain::from_id(999_999), None);
    }

    #[test]
    fn test_is_evm_address() {
        assert!(is_evm_address(WALLET));
        assert!(!is_evm_address("0x123"));
        assert!(!is_evm_address("AbC00000000000000000000000000000000000000001"));
        assert!(!is_evm_address("0xZZC0000000000000000000000000000000000001"));
    }
}
