use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Direction;

/// Significant digits a `Decimal` mantissa can hold.
const MAX_DECIMAL_DIGITS: usize = 28;
/// Largest `decimals` a token can declare; a uint256 has 78 digits.
const MAX_TOKEN_DECIMALS: u32 = 77;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Contract address, always lowercase.
    pub address: String,
    pub symbol: String,
    pub name: String,
}

impl TokenInfo {
    pub fn new(address: &str, symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: super::address_key(address),
            symbol: symbol.into(),
            name: name.into(),
        }
    }
}

/// A transfer as returned by one upstream source, before it is placed
/// relative to the analyzed wallet.
#[derive(Debug, Clone)]
pub struct RawTransfer {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub token: TokenInfo,
    pub amount: Decimal,
    pub timestamp: Option<DateTime<Utc>>,
    pub value_usd: Option<Decimal>,
}

/// Normalized transfer of one token into or out of the analyzed wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub hash: String,
    pub direction: Direction,
    pub token: TokenInfo,
    pub amount: Decimal,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub value_usd: Option<Decimal>,
}

impl Transfer {
    /// Key used to drop duplicates when merging upstream result sets.
    pub fn dedup_key(&self) -> (String, String) {
        (self.hash.to_ascii_lowercase(), self.token.address.clone())
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transfer: {} {} {} at {} (tx {})",
            self.direction,
            self.amount,
            self.token.symbol,
            self.timestamp.timestamp(),
            self.hash.chars().take(10).collect::<String>(),
        )
    }
}

/// Convert an integer base-unit amount (`raw`, decimal digits) into a token
/// amount with `decimals` fractional digits.
///
/// Fractional digits that do not fit a `Decimal` mantissa are truncated.
/// Returns `None` for non-numeric input, integer parts that overflow, or a
/// `decimals` no real token declares.
pub fn scale_raw_amount(raw: &str, decimals: u32) -> Option<Decimal> {
    if decimals > MAX_TOKEN_DECIMALS {
        return None;
    }
    let digits = raw.trim().trim_start_matches('0');
    if digits.is_empty() {
        return if raw.trim().chars().all(|c| c == '0') && !raw.trim().is_empty() {
            Some(Decimal::ZERO)
        } else {
            None
        };
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let decimals = decimals as usize;
    let (int_part, frac_part) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{digits:0>decimals$}"))
    };

    let int_len = if int_part == "0" { 0 } else { int_part.len() };
    if int_len > MAX_DECIMAL_DIGITS {
        return None;
    }
    let keep = frac_part.len().min(MAX_DECIMAL_DIGITS - int_len);
    let frac = frac_part[..keep].trim_end_matches('0');

    let text = if frac.is_empty() {
        int_part
    } else {
        format!("{int_part}.{frac}")
    };
    Decimal::from_str(&text).ok().map(|d| d.normalize())
}

/// Parse a `0x`-prefixed hex quantity into its decimal digit string.
pub fn hex_to_decimal_string(hex: &str) -> Option<String> {
    let body = hex.trim().trim_start_matches("0x").trim_start_matches("0X");
    if body.is_empty() {
        return None;
    }
    u128::from_str_radix(body, 16).ok().map(|v| v.to_string())
}
