use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

/// Cash amounts are accepted with at most cent precision
pub const CASH_DECIMALS: u32 = 2;

pub fn round_cash(amount: Decimal) -> Decimal {
    amount.round_dp(CASH_DECIMALS)
}

/// Parse a user-typed amount such as `"$1,250.00"` by dropping everything
/// that is not a digit, a dot or a minus sign.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// Serde helper for amount fields that may arrive as a JSON number or as a
/// formatted string. Values that cannot be read as an amount become `None`
/// so the handler can answer with its own validation message.
pub fn flexible_amount<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => {
            let raw = n.to_string();
            Decimal::from_str(&raw)
                .or_else(|_| Decimal::from_scientific(&raw))
                .ok()
        }
        Some(serde_json::Value::String(s)) => parse_amount(&s),
        _ => None,
    })
}

/// `$1,234.56` style rendering for notifications and messages
pub fn format_usd(amount: Decimal) -> String {
    let sign = if amount.is_sign_negative() && !amount.is_zero() { "-" } else { "" };
    let rounded = round_cash(amount.abs());
    let text = format!("{:.2}", rounded);
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}${}.{}", sign, grouped, cents)
}
