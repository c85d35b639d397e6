//! Simulated crypto price feed.
//!
//! Prices are fixed base prices with a small random wobble so the wallet
//! screens move a little between refreshes. There is no external feed.

use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Default wobble applied to every quote: +/-100 basis points (1%)
pub const DEFAULT_JITTER_BPS: i64 = 100;
/// Fallback network fee for symbols without an entry
const DEFAULT_NETWORK_FEE: Decimal = dec!(0.001);

struct Asset {
    symbol: &'static str,
    name: &'static str,
    icon: &'static str,
    base_price: Decimal,
    networks: &'static [&'static str],
    network_fee: Decimal,
}

const ASSETS: [Asset; 8] = [
    Asset {
        symbol: "BTC",
        name: "Bitcoin",
        icon: "₿",
        base_price: dec!(67500),
        networks: &["Bitcoin Network"],
        network_fee: dec!(0.0001),
    },
    Asset {
        symbol: "ETH",
        name: "Ethereum",
        icon: "Ξ",
        base_price: dec!(3450),
        networks: &["ERC20", "Arbitrum", "Optimism"],
        network_fee: dec!(0.002),
    },
    Asset {
        symbol: "USDT",
        name: "Tether",
        icon: "₮",
        base_price: dec!(1.00),
        networks: &["ERC20", "TRC20", "BEP20"],
        network_fee: dec!(1),
    },
    Asset {
        symbol: "USDC",
        name: "USD Coin",
        icon: "$",
        base_price: dec!(1.00),
        networks: &["ERC20", "TRC20", "BEP20", "Solana"],
        network_fee: dec!(1),
    },
    Asset {
        symbol: "BNB",
        name: "Binance Coin",
        icon: "B",
        base_price: dec!(595),
        networks: &["BEP20", "BEP2"],
        network_fee: dec!(0.001),
    },
    Asset {
        symbol: "XRP",
        name: "Ripple",
        icon: "X",
        base_price: dec!(0.52),
        networks: &["Ripple Network"],
        network_fee: dec!(0.1),
    },
    Asset {
        symbol: "SOL",
        name: "Solana",
        icon: "S",
        base_price: dec!(145),
        networks: &["Solana Network"],
        network_fee: dec!(0.01),
    },
    Asset {
        symbol: "ADA",
        name: "Cardano",
        icon: "A",
        base_price: dec!(0.45),
        networks: &["Cardano Network"],
        network_fee: dec!(0.5),
    },
];

fn asset(symbol: &str) -> Option<&'static Asset> {
    ASSETS.iter().find(|a| a.symbol.eq_ignore_ascii_case(symbol))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoPrice {
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
    pub change_24h: Decimal,
    pub icon: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PriceFeed {
    jitter_bps: i64,
}

impl Default for PriceFeed {
    fn default() -> Self {
        Self::simulated(DEFAULT_JITTER_BPS)
    }
}

impl PriceFeed {
    pub fn simulated(jitter_bps: i64) -> Self {
        Self {
            jitter_bps: jitter_bps.abs(),
        }
    }

    /// Base prices with no wobble
    pub fn fixed() -> Self {
        Self { jitter_bps: 0 }
    }

    pub fn supported_symbols() -> impl Iterator<Item = &'static str> {
        ASSETS.iter().map(|a| a.symbol)
    }

    pub fn is_supported(symbol: &str) -> bool {
        asset(symbol).is_some()
    }

    /// Display name for a symbol ("BTC" -> "Bitcoin")
    pub fn name(symbol: &str) -> Option<&'static str> {
        asset(symbol).map(|a| a.name)
    }

    pub fn networks(symbol: &str) -> Option<&'static [&'static str]> {
        asset(symbol).map(|a| a.networks)
    }

    pub fn network_fee(symbol: &str) -> Decimal {
        asset(symbol).map(|a| a.network_fee).unwrap_or(DEFAULT_NETWORK_FEE)
    }

    /// Every symbol with its networks, keyed for the prices endpoint
    pub fn network_options() -> Vec<(&'static str, &'static [&'static str])> {
        ASSETS.iter().map(|a| (a.symbol, a.networks)).collect()
    }

    fn wobble(&self) -> Decimal {
        if self.jitter_bps == 0 {
            return Decimal::ONE;
        }
        let bps = rand::thread_rng().gen_range(-self.jitter_bps..=self.jitter_bps);
        Decimal::ONE + Decimal::new(bps, 4)
    }

    /// Current USD price of one unit, `None` for unsupported symbols
    pub fn quote(&self, symbol: &str) -> Option<Decimal> {
        asset(symbol).map(|a| a.base_price * self.wobble())
    }

    pub fn snapshot(&self) -> Vec<CryptoPrice> {
        let mut rng = rand::thread_rng();
        ASSETS
            .iter()
            .map(|a| {
                let change_24h = if self.jitter_bps == 0 {
                    Decimal::ZERO
                } else {
                    Decimal::new(rng.gen_range(-500..=500), 2)
                };
                CryptoPrice {
                    symbol: a.symbol.to_string(),
                    name: a.name.to_string(),
                    price: a.base_price * self.wobble(),
                    change_24h,
                    icon: a.icon.to_string(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_feed_returns_base_prices() {
        let feed = PriceFeed::fixed();
        assert_eq!(feed.quote("BTC"), Some(dec!(67500)));
        assert_eq!(feed.quote("eth"), Some(dec!(3450)));
        assert_eq!(feed.quote("DOGE"), None);
    }

    #[test]
    fn simulated_quotes_stay_within_one_percent() {
        let feed = PriceFeed::default();
        for _ in 0..200 {
            let price = feed.quote("SOL").unwrap();
            assert!(price >= dec!(143.55) && price <= dec!(146.45), "{price}");
        }
    }

    #[test]
    fn snapshot_covers_every_symbol() {
        let prices = PriceFeed::default().snapshot();
        let symbols: Vec<_> = prices.iter().map(|p| p.symbol.as_str()).collect();
        assert_eq!(symbols, ["BTC", "ETH", "USDT", "USDC", "BNB", "XRP", "SOL", "ADA"]);
        for p in &prices {
            assert!(p.change_24h.abs() <= dec!(5));
        }
    }

    #[test]
    fn network_fees_and_options() {
        assert_eq!(PriceFeed::network_fee("BTC"), dec!(0.0001));
        assert_eq!(PriceFeed::network_fee("ADA"), dec!(0.5));
        assert_eq!(PriceFeed::network_fee("DOGE"), dec!(0.001));
        assert_eq!(PriceFeed::networks("USDC"), Some(&["ERC20", "TRC20", "BEP20", "Solana"][..]));
        assert!(PriceFeed::networks("DOGE").is_none());
        assert_eq!(PriceFeed::name("XRP"), Some("Ripple"));
    }
}
