use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::ledger::CryptoHolding;

/// Symbols every new wallet starts with, in display order
pub const SUPPORTED_ASSETS: [(&str, &str); 8] = [
    ("BTC", "Bitcoin"),
    ("ETH", "Ethereum"),
    ("USDT", "Tether"),
    ("USDC", "USD Coin"),
    ("BNB", "Binance Coin"),
    ("XRP", "Ripple"),
    ("SOL", "Solana"),
    ("ADA", "Cardano"),
];

/// One symbol held by one user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CryptoBalance {
    pub user_id: Uuid,
    pub symbol: String,
    pub currency: String,
    pub balance: Decimal,
    pub locked_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CryptoBalance {
    pub fn holding(&self) -> CryptoHolding {
        CryptoHolding {
            balance: self.balance,
            locked: self.locked_balance,
        }
    }

    pub fn available(&self) -> Decimal {
        self.holding().available()
    }
}

/// A user's wallet: their balance rows across all supported symbols
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoWallet {
    pub user_id: Uuid,
    pub balances: Vec<CryptoBalance>,
}

impl CryptoWallet {
    pub fn get(&self, symbol: &str) -> Option<&CryptoBalance> {
        self.balances.iter().find(|b| b.symbol == symbol)
    }

    /// Insert the supported symbols with zero balances. Existing rows are
    /// left alone, so this is safe to call on every wallet read.
    pub async fn ensure_in_tx(tx: &mut Transaction<'_, Postgres>, user_id: Uuid) -> Result<(), sqlx::Error> {
        for (symbol, currency) in SUPPORTED_ASSETS {
            sqlx::query(
                "INSERT INTO crypto_balances (user_id, symbol, currency)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (user_id, symbol) DO NOTHING"
            )
            .bind(user_id)
            .bind(symbol)
            .bind(currency)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    pub async fn find(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, CryptoBalance>(
            "SELECT * FROM crypto_balances WHERE user_id = $1"
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::from_rows(user_id, rows)))
    }

    pub async fn get_or_create(pool: &PgPool, user_id: Uuid) -> Result<Self, sqlx::Error> {
        if let Some(wallet) = Self::find(pool, user_id).await? {
            if wallet.balances.len() >= SUPPORTED_ASSETS.len() {
                return Ok(wallet);
            }
        }

        let mut tx = pool.begin().await?;
        Self::ensure_in_tx(&mut tx, user_id).await?;
        tx.commit().await?;

        tracing::info!("Created crypto wallet for user {}", user_id);

        let rows = sqlx::query_as::<_, CryptoBalance>(
            "SELECT * FROM crypto_balances WHERE user_id = $1"
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(Self::from_rows(user_id, rows))
    }

    /// Lock one symbol row for the rest of the transaction, creating the
    /// wallet first if needed.
    pub async fn lock_row_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        symbol: &str,
    ) -> Result<Option<CryptoBalance>, sqlx::Error> {
        Self::ensure_in_tx(tx, user_id).await?;

        sqlx::query_as::<_, CryptoBalance>(
            "SELECT * FROM crypto_balances WHERE user_id = $1 AND symbol = $2 FOR UPDATE"
        )
        .bind(user_id)
        .bind(symbol)
        .fetch_optional(&mut **tx)
        .await
    }

    pub async fn save_holding_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        symbol: &str,
        holding: CryptoHolding,
    ) -> Result<CryptoBalance, sqlx::Error> {
        sqlx::query_as::<_, CryptoBalance>(
            "UPDATE crypto_balances
             SET balance = $3, locked_balance = $4, updated_at = NOW()
             WHERE user_id = $1 AND symbol = $2
             RETURNING *"
        )
        .bind(user_id)
        .bind(symbol)
        .bind(holding.balance)
        .bind(holding.locked)
        .fetch_one(&mut **tx)
        .await
    }

    fn from_rows(user_id: Uuid, mut rows: Vec<CryptoBalance>) -> Self {
        let position = |symbol: &str| {
            SUPPORTED_ASSETS
                .iter()
                .position(|(s, _)| *s == symbol)
                .unwrap_or(SUPPORTED_ASSETS.len())
        };
        rows.sort_by_key(|row| position(&row.symbol));
        Self { user_id, balances: rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(symbol: &str, balance: Decimal, locked: Decimal) -> CryptoBalance {
        CryptoBalance {
            user_id: Uuid::nil(),
            symbol: symbol.into(),
            currency: symbol.into(),
            balance,
            locked_balance: locked,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rows_are_ordered_like_the_supported_list() {
        let wallet = CryptoWallet::from_rows(
            Uuid::nil(),
            vec![
                row("ADA", Decimal::ZERO, Decimal::ZERO),
                row("BTC", Decimal::ZERO, Decimal::ZERO),
                row("ETH", Decimal::ZERO, Decimal::ZERO),
            ],
        );
        let symbols: Vec<_> = wallet.balances.iter().map(|b| b.symbol.as_str()).collect();
        assert_eq!(symbols, ["BTC", "ETH", "ADA"]);
    }

    #[test]
    fn available_excludes_locked() {
        let btc = row("BTC", dec!(1.5), dec!(0.5001));
        assert_eq!(btc.available(), dec!(0.9999));
    }

    #[test]
    fn supported_assets_match_price_feed() {
        for (symbol, name) in SUPPORTED_ASSETS {
            assert_eq!(crate::prices::PriceFeed::name(symbol), Some(name));
        }
    }
}
