use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::crypto_wallet::{CryptoBalance, CryptoWallet};
use super::reference::{self, ReferenceKind};
use super::User;
use crate::ledger::{
    AccountType, BalanceChange, ConversionQuote, Direction, LedgerError, SendQuote,
};
use crate::prices::PriceFeed;

pub const DEFAULT_REJECTION_REASON: &str = "Transaction rejected by admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CryptoTxType {
    Conversion,
    Send,
    Receive,
}

impl CryptoTxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CryptoTxType::Conversion => "conversion",
            CryptoTxType::Send => "send",
            CryptoTxType::Receive => "receive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "conversion" => Some(CryptoTxType::Conversion),
            "send" => Some(CryptoTxType::Send),
            "receive" => Some(CryptoTxType::Receive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CryptoTxStatus {
    Processing,
    PendingApproval,
    Approved,
    Rejected,
    Completed,
    Failed,
}

impl CryptoTxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CryptoTxStatus::Processing => "processing",
            CryptoTxStatus::PendingApproval => "pending_approval",
            CryptoTxStatus::Approved => "approved",
            CryptoTxStatus::Rejected => "rejected",
            CryptoTxStatus::Completed => "completed",
            CryptoTxStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CryptoTxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CryptoTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub status: String,
    pub from_currency: Option<String>,
    pub to_currency: Option<String>,
    pub from_amount: Option<Decimal>,
    pub to_amount: Option<Decimal>,
    pub exchange_rate: Option<Decimal>,
    pub from_account: Option<String>,
    pub crypto_currency: Option<String>,
    pub crypto_amount: Option<Decimal>,
    pub wallet_address: Option<String>,
    pub network: Option<String>,
    pub tx_hash: Option<String>,
    pub memo: Option<String>,
    pub fee: Decimal,
    pub usd_value: Option<Decimal>,
    pub reference: String,
    pub description: String,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pending send together with the customer it belongs to
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PendingSend {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub transaction: CryptoTransaction,
    pub user_name: String,
    pub user_email: String,
}

#[derive(Debug, Clone)]
pub struct SendRequest {
    pub symbol: String,
    pub amount: Decimal,
    pub wallet_address: String,
    pub network: String,
    pub memo: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub transaction: CryptoTransaction,
    pub quote: ConversionQuote,
    pub cash: BalanceChange,
    pub crypto: CryptoBalance,
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub transaction: CryptoTransaction,
    pub quote: SendQuote,
    pub balance: CryptoBalance,
}

/// A decided send and the wallet row after settlement or release
#[derive(Debug, Clone)]
pub struct SendDecision {
    pub transaction: CryptoTransaction,
    pub balance: CryptoBalance,
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("Unsupported cryptocurrency")]
    UnsupportedCurrency(String),
    #[error("Wallet address is required")]
    MissingWalletAddress,
    #[error("Invalid network selected")]
    InvalidNetwork(String),
    #[error("User not found")]
    UserNotFound,
    #[error("Transaction not found")]
    NotFound,
    #[error("Transaction already processed (status: {0})")]
    AlreadyProcessed(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// `bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh` -> `bc1qxy2kgdyg...kkfjhx0wlh`
fn shorten(address: &str, head: usize, tail: usize) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= head + tail {
        return address.to_string();
    }
    let start: String = chars[..head].iter().collect();
    let end: String = chars[chars.len() - tail..].iter().collect();
    format!("{}...{}", start, end)
}

/// Address as shown back to the customer
pub fn mask_address(address: &str) -> String {
    shorten(address, 12, 8)
}

fn normalize_symbol(symbol: &str) -> Result<String, CryptoError> {
    let symbol = symbol.trim().to_uppercase();
    if PriceFeed::is_supported(&symbol) {
        Ok(symbol)
    } else {
        Err(CryptoError::UnsupportedCurrency(symbol))
    }
}

impl CryptoTransaction {
    /// Total taken out of the wallet when this send settles
    pub fn send_total(&self) -> Decimal {
        self.crypto_amount.unwrap_or_default() + self.fee
    }

    /// Buy crypto with cash. The cash debit, the crypto credit and the
    /// conversion record commit together.
    pub async fn convert(
        pool: &PgPool,
        user_id: Uuid,
        symbol: &str,
        usd_amount: Decimal,
        from_account: AccountType,
        price: Decimal,
    ) -> Result<ConversionOutcome, CryptoError> {
        let symbol = normalize_symbol(symbol)?;
        let quote = ConversionQuote::usd_to_crypto(usd_amount, price)?;

        let mut tx = pool.begin().await?;

        let user = User::lock_in_tx(&mut tx, user_id)
            .await?
            .ok_or(CryptoError::UserNotFound)?;

        let mut balances = user.balances();
        let cash = balances.apply(from_account, Direction::Debit, quote.total_debit)?;
        User::set_balance_in_tx(&mut tx, user_id, from_account, cash.current).await?;

        let row = CryptoWallet::lock_row_in_tx(&mut tx, user_id, &symbol)
            .await?
            .ok_or_else(|| CryptoError::UnsupportedCurrency(symbol.clone()))?;
        let mut holding = row.holding();
        holding.credit(quote.crypto_amount)?;
        let crypto = CryptoWallet::save_holding_in_tx(&mut tx, user_id, &symbol, holding).await?;

        let description = format!(
            "Converted ${} USD to {} {}",
            usd_amount.round_dp(2),
            quote.crypto_amount.normalize(),
            symbol
        );

        let transaction = sqlx::query_as::<_, Self>(
            "INSERT INTO crypto_transactions (
                user_id, tx_type, status, from_currency, to_currency, from_amount, to_amount,
                exchange_rate, from_account, crypto_currency, crypto_amount, fee, usd_value,
                reference, description
             )
             VALUES ($1, 'conversion', 'completed', 'USD', $2, $3, $4, $5, $6, $2, $4, $7, $3, $8, $9)
             RETURNING *"
        )
        .bind(user_id)
        .bind(&symbol)
        .bind(quote.usd_amount)
        .bind(quote.crypto_amount)
        .bind(quote.exchange_rate)
        .bind(from_account.as_str())
        .bind(quote.fee)
        .bind(reference::generate(ReferenceKind::Conversion))
        .bind(&description)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Conversion {} for {}: {} {} -> {}, {} balance {}",
            transaction.reference,
            user.email,
            from_account,
            cash.previous,
            cash.current,
            symbol,
            crypto.balance
        );

        Ok(ConversionOutcome {
            transaction,
            quote,
            cash,
            crypto,
        })
    }

    /// Start an outbound send: the amount plus network fee is locked and the
    /// send waits for an administrator.
    pub async fn initiate_send(
        pool: &PgPool,
        user_id: Uuid,
        req: SendRequest,
        price: Decimal,
    ) -> Result<SendOutcome, CryptoError> {
        let symbol = normalize_symbol(&req.symbol)?;

        let wallet_address = req.wallet_address.trim().to_string();
        if wallet_address.is_empty() {
            return Err(CryptoError::MissingWalletAddress);
        }

        let networks = PriceFeed::networks(&symbol).unwrap_or_default();
        let network = networks
            .iter()
            .find(|n| n.eq_ignore_ascii_case(req.network.trim()))
            .ok_or_else(|| CryptoError::InvalidNetwork(req.network.clone()))?;

        let quote = SendQuote::new(req.amount, PriceFeed::network_fee(&symbol))?;
        let usd_value = quote
            .amount
            .checked_mul(price)
            .ok_or(LedgerError::AmountTooLarge)?
            .round_dp(2);

        let mut tx = pool.begin().await?;

        let row = CryptoWallet::lock_row_in_tx(&mut tx, user_id, &symbol)
            .await?
            .ok_or_else(|| CryptoError::UnsupportedCurrency(symbol.clone()))?;
        let mut holding = row.holding();
        holding.lock(quote.total)?;
        let balance = CryptoWallet::save_holding_in_tx(&mut tx, user_id, &symbol, holding).await?;

        let description = format!(
            "Send {} {} to {}",
            quote.amount.normalize(),
            symbol,
            shorten(&wallet_address, 8, 6)
        );
        let memo = req.memo.map(|m| m.trim().to_string()).filter(|m| !m.is_empty());

        let transaction = sqlx::query_as::<_, Self>(
            "INSERT INTO crypto_transactions (
                user_id, tx_type, status, crypto_currency, crypto_amount, wallet_address,
                network, memo, fee, usd_value, reference, description
             )
             VALUES ($1, 'send', 'pending_approval', $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING *"
        )
        .bind(user_id)
        .bind(&symbol)
        .bind(quote.amount)
        .bind(&wallet_address)
        .bind(*network)
        .bind(memo)
        .bind(quote.network_fee)
        .bind(usd_value)
        .bind(reference::generate(ReferenceKind::CryptoSend))
        .bind(&description)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Send {} queued for approval: {} {} (+{} fee), locked {} of {}",
            transaction.reference,
            quote.amount,
            symbol,
            quote.network_fee,
            balance.locked_balance,
            balance.balance
        );

        Ok(SendOutcome {
            transaction,
            quote,
            balance,
        })
    }

    async fn lock_pending_send_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<Self, CryptoError> {
        let record = sqlx::query_as::<_, Self>(
            "SELECT * FROM crypto_transactions WHERE id = $1 AND tx_type = 'send' FOR UPDATE"
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(CryptoError::NotFound)?;

        if record.status != CryptoTxStatus::PendingApproval.as_str() {
            return Err(CryptoError::AlreadyProcessed(record.status.clone()));
        }
        Ok(record)
    }

    async fn locked_row_for(
        tx: &mut Transaction<'_, Postgres>,
        record: &Self,
    ) -> Result<CryptoBalance, CryptoError> {
        let symbol = record.crypto_currency.clone().unwrap_or_default();
        CryptoWallet::lock_row_in_tx(tx, record.user_id, &symbol)
            .await?
            .ok_or(CryptoError::UnsupportedCurrency(symbol))
    }

    /// Approve a pending send: the locked amount leaves the wallet.
    pub async fn approve_send(
        pool: &PgPool,
        id: Uuid,
        admin_id: Uuid,
        tx_hash: Option<&str>,
    ) -> Result<SendDecision, CryptoError> {
        let mut tx = pool.begin().await?;

        let record = Self::lock_pending_send_in_tx(&mut tx, id).await?;
        let row = Self::locked_row_for(&mut tx, &record).await?;

        let mut holding = row.holding();
        holding.settle(record.send_total())?;
        let balance = CryptoWallet::save_holding_in_tx(&mut tx, record.user_id, &row.symbol, holding).await?;

        let tx_hash = tx_hash.map(str::trim).filter(|h| !h.is_empty());
        let transaction = sqlx::query_as::<_, Self>(
            "UPDATE crypto_transactions
             SET status = 'completed', approved_by = $2, approved_at = NOW(),
                 tx_hash = COALESCE($3, tx_hash), updated_at = NOW()
             WHERE id = $1
             RETURNING *"
        )
        .bind(id)
        .bind(admin_id)
        .bind(tx_hash)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Approved send {}: {} {} settled, balance now {}",
            transaction.reference,
            record.send_total(),
            row.symbol,
            balance.balance
        );

        Ok(SendDecision { transaction, balance })
    }

    /// Reject a pending send and hand the locked amount back.
    pub async fn reject_send(
        pool: &PgPool,
        id: Uuid,
        admin_id: Uuid,
        reason: Option<&str>,
    ) -> Result<SendDecision, CryptoError> {
        let mut tx = pool.begin().await?;

        let record = Self::lock_pending_send_in_tx(&mut tx, id).await?;
        let row = Self::locked_row_for(&mut tx, &record).await?;

        let mut holding = row.holding();
        holding.release(record.send_total())?;
        let balance = CryptoWallet::save_holding_in_tx(&mut tx, record.user_id, &row.symbol, holding).await?;

        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REJECTION_REASON);

        let transaction = sqlx::query_as::<_, Self>(
            "UPDATE crypto_transactions
             SET status = 'rejected', approved_by = $2, approved_at = NOW(),
                 rejection_reason = $3, updated_at = NOW()
             WHERE id = $1
             RETURNING *"
        )
        .bind(id)
        .bind(admin_id)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Rejected send {}: released {} {} ({})",
            transaction.reference,
            record.send_total(),
            row.symbol,
            reason
        );

        Ok(SendDecision { transaction, balance })
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM crypto_transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        tx_type: Option<CryptoTxType>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM crypto_transactions
             WHERE user_id = $1 AND ($2::text IS NULL OR tx_type = $2)
             ORDER BY created_at DESC
             LIMIT $3"
        )
        .bind(user_id)
        .bind(tx_type.map(|t| t.as_str()))
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn list_sends(pool: &PgPool, user_id: Uuid, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        Self::list_for_user(pool, user_id, Some(CryptoTxType::Send), limit).await
    }

    pub async fn list_pending(pool: &PgPool) -> Result<Vec<PendingSend>, sqlx::Error> {
        sqlx::query_as::<_, PendingSend>(
            "SELECT ct.*, u.name AS user_name, u.email AS user_email
             FROM crypto_transactions ct
             JOIN users u ON u.id = ct.user_id
             WHERE ct.tx_type = 'send' AND ct.status = 'pending_approval'
             ORDER BY ct.created_at ASC"
        )
        .fetch_all(pool)
        .await
    }

    /// Sum of amount plus fee over a user's pending sends, per symbol
    pub async fn pending_totals(pool: &PgPool) -> Result<Vec<(Uuid, String, Decimal)>, sqlx::Error> {
        sqlx::query_as::<_, (Uuid, String, Decimal)>(
            "SELECT user_id, COALESCE(crypto_currency, ''), COALESCE(SUM(crypto_amount + fee), 0)
             FROM crypto_transactions
             WHERE tx_type = 'send' AND status = 'pending_approval'
             GROUP BY user_id, crypto_currency"
        )
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_are_shortened_for_display() {
        let address = "0x71C7656EC7ab88b098defB751B7401B5f6d8976F";
        assert_eq!(mask_address(address), "0x71C7656EC7...f6d8976F");
        assert_eq!(shorten(address, 8, 6), "0x71C765...d8976F");
        assert_eq!(mask_address("short"), "short");
    }

    #[test]
    fn symbols_are_normalized() {
        assert_eq!(normalize_symbol(" btc ").unwrap(), "BTC");
        assert!(matches!(normalize_symbol("DOGE"), Err(CryptoError::UnsupportedCurrency(_))));
    }

    #[test]
    fn status_strings_match_storage() {
        assert_eq!(CryptoTxStatus::PendingApproval.as_str(), "pending_approval");
        assert_eq!(
            serde_json::to_string(&CryptoTxStatus::PendingApproval).unwrap(),
            "\"pending_approval\""
        );
        assert_eq!(CryptoTxType::parse("send"), Some(CryptoTxType::Send));
        assert_eq!(CryptoTxType::parse("swap"), None);
    }
}
