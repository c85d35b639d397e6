use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction as PgTransaction};
use uuid::Uuid;

use super::reference::{self, ReferenceKind};
use super::User;
use crate::ledger::{self, AccountType, BalanceChange, Direction, LedgerError, TransactionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Completed,
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "pending" => Some(TransactionStatus::Pending),
            "approved" => Some(TransactionStatus::Approved),
            "completed" => Some(TransactionStatus::Completed),
            "rejected" => Some(TransactionStatus::Rejected),
            _ => None,
        }
    }

    /// Statuses that mean the balance change has been applied
    pub fn is_settled(&self) -> bool {
        matches!(self, TransactionStatus::Approved | TransactionStatus::Completed)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: Decimal,
    pub fee: Decimal,
    pub currency: String,
    pub account_type: String,
    pub status: String,
    pub reference: String,
    pub description: String,
    pub channel: String,
    pub origin: String,
    pub recipient_name: Option<String>,
    pub recipient_account: Option<String>,
    pub recipient_bank: Option<String>,
    pub recipient_routing_number: Option<String>,
    pub recipient_address: Option<String>,
    pub wire_type: Option<String>,
    pub purpose: Option<String>,
    pub posted: bool,
    pub posted_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Counterparty details for external and wire transfers
#[derive(Debug, Clone, Default)]
pub struct Recipient {
    pub name: String,
    pub account: String,
    pub bank: Option<String>,
    pub routing_number: Option<String>,
    pub address: Option<String>,
    pub wire_type: Option<String>,
    pub purpose: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub fee: Decimal,
    pub account_type: AccountType,
    pub description: String,
    pub reference: String,
    pub channel: &'static str,
    pub origin: &'static str,
    pub recipient: Option<Recipient>,
    pub date: Option<DateTime<Utc>>,
}

impl NewTransaction {
    pub fn new(user_id: Uuid, kind: TransactionKind, amount: Decimal, reference: String) -> Self {
        Self {
            user_id,
            kind,
            amount,
            fee: Decimal::ZERO,
            account_type: AccountType::Checking,
            description: String::new(),
            reference,
            channel: "web",
            origin: "",
            recipient: None,
            date: None,
        }
    }

    /// Amount that moves the balance: debits also pay the fee
    fn charge(&self) -> Result<Decimal, LedgerError> {
        charge(self.kind.direction(), self.amount, self.fee)
    }
}

fn charge(direction: Direction, amount: Decimal, fee: Decimal) -> Result<Decimal, LedgerError> {
    match direction {
        Direction::Debit => ledger::checked_sum(amount, fee),
        Direction::Credit => Ok(amount),
    }
}

/// Result of a transfer between two of a user's own accounts
#[derive(Debug, Clone)]
pub struct InternalTransfer {
    pub debit: Transaction,
    pub credit: Transaction,
    pub from_change: BalanceChange,
    pub to_change: BalanceChange,
}

#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("User not found")]
    UserNotFound,
    #[error("Transaction not found")]
    NotFound,
    #[error("Transaction already processed (status: {0})")]
    AlreadyProcessed(String),
    #[error("Cannot transfer to the same account")]
    SameAccount,
    #[error("Unknown transaction type: {0}")]
    UnknownKind(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Transaction {
    pub fn status(&self) -> Option<TransactionStatus> {
        TransactionStatus::parse(&self.status)
    }

    async fn insert_in_tx(
        tx: &mut PgTransaction<'_, Postgres>,
        new: &NewTransaction,
        status: TransactionStatus,
        approved_by: Option<Uuid>,
    ) -> Result<Self, sqlx::Error> {
        let posted = status.is_settled();
        let recipient = new.recipient.clone().unwrap_or_default();
        let optional = |s: String| if s.is_empty() { None } else { Some(s) };

        sqlx::query_as::<_, Self>(
            "INSERT INTO transactions (
                user_id, kind, amount, fee, account_type, status, reference, description,
                channel, origin, recipient_name, recipient_account, recipient_bank,
                recipient_routing_number, recipient_address, wire_type, purpose,
                posted, posted_at, approved_by, approved_at, date
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                     $18, CASE WHEN $18 THEN NOW() END, $19, CASE WHEN $18 THEN NOW() END,
                     COALESCE($20, NOW()))
             RETURNING *"
        )
        .bind(new.user_id)
        .bind(new.kind.as_str())
        .bind(new.amount)
        .bind(new.fee)
        .bind(new.account_type.as_str())
        .bind(status.as_str())
        .bind(&new.reference)
        .bind(&new.description)
        .bind(new.channel)
        .bind(new.origin)
        .bind(optional(recipient.name))
        .bind(optional(recipient.account))
        .bind(recipient.bank)
        .bind(recipient.routing_number)
        .bind(recipient.address)
        .bind(recipient.wire_type)
        .bind(recipient.purpose)
        .bind(posted)
        .bind(approved_by)
        .bind(new.date)
        .fetch_one(&mut **tx)
        .await
    }

    /// Create a transaction that takes effect immediately: the balance
    /// change and the record commit together.
    pub async fn post(
        pool: &PgPool,
        new: NewTransaction,
        status: TransactionStatus,
        approved_by: Option<Uuid>,
    ) -> Result<(Self, BalanceChange), TransactionError> {
        let mut tx = pool.begin().await?;

        let user = User::lock_in_tx(&mut tx, new.user_id)
            .await?
            .ok_or(TransactionError::UserNotFound)?;

        let mut balances = user.balances();
        let change = balances.apply(new.account_type, new.kind.direction(), new.charge()?)?;
        User::set_balance_in_tx(&mut tx, user.id, new.account_type, change.current).await?;

        let record = Self::insert_in_tx(&mut tx, &new, status, approved_by).await?;

        tx.commit().await?;

        tracing::info!(
            "Posted {} {} on {} {} for {}: {} -> {}",
            record.reference,
            new.kind,
            new.account_type,
            new.amount,
            user.email,
            change.previous,
            change.current
        );

        Ok((record, change))
    }

    /// Record a transaction that waits for an administrator. Debits are
    /// checked against the current balance so obviously unfundable requests
    /// are refused up front; the authoritative check runs on approval.
    pub async fn submit(pool: &PgPool, new: NewTransaction) -> Result<Self, TransactionError> {
        ledger::check_amount(new.amount)?;

        let mut tx = pool.begin().await?;

        let user = User::lock_in_tx(&mut tx, new.user_id)
            .await?
            .ok_or(TransactionError::UserNotFound)?;

        if new.kind.direction() == Direction::Debit {
            let available = user.balances().get(new.account_type);
            let required = new.charge()?;
            if required > available {
                return Err(LedgerError::InsufficientFunds { available, required }.into());
            }
        }

        let record = Self::insert_in_tx(&mut tx, &new, TransactionStatus::Pending, None).await?;

        tx.commit().await?;

        tracing::info!(
            "Submitted {} {} {} for approval (user {})",
            record.reference,
            new.kind,
            new.amount,
            user.email
        );

        Ok(record)
    }

    async fn lock_pending_in_tx(
        tx: &mut PgTransaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<Self, TransactionError> {
        let record = sqlx::query_as::<_, Self>("SELECT * FROM transactions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(TransactionError::NotFound)?;

        if record.status() != Some(TransactionStatus::Pending) {
            return Err(TransactionError::AlreadyProcessed(record.status.clone()));
        }
        Ok(record)
    }

    /// Approve a pending transaction and apply it to the balance. Funds are
    /// checked again here; the balance may have moved since submission.
    pub async fn approve(
        pool: &PgPool,
        id: Uuid,
        admin_id: Uuid,
    ) -> Result<(Self, BalanceChange), TransactionError> {
        let mut tx = pool.begin().await?;

        let record = Self::lock_pending_in_tx(&mut tx, id).await?;
        let kind = TransactionKind::parse(&record.kind)
            .ok_or_else(|| TransactionError::UnknownKind(record.kind.clone()))?;
        let account = AccountType::parse_or_checking(Some(&record.account_type));

        let user = User::lock_in_tx(&mut tx, record.user_id)
            .await?
            .ok_or(TransactionError::UserNotFound)?;

        let mut balances = user.balances();
        let change = balances.apply(
            account,
            kind.direction(),
            charge(kind.direction(), record.amount, record.fee)?,
        )?;
        User::set_balance_in_tx(&mut tx, user.id, account, change.current).await?;

        let updated = sqlx::query_as::<_, Self>(
            "UPDATE transactions
             SET status = 'approved', posted = TRUE, posted_at = NOW(),
                 approved_by = $2, approved_at = NOW(), updated_at = NOW()
             WHERE id = $1
             RETURNING *"
        )
        .bind(id)
        .bind(admin_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Approved {} ({} {}) for {}: {} {} -> {}",
            updated.reference,
            kind,
            updated.amount,
            user.email,
            account,
            change.previous,
            change.current
        );

        Ok((updated, change))
    }

    pub async fn decline(
        pool: &PgPool,
        id: Uuid,
        admin_id: Uuid,
        reason: &str,
    ) -> Result<Self, TransactionError> {
        let mut tx = pool.begin().await?;

        Self::lock_pending_in_tx(&mut tx, id).await?;

        let updated = sqlx::query_as::<_, Self>(
            "UPDATE transactions
             SET status = 'rejected', rejection_reason = $3,
                 approved_by = $2, approved_at = NOW(), updated_at = NOW()
             WHERE id = $1
             RETURNING *"
        )
        .bind(id)
        .bind(admin_id)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!("Declined {}: {}", updated.reference, reason);
        Ok(updated)
    }

    /// Move money between two of the user's own accounts. Both legs and
    /// both balance writes commit together.
    pub async fn transfer_internal(
        pool: &PgPool,
        user_id: Uuid,
        from: AccountType,
        to: AccountType,
        amount: Decimal,
        description: &str,
    ) -> Result<InternalTransfer, TransactionError> {
        if from == to {
            return Err(TransactionError::SameAccount);
        }

        let mut tx = pool.begin().await?;

        let user = User::lock_in_tx(&mut tx, user_id)
            .await?
            .ok_or(TransactionError::UserNotFound)?;

        let mut balances = user.balances();
        let from_change = balances.apply(from, Direction::Debit, amount)?;
        let to_change = balances.apply(to, Direction::Credit, amount)?;
        User::set_balance_in_tx(&mut tx, user_id, from, from_change.current).await?;
        User::set_balance_in_tx(&mut tx, user_id, to, to_change.current).await?;

        let reference = reference::generate(ReferenceKind::InternalTransfer);
        let description = if description.trim().is_empty() {
            format!("Transfer from {} to {}", from, to)
        } else {
            description.trim().to_string()
        };

        let mut out_leg = NewTransaction::new(user_id, TransactionKind::TransferOut, amount, reference.clone());
        out_leg.account_type = from;
        out_leg.description = description.clone();
        out_leg.origin = "internal-transfer";

        let mut in_leg = NewTransaction::new(user_id, TransactionKind::TransferIn, amount, format!("{}-IN", reference));
        in_leg.account_type = to;
        in_leg.description = description;
        in_leg.origin = "internal-transfer";

        let debit = Self::insert_in_tx(&mut tx, &out_leg, TransactionStatus::Completed, None).await?;
        let credit = Self::insert_in_tx(&mut tx, &in_leg, TransactionStatus::Completed, None).await?;

        tx.commit().await?;

        tracing::info!(
            "Internal transfer {} of {} for {}: {} -> {}",
            reference,
            amount,
            user.email,
            from,
            to
        );

        Ok(InternalTransfer {
            debit,
            credit,
            from_change,
            to_change,
        })
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_user(pool: &PgPool, user_id: Uuid, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM transactions
             WHERE user_id = $1
             ORDER BY date DESC, created_at DESC
             LIMIT $2"
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn list_by_status(
        pool: &PgPool,
        status: Option<TransactionStatus>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM transactions
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY created_at DESC
             LIMIT $2"
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_round_trips() {
        for status in ["pending", "approved", "completed", "rejected"] {
            assert_eq!(TransactionStatus::parse(status).unwrap().as_str(), status);
        }
        assert_eq!(TransactionStatus::parse("pending_approval"), None);
    }

    #[test]
    fn only_approved_and_completed_are_settled() {
        assert!(TransactionStatus::Approved.is_settled());
        assert!(TransactionStatus::Completed.is_settled());
        assert!(!TransactionStatus::Pending.is_settled());
        assert!(!TransactionStatus::Rejected.is_settled());
    }

    #[test]
    fn debits_pay_the_fee_credits_do_not() {
        assert_eq!(charge(Direction::Debit, dec!(1000), dec!(45)), Ok(dec!(1045)));
        assert_eq!(charge(Direction::Credit, dec!(1000), dec!(45)), Ok(dec!(1000)));

        let mut wire = NewTransaction::new(Uuid::new_v4(), TransactionKind::WireTransfer, dec!(500), "WIR-1".into());
        wire.fee = dec!(55);
        assert_eq!(wire.charge(), Ok(dec!(555)));
    }

    #[test]
    fn charge_overflow_is_an_error() {
        assert_eq!(
            charge(Direction::Debit, Decimal::MAX, dec!(45)),
            Err(LedgerError::AmountTooLarge)
        );
        assert_eq!(charge(Direction::Credit, Decimal::MAX, dec!(45)), Ok(Decimal::MAX));
    }
}
