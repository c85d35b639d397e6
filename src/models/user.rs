use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::ledger::{AccountBalances, AccountType};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
    pub checking_balance: Decimal,
    pub savings_balance: Decimal,
    pub investment_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Users are provisioned by the identity provider; this is used by the
    /// provisioning hook and by tests.
    pub async fn create(pool: &PgPool, email: &str, name: &str) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO users (email, name) VALUES ($1, $2) RETURNING *"
        )
        .bind(email)
        .bind(name)
        .fetch_one(pool)
        .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(pool)
            .await
    }

    /// Load the user row with `FOR UPDATE` so balance writes in the same
    /// transaction cannot interleave with another request.
    pub async fn lock_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
    }

    pub async fn set_balance_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        account: AccountType,
        balance: Decimal,
    ) -> Result<(), sqlx::Error> {
        // Column name comes from a closed enum, never from input
        let sql = format!(
            "UPDATE users SET {} = $1, updated_at = NOW() WHERE id = $2",
            account.column()
        );
        sqlx::query(&sql)
            .bind(balance)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub fn balances(&self) -> AccountBalances {
        AccountBalances {
            checking: self.checking_balance,
            savings: self.savings_balance,
            investment: self.investment_balance,
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.email
        } else {
            &self.name
        }
    }
}
