#![allow(dead_code)]

use rust_decimal::Decimal;
use sqlx::PgPool;
use teller::ledger::AccountType;
use teller::{db, models::User};
use uuid::Uuid;

/// Database-backed tests run only when `TEST_DATABASE_URL` is set; without
/// it they return early.
pub async fn setup_db() -> Option<PgPool> {
    let database_url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return None;
        }
    };

    let pool = db::create_pool(&database_url).await.expect("Failed to create pool");
    db::run_migrations(&pool).await.expect("Failed to run migrations");

    sqlx::query("TRUNCATE crypto_transactions, crypto_balances, transactions, users CASCADE")
        .execute(&pool)
        .await
        .expect("Failed to clean tables");

    Some(pool)
}

pub async fn create_test_user(pool: &PgPool, email: &str) -> User {
    User::create(pool, email, "Test Customer")
        .await
        .expect("Failed to create test user")
}

/// Set a cash balance directly, bypassing the ledger
pub async fn fund(pool: &PgPool, user_id: Uuid, account: AccountType, amount: Decimal) {
    let sql = format!("UPDATE users SET {} = $2 WHERE id = $1", account.column());
    sqlx::query(&sql)
        .bind(user_id)
        .bind(amount)
        .execute(pool)
        .await
        .expect("Failed to fund account");
}

/// Set a crypto balance directly, creating the wallet row if needed
pub async fn fund_crypto(pool: &PgPool, user_id: Uuid, symbol: &str, amount: Decimal) {
    sqlx::query(
        "INSERT INTO crypto_balances (user_id, symbol, currency, balance)
         VALUES ($1, $2, $2, $3)
         ON CONFLICT (user_id, symbol) DO UPDATE SET balance = $3",
    )
    .bind(user_id)
    .bind(symbol)
    .bind(amount)
    .execute(pool)
    .await
    .expect("Failed to fund crypto");
}

pub async fn reload(pool: &PgPool, user_id: Uuid) -> User {
    User::find_by_id(pool, user_id)
        .await
        .expect("Failed to load user")
        .expect("User should exist")
}
