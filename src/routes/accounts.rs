use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{clamp_limit, internal, ApiError};
use crate::auth;
use crate::models::{Transaction, User};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    id: Uuid,
    email: String,
    name: String,
    is_admin: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalancesResponse {
    checking_balance: Decimal,
    savings_balance: Decimal,
    investment_balance: Decimal,
    total_balance: Decimal,
}

#[derive(Debug, Serialize)]
pub struct AccountsResponse {
    success: bool,
    user: UserSummary,
    accounts: AccountBalancesResponse,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    success: bool,
    transactions: Vec<Transaction>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/accounts", get(get_accounts))
        .route("/api/transactions", get(list_transactions))
}

async fn get_accounts(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Json<AccountsResponse> {
    let balances = user.balances();
    let is_admin = auth::is_admin(&user, &state.admin_emails);

    Json(AccountsResponse {
        success: true,
        user: UserSummary {
            id: user.id,
            email: user.email,
            name: user.name,
            is_admin,
        },
        accounts: AccountBalancesResponse {
            checking_balance: balances.checking,
            savings_balance: balances.savings,
            investment_balance: balances.investment,
            total_balance: balances.total(),
        },
    })
}

async fn list_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<ListQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let limit = clamp_limit(query.limit, 50, 100);

    let transactions = Transaction::list_for_user(&state.pool, user.id, limit)
        .await
        .map_err(|e| internal("Failed to fetch transactions", e))?;

    Ok(Json(TransactionsResponse {
        success: true,
        transactions,
    }))
}
