use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{bad_request, clamp_limit, error, internal, notify_cash, transaction_error, ApiError};
use crate::auth;
use crate::ledger::{self, AccountType, BalanceChange, LedgerError, TransactionKind};
use crate::models::reference::{self, ReferenceKind};
use crate::models::{NewTransaction, Transaction, TransactionStatus, User};
use crate::money::{format_usd, round_cash};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route(
            "/api/admin/transactions",
            get(list_transactions).post(create_transaction),
        )
        .route("/api/admin/transactions/:id/approve", post(approve_transaction))
        .route("/api/admin/transactions/:id/decline", post(decline_transaction))
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| bad_request("Invalid transaction ID format"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserView {
    id: Uuid,
    email: String,
    name: String,
    is_admin: bool,
    checking_balance: Decimal,
    savings_balance: Decimal,
    investment_balance: Decimal,
    total_balance: Decimal,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    success: bool,
    users: Vec<AdminUserView>,
}

async fn list_users(State(state): State<AppState>) -> Result<Json<UsersResponse>, ApiError> {
    let users = User::list(&state.pool)
        .await
        .map_err(|e| internal("Failed to fetch users", e))?;

    let users = users
        .into_iter()
        .map(|user| {
            let balances = user.balances();
            AdminUserView {
                is_admin: auth::is_admin(&user, &state.admin_emails),
                id: user.id,
                email: user.email,
                name: user.name,
                checking_balance: balances.checking,
                savings_balance: balances.savings,
                investment_balance: balances.investment,
                total_balance: balances.total(),
                created_at: user.created_at,
            }
        })
        .collect();

    Ok(Json(UsersResponse { success: true, users }))
}

#[derive(Debug, Deserialize)]
pub struct AdminListQuery {
    status: Option<String>,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    success: bool,
    transactions: Vec<Transaction>,
}

async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(TransactionStatus::parse(raw).ok_or_else(|| bad_request("Invalid status"))?),
    };
    let limit = clamp_limit(query.limit, 100, 500);

    let transactions = Transaction::list_by_status(&state.pool, status, limit)
        .await
        .map_err(|e| internal("Failed to fetch transactions", e))?;

    Ok(Json(TransactionsResponse {
        success: true,
        transactions,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    user_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "crate::money::flexible_amount")]
    amount: Option<Decimal>,
    account_type: Option<String>,
    description: Option<String>,
    status: Option<String>,
    date: Option<DateTime<Utc>>,
}

/// Balance movement as shown to the admin panel
#[derive(Debug, Serialize)]
pub struct BalanceView {
    field: &'static str,
    #[serde(flatten)]
    change: BalanceChange,
}

#[derive(Debug, Serialize)]
pub struct UserRef {
    id: Uuid,
    name: String,
    email: String,
}

impl From<&User> for UserRef {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.display_name().to_string(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateTransactionResponse {
    success: bool,
    message: String,
    transaction: Transaction,
    user: UserRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance: Option<BalanceView>,
}

/// Admin amounts are taken to the cent; whatever rounds away to nothing is
/// refused here rather than by the database.
fn admin_amount(amount: Decimal) -> Result<Decimal, ApiError> {
    match ledger::check_amount(round_cash(amount.abs())) {
        Ok(amount) => Ok(amount),
        Err(LedgerError::AmountTooLarge) => Err(bad_request("Amount is too large")),
        Err(_) => Err(bad_request("Amount must be greater than 0")),
    }
}

/// `credited $250.00 to Ada's savings account`
fn movement(kind: TransactionKind, amount: Decimal, name: &str, account: AccountType) -> String {
    let (verb, preposition) = if kind.is_credit() {
        ("credited", "to")
    } else {
        ("debited", "from")
    };
    format!(
        "{} {} {} {}'s {} account",
        verb,
        format_usd(amount),
        preposition,
        name,
        account
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

async fn create_transaction(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<Json<CreateTransactionResponse>, ApiError> {
    let user_id = req
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| bad_request("User ID is required"))?;
    let user_id = Uuid::parse_str(user_id).map_err(|_| bad_request("Invalid user ID format"))?;

    let (raw_kind, amount) = match (req.kind.as_deref().map(str::trim), req.amount) {
        (Some(kind), Some(amount)) if !kind.is_empty() => (kind, amount.abs()),
        _ => return Err(bad_request("Type and amount are required")),
    };
    let kind = TransactionKind::parse(raw_kind).ok_or_else(|| {
        bad_request(format!("Invalid type. Must be: {}", TransactionKind::accepted()))
    })?;
    let amount = admin_amount(amount)?;

    let user = User::find_by_id(&state.pool, user_id)
        .await
        .map_err(|e| internal("Failed to fetch user", e))?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "User not found"))?;

    let account = AccountType::parse_or_checking(req.account_type.as_deref());
    let posts_now = matches!(
        req.status.as_deref().map(str::trim).unwrap_or("completed"),
        "completed" | "approved"
    );

    let mut new = NewTransaction::new(user.id, kind, amount, reference::generate(ReferenceKind::Admin));
    new.account_type = account;
    new.description = req
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format!("Admin {}", kind));
    new.channel = "admin";
    new.origin = "admin_panel";
    new.date = req.date;

    let (transaction, balance, message) = if posts_now {
        let (transaction, change) = Transaction::post(&state.pool, new, TransactionStatus::Approved, Some(admin.id))
            .await
            .map_err(transaction_error)?;
        let message = format!("Successfully {}", movement(kind, amount, user.display_name(), account));
        let balance = BalanceView {
            field: account.field(),
            change,
        };
        (transaction, Some(balance), message)
    } else {
        let transaction = Transaction::submit(&state.pool, new)
            .await
            .map_err(transaction_error)?;
        (transaction, None, "Transaction created and pending approval".to_string())
    };

    tracing::info!(
        "Admin {} created {} {} for {} ({})",
        admin.email,
        transaction.reference,
        transaction.status,
        user.email,
        format_usd(amount)
    );

    notify_cash(&state, &user, &transaction);

    Ok(Json(CreateTransactionResponse {
        success: true,
        message,
        user: UserRef::from(&user),
        transaction,
        balance,
    }))
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    success: bool,
    message: String,
    transaction: Transaction,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance: Option<BalanceView>,
}

async fn owner_of(state: &AppState, tx: &Transaction) -> Option<User> {
    match User::find_by_id(&state.pool, tx.user_id).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("Could not load owner of {}: {}", tx.reference, e);
            None
        }
    }
}

async fn approve_transaction(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<DecisionResponse>, ApiError> {
    let id = parse_id(&id)?;

    let (transaction, change) = Transaction::approve(&state.pool, id, admin.id)
        .await
        .map_err(transaction_error)?;

    let account = AccountType::parse_or_checking(Some(&transaction.account_type));
    let kind = TransactionKind::parse(&transaction.kind);

    let owner = owner_of(&state, &transaction).await;
    let name = owner
        .as_ref()
        .map(|u| u.display_name().to_string())
        .unwrap_or_else(|| "Customer".into());

    let message = match kind {
        Some(kind) => format!(
            "Transaction approved. {}.",
            capitalize(&movement(kind, change.change.abs(), &name, account))
        ),
        None => "Transaction approved.".to_string(),
    };

    if let Some(user) = &owner {
        notify_cash(&state, user, &transaction);
    }

    Ok(Json(DecisionResponse {
        success: true,
        message,
        balance: Some(BalanceView {
            field: account.field(),
            change,
        }),
        transaction,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeclineRequest {
    reason: Option<String>,
}

async fn decline_transaction(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    Path(id): Path<String>,
    body: Option<Json<DeclineRequest>>,
) -> Result<Json<DecisionResponse>, ApiError> {
    let id = parse_id(&id)?;
    let reason = body
        .and_then(|Json(b)| b.reason)
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "Declined by administrator".into());

    let transaction = Transaction::decline(&state.pool, id, admin.id, &reason)
        .await
        .map_err(transaction_error)?;

    if let Some(user) = owner_of(&state, &transaction).await {
        notify_cash(&state, &user, &transaction);
    }

    Ok(Json(DecisionResponse {
        success: true,
        message: "Transaction declined".into(),
        transaction,
        balance: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn movements_name_direction() {
        assert_eq!(
            movement(TransactionKind::Deposit, dec!(250), "Ada", AccountType::Savings),
            "credited $250.00 to Ada's savings account"
        );
        assert_eq!(
            capitalize(&movement(TransactionKind::Withdrawal, dec!(1500.5), "Ada", AccountType::Checking)),
            "Debited $1,500.50 from Ada's checking account"
        );
    }

    #[test]
    fn admin_amounts_are_taken_to_the_cent() {
        assert_eq!(admin_amount(dec!(-250.505)).unwrap(), dec!(250.50));
        assert_eq!(admin_amount(dec!(19.999)).unwrap(), dec!(20.00));

        let (status, body) = admin_amount(dec!(0.00001)).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.0.error, "Amount must be greater than 0");

        let (_, body) = admin_amount(Decimal::MAX).unwrap_err();
        assert_eq!(body.0.error, "Amount is too large");
    }

    #[test]
    fn ids_must_be_uuids() {
        assert!(parse_id("not-a-uuid").is_err());
        assert!(parse_id(&Uuid::new_v4().to_string()).is_ok());
    }
}
