mod accounts;
mod admin;
mod admin_crypto;
mod crypto;
mod dev;
mod transfers;

use axum::{http::StatusCode, middleware, routing::get, Json, Router};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::auth;
use crate::ledger::LedgerError;
use crate::mail::TransactionNotice;
use crate::models::{CryptoError, CryptoTransaction, Transaction, TransactionError, User};
use crate::prices::PriceFeed;
use crate::AppState;

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_fee: Option<Decimal>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            ..Default::default()
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    error(StatusCode::BAD_REQUEST, message)
}

/// Log the real cause and answer with a generic 500
pub fn internal(message: &str, cause: impl std::fmt::Display) -> ApiError {
    tracing::error!("{}: {}", message, cause);
    error(StatusCode::INTERNAL_SERVER_ERROR, message)
}

pub(crate) fn ledger_error(e: LedgerError) -> ApiError {
    match e {
        LedgerError::InvalidAmount => bad_request("Invalid amount"),
        LedgerError::InsufficientFunds { available, required } => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Insufficient funds".into(),
                available: Some(available),
                required: Some(required),
                ..Default::default()
            }),
        ),
        LedgerError::InsufficientCrypto { available, required } => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Insufficient crypto balance".into(),
                available: Some(available),
                required: Some(required),
                ..Default::default()
            }),
        ),
        LedgerError::BelowMinimum(_) | LedgerError::AmountTooLarge => bad_request(e.to_string()),
        LedgerError::InvalidPrice(_) => internal("Price unavailable", e),
        LedgerError::LockUnderflow { .. } => internal("Wallet balance is inconsistent", e),
    }
}

pub(crate) fn transaction_error(e: TransactionError) -> ApiError {
    match e {
        TransactionError::Ledger(e) => ledger_error(e),
        TransactionError::UserNotFound => error(StatusCode::NOT_FOUND, "User not found"),
        TransactionError::NotFound => error(StatusCode::NOT_FOUND, "Transaction not found"),
        TransactionError::AlreadyProcessed(_) => bad_request("Transaction already processed"),
        TransactionError::SameAccount => bad_request(e.to_string()),
        TransactionError::UnknownKind(_) => internal("Failed to process transaction", e),
        TransactionError::Database(e) => internal("Failed to process transaction", e),
    }
}

pub(crate) fn crypto_error(e: CryptoError, symbol: Option<&str>) -> ApiError {
    match e {
        CryptoError::Ledger(LedgerError::InsufficientCrypto { available, required }) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Insufficient crypto balance".into(),
                available: Some(available),
                required: Some(required),
                network_fee: symbol.map(PriceFeed::network_fee),
                ..Default::default()
            }),
        ),
        CryptoError::Ledger(e) => ledger_error(e),
        CryptoError::UnsupportedCurrency(_)
        | CryptoError::MissingWalletAddress
        | CryptoError::InvalidNetwork(_) => bad_request(e.to_string()),
        CryptoError::UserNotFound => error(StatusCode::NOT_FOUND, "User not found"),
        CryptoError::NotFound => error(StatusCode::NOT_FOUND, "Transaction not found"),
        CryptoError::AlreadyProcessed(_) => bad_request("Transaction already processed"),
        CryptoError::Database(e) => internal("Failed to process crypto transaction", e),
    }
}

/// Best-effort customer email; never fails the request
pub(crate) fn notify_cash(state: &AppState, user: &User, tx: &Transaction) {
    state
        .mail
        .notify_transaction(&user.email, TransactionNotice::from_transaction(user, tx));
}

pub(crate) fn notify_crypto(state: &AppState, user: &User, tx: &CryptoTransaction) {
    state
        .mail
        .notify_transaction(&user.email, TransactionNotice::from_crypto(user, tx));
}

/// `?limit=` with a default and an upper bound
pub(crate) fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.filter(|l| *l > 0).unwrap_or(default).min(max)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Full application router. `main` adds CORS and request tracing on top.
pub fn router(state: AppState) -> Router {
    let web = Router::new()
        .merge(accounts::routes())
        .merge(transfers::routes())
        .merge(crypto::web_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::web_auth));

    let mobile = crypto::mobile_routes()
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::mobile_auth));

    // Layers run outside-in: web_auth first, then the admin check
    let admin = Router::new()
        .merge(admin::routes())
        .merge(admin_crypto::routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::web_auth));

    let mut app = Router::new()
        .route("/health", get(health))
        .merge(web)
        .merge(mobile)
        .merge(admin);

    if state.dev_mode {
        app = app.merge(dev::routes());
    }

    app.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn body_of(err: ApiError) -> serde_json::Value {
        serde_json::to_value(&err.1 .0).unwrap()
    }

    #[test]
    fn insufficient_funds_carries_amounts() {
        let err = ledger_error(LedgerError::InsufficientFunds {
            available: dec!(1000),
            required: dec!(1500),
        });
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(
            body_of(err),
            serde_json::json!({
                "success": false,
                "error": "Insufficient funds",
                "available": "1000",
                "required": "1500",
            })
        );
    }

    #[test]
    fn insufficient_crypto_reports_network_fee() {
        let err = crypto_error(
            CryptoError::Ledger(LedgerError::InsufficientCrypto {
                available: dec!(0.3),
                required: dec!(0.7001),
            }),
            Some("BTC"),
        );
        let body = body_of(err);
        assert_eq!(body["error"], "Insufficient crypto balance");
        assert_eq!(body["networkFee"], "0.0001");
    }

    #[test]
    fn decided_items_are_bad_requests() {
        let err = transaction_error(TransactionError::AlreadyProcessed("approved".into()));
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(body_of(err)["error"], "Transaction already processed");

        let err = crypto_error(CryptoError::NotFound, None);
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(None, 50, 100), 50);
        assert_eq!(clamp_limit(Some(500), 50, 100), 100);
        assert_eq!(clamp_limit(Some(0), 20, 100), 20);
        assert_eq!(clamp_limit(Some(5), 20, 100), 5);
    }
}
