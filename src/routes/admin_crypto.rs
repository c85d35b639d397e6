use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{bad_request, crypto_error, internal, notify_crypto, ApiError};
use crate::models::{CryptoTransaction, PendingSend, User};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/crypto/pending", get(list_pending))
        .route("/api/admin/crypto/approve", post(decide))
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    success: bool,
    transactions: Vec<PendingSend>,
    count: usize,
}

async fn list_pending(State(state): State<AppState>) -> Result<Json<PendingResponse>, ApiError> {
    let transactions = CryptoTransaction::list_pending(&state.pool)
        .await
        .map_err(|e| internal("Failed to fetch pending transactions", e))?;

    Ok(Json(PendingResponse {
        success: true,
        count: transactions.len(),
        transactions,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    transaction_id: Option<String>,
    action: Option<String>,
    rejection_reason: Option<String>,
    tx_hash: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DecidedTransaction {
    id: Uuid,
    status: String,
    reference: String,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    success: bool,
    message: String,
    transaction: DecidedTransaction,
}

fn parse_action(raw: Option<&str>) -> Result<Action, ApiError> {
    match raw.map(str::trim) {
        Some("approve") => Ok(Action::Approve),
        Some("reject") => Ok(Action::Reject),
        _ => Err(bad_request("Action must be approve or reject")),
    }
}

async fn decide(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, ApiError> {
    let id = req
        .transaction_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| bad_request("Transaction ID is required"))?;
    let id = Uuid::parse_str(id).map_err(|_| bad_request("Invalid transaction ID format"))?;
    let action = parse_action(req.action.as_deref())?;

    let (decision, message) = match action {
        Action::Approve => (
            CryptoTransaction::approve_send(&state.pool, id, admin.id, req.tx_hash.as_deref()).await,
            "Transaction approved and completed",
        ),
        Action::Reject => (
            CryptoTransaction::reject_send(&state.pool, id, admin.id, req.rejection_reason.as_deref()).await,
            "Transaction rejected. Funds have been unlocked.",
        ),
    };
    let decision = decision.map_err(|e| crypto_error(e, None))?;
    let transaction = decision.transaction;

    tracing::info!(
        "Admin {} {:?} crypto send {}",
        admin.email,
        action,
        transaction.reference
    );

    match User::find_by_id(&state.pool, transaction.user_id).await {
        Ok(Some(user)) => notify_crypto(&state, &user, &transaction),
        Ok(None) => {}
        Err(e) => tracing::warn!("Could not load owner of {}: {}", transaction.reference, e),
    }

    Ok(Json(DecisionResponse {
        success: true,
        message: message.into(),
        transaction: DecidedTransaction {
            id: transaction.id,
            status: transaction.status,
            reference: transaction.reference,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_are_strict() {
        assert_eq!(parse_action(Some("approve")).unwrap(), Action::Approve);
        assert_eq!(parse_action(Some(" reject ")).unwrap(), Action::Reject);
        assert!(parse_action(Some("Approve")).is_err());
        assert!(parse_action(None).is_err());
    }
}
