use axum::{extract::State, routing::post, Extension, Json, Router};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::{bad_request, ledger_error, notify_cash, transaction_error, ApiError};
use crate::ledger::{self, AccountType, BalanceChange, TransactionKind};
use crate::models::reference::{self, ReferenceKind};
use crate::models::{NewTransaction, Recipient, Transaction, User};
use crate::money::round_cash;
use crate::AppState;

const DOMESTIC_WIRE_FEE: Decimal = dec!(30);
const INTERNATIONAL_WIRE_FEE: Decimal = dec!(45);
const URGENT_WIRE_SURCHARGE: Decimal = dec!(25);

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/transfers/internal", post(internal_transfer))
        .route("/api/transfers/external", post(external_transfer))
        .route("/api/transfers/wire", post(wire_transfer))
}

fn wire_fee(international: bool, urgent: bool) -> Decimal {
    let base = if international {
        INTERNATIONAL_WIRE_FEE
    } else {
        DOMESTIC_WIRE_FEE
    };
    if urgent {
        base + URGENT_WIRE_SURCHARGE
    } else {
        base
    }
}

fn positive_amount(amount: Option<Decimal>) -> Result<Decimal, ApiError> {
    let amount = amount.map(round_cash).ok_or_else(|| bad_request("Invalid amount"))?;
    ledger::check_amount(amount).map_err(ledger_error)
}

fn required(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalTransferRequest {
    from_account: String,
    to_account: String,
    #[serde(default, deserialize_with = "crate::money::flexible_amount")]
    amount: Option<Decimal>,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalTransferResponse {
    success: bool,
    message: String,
    reference: String,
    transactions: Vec<Transaction>,
    from_balance: BalanceChange,
    to_balance: BalanceChange,
}

async fn internal_transfer(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<InternalTransferRequest>,
) -> Result<Json<InternalTransferResponse>, ApiError> {
    let amount = positive_amount(req.amount)?;
    let from = AccountType::parse(&req.from_account).ok_or_else(|| bad_request("Invalid source account"))?;
    let to = AccountType::parse(&req.to_account).ok_or_else(|| bad_request("Invalid destination account"))?;

    let transfer = Transaction::transfer_internal(&state.pool, user.id, from, to, amount, &req.description)
        .await
        .map_err(transaction_error)?;

    notify_cash(&state, &user, &transfer.debit);

    Ok(Json(InternalTransferResponse {
        success: true,
        message: "Transfer completed successfully".into(),
        reference: transfer.debit.reference.clone(),
        transactions: vec![transfer.debit, transfer.credit],
        from_balance: transfer.from_change,
        to_balance: transfer.to_change,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTransferRequest {
    from_account: Option<String>,
    #[serde(default, deserialize_with = "crate::money::flexible_amount")]
    amount: Option<Decimal>,
    recipient_name: Option<String>,
    recipient_account: Option<String>,
    recipient_bank: Option<String>,
    recipient_routing_number: Option<String>,
    transfer_speed: Option<String>,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Serialize)]
pub struct PendingTransferResponse {
    success: bool,
    message: String,
    transaction: Transaction,
}

async fn external_transfer(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<ExternalTransferRequest>,
) -> Result<Json<PendingTransferResponse>, ApiError> {
    let amount = positive_amount(req.amount)?;
    let (name, account) = match (required(&req.recipient_name), required(&req.recipient_account)) {
        (Some(name), Some(account)) => (name, account),
        _ => return Err(bad_request("Recipient name and account are required")),
    };

    let speed = required(&req.transfer_speed).unwrap_or_else(|| "standard".into());
    let description = match req.description.trim() {
        "" => format!("Transfer to {} ({})", name, speed),
        d => d.to_string(),
    };

    let mut new = NewTransaction::new(
        user.id,
        TransactionKind::TransferOut,
        amount,
        reference::generate(ReferenceKind::ExternalTransfer),
    );
    new.account_type = AccountType::parse_or_checking(req.from_account.as_deref());
    new.description = description;
    new.origin = "external-transfer";
    new.recipient = Some(Recipient {
        name,
        account,
        bank: required(&req.recipient_bank),
        routing_number: required(&req.recipient_routing_number),
        ..Default::default()
    });

    let transaction = Transaction::submit(&state.pool, new)
        .await
        .map_err(transaction_error)?;

    notify_cash(&state, &user, &transaction);

    Ok(Json(PendingTransferResponse {
        success: true,
        message: "Transfer submitted for approval".into(),
        transaction,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTransferRequest {
    from_account: Option<String>,
    #[serde(default, deserialize_with = "crate::money::flexible_amount")]
    amount: Option<Decimal>,
    recipient_name: Option<String>,
    recipient_account: Option<String>,
    recipient_bank: Option<String>,
    recipient_bank_address: Option<String>,
    recipient_routing_number: Option<String>,
    recipient_address: Option<String>,
    wire_type: Option<String>,
    purpose_of_transfer: Option<String>,
    #[serde(default)]
    urgent_transfer: bool,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTransferResponse {
    success: bool,
    message: String,
    fee: Decimal,
    total_debit: Decimal,
    transaction: Transaction,
}

async fn wire_transfer(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<WireTransferRequest>,
) -> Result<Json<WireTransferResponse>, ApiError> {
    let amount = positive_amount(req.amount)?;
    let (name, account, bank) = match (
        required(&req.recipient_name),
        required(&req.recipient_account),
        required(&req.recipient_bank),
    ) {
        (Some(name), Some(account), Some(bank)) => (name, account, bank),
        _ => return Err(bad_request("Recipient name, account and bank are required")),
    };

    let wire_type = required(&req.wire_type).unwrap_or_else(|| "domestic".into()).to_lowercase();
    let international = match wire_type.as_str() {
        "domestic" => false,
        "international" => true,
        _ => return Err(bad_request("Wire type must be domestic or international")),
    };
    let fee = wire_fee(international, req.urgent_transfer);

    let bank = match required(&req.recipient_bank_address) {
        Some(address) => format!("{}, {}", bank, address),
        None => bank,
    };
    let description = match req.description.trim() {
        "" => format!("Wire transfer to {}", name),
        d => d.to_string(),
    };

    let mut new = NewTransaction::new(
        user.id,
        TransactionKind::WireTransfer,
        amount,
        reference::generate(ReferenceKind::Wire),
    );
    new.fee = fee;
    new.account_type = AccountType::parse_or_checking(req.from_account.as_deref());
    new.description = description;
    new.origin = "wire-transfer";
    new.recipient = Some(Recipient {
        name,
        account,
        bank: Some(bank),
        routing_number: required(&req.recipient_routing_number),
        address: required(&req.recipient_address),
        wire_type: Some(wire_type),
        purpose: required(&req.purpose_of_transfer),
    });

    let total_debit = ledger::checked_sum(amount, fee).map_err(ledger_error)?;
    let transaction = Transaction::submit(&state.pool, new)
        .await
        .map_err(transaction_error)?;

    notify_cash(&state, &user, &transaction);

    Ok(Json(WireTransferResponse {
        success: true,
        message: "Wire transfer submitted for approval".into(),
        fee,
        total_debit,
        transaction,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_fees() {
        assert_eq!(wire_fee(false, false), dec!(30));
        assert_eq!(wire_fee(true, false), dec!(45));
        assert_eq!(wire_fee(false, true), dec!(55));
        assert_eq!(wire_fee(true, true), dec!(70));
    }

    #[test]
    fn amounts_must_be_positive() {
        assert_eq!(positive_amount(Some(dec!(12.345))).unwrap(), dec!(12.34));
        assert!(positive_amount(Some(dec!(0.001))).is_err());
        assert!(positive_amount(Some(dec!(-5))).is_err());
        assert!(positive_amount(None).is_err());

        let (_, body) = positive_amount(Some(Decimal::MAX)).unwrap_err();
        assert_eq!(body.0.error, "Amount is too large");
    }
}
