use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    routing::post,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{bad_request, clamp_limit, crypto_error, error, internal, notify_crypto, ApiError};
use crate::ledger::{AccountBalances, AccountType};
use crate::models::{mask_address, CryptoTransaction, CryptoTxType, CryptoWallet, SendRequest, User};
use crate::prices::{CryptoPrice, PriceFeed};
use crate::AppState;

pub fn web_routes() -> Router<AppState> {
    Router::new()
        .route("/api/crypto/prices", get(get_prices))
        .route("/api/crypto/wallet", get(get_wallet))
        .route("/api/crypto/convert", post(convert))
        .route("/api/crypto/send", post(send).get(list_sends))
        .route("/api/crypto/transactions", get(list_transactions))
}

/// Same operations for the mobile app, authenticated with a bearer token
pub fn mobile_routes() -> Router<AppState> {
    Router::new()
        .route("/api/crypto/mobile/wallet", get(get_wallet))
        .route("/api/crypto/mobile/convert", post(convert))
        .route("/api/crypto/mobile/send", post(send).get(list_sends))
        .route("/api/crypto/mobile/transactions", get(list_transactions))
}

fn quote(state: &AppState, symbol: &str) -> Result<Decimal, ApiError> {
    state
        .prices
        .quote(symbol)
        .ok_or_else(|| bad_request("Unsupported cryptocurrency"))
}

#[derive(Debug, Serialize)]
pub struct PricesResponse {
    success: bool,
    prices: Vec<CryptoPrice>,
    networks: BTreeMap<&'static str, &'static [&'static str]>,
    timestamp: DateTime<Utc>,
}

async fn get_prices(State(state): State<AppState>) -> Json<PricesResponse> {
    Json(PricesResponse {
        success: true,
        prices: state.prices.snapshot(),
        networks: PriceFeed::network_options().into_iter().collect(),
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    currency: String,
    symbol: String,
    balance: Decimal,
    locked_balance: Decimal,
    available_balance: Decimal,
    usd_value: Decimal,
    locked_usd_value: Decimal,
    price: Decimal,
    change_24h: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletView {
    user_id: Uuid,
    balances: Vec<WalletBalance>,
    total_usd_value: Decimal,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    success: bool,
    wallet: WalletView,
}

async fn get_wallet(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = CryptoWallet::get_or_create(&state.pool, user.id)
        .await
        .map_err(|e| internal("Failed to fetch wallet", e))?;

    let prices: BTreeMap<String, CryptoPrice> = state
        .prices
        .snapshot()
        .into_iter()
        .map(|p| (p.symbol.clone(), p))
        .collect();

    let balances: Vec<WalletBalance> = wallet
        .balances
        .into_iter()
        .map(|b| {
            let (price, change_24h) = prices
                .get(&b.symbol)
                .map(|p| (p.price, p.change_24h))
                .unwrap_or_default();
            WalletBalance {
                available_balance: b.available(),
                usd_value: (b.balance * price).round_dp(2),
                locked_usd_value: (b.locked_balance * price).round_dp(2),
                currency: b.currency,
                symbol: b.symbol,
                balance: b.balance,
                locked_balance: b.locked_balance,
                price,
                change_24h,
            }
        })
        .collect();

    let total_usd_value = balances.iter().map(|b| b.usd_value).sum();

    Ok(Json(WalletResponse {
        success: true,
        wallet: WalletView {
            user_id: wallet.user_id,
            balances,
            total_usd_value,
        },
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    from_account: Option<String>,
    #[serde(alias = "cryptoCurrency")]
    to_crypto: Option<String>,
    #[serde(default, alias = "amount", deserialize_with = "crate::money::flexible_amount")]
    usd_amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionView {
    reference: String,
    from_account: String,
    from_currency: &'static str,
    from_amount: Decimal,
    to_currency: String,
    to_amount: Decimal,
    exchange_rate: Decimal,
    fee: Decimal,
    total_debited: Decimal,
    status: String,
    date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BalancesView {
    checking: Decimal,
    savings: Decimal,
    investment: Decimal,
}

impl From<AccountBalances> for BalancesView {
    fn from(b: AccountBalances) -> Self {
        Self {
            checking: b.checking,
            savings: b.savings,
            investment: b.investment,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    success: bool,
    message: String,
    conversion: ConversionView,
    balances: BalancesView,
}

async fn convert(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<ConvertRequest>,
) -> Result<Json<ConvertResponse>, ApiError> {
    let symbol = req
        .to_crypto
        .as_deref()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| PriceFeed::is_supported(s))
        .ok_or_else(|| bad_request("Unsupported cryptocurrency"))?;

    let usd_amount = req
        .usd_amount
        .filter(|a| *a > Decimal::ZERO)
        .ok_or_else(|| bad_request("Invalid amount"))?;

    let from_account = AccountType::parse_or_checking(req.from_account.as_deref());
    let price = quote(&state, &symbol)?;

    let outcome = CryptoTransaction::convert(&state.pool, user.id, &symbol, usd_amount, from_account, price)
        .await
        .map_err(|e| crypto_error(e, Some(&symbol)))?;

    // Balances after the debit, for the dashboard to refresh in place
    let mut balances = user.balances();
    match from_account {
        AccountType::Checking => balances.checking = outcome.cash.current,
        AccountType::Savings => balances.savings = outcome.cash.current,
        AccountType::Investment => balances.investment = outcome.cash.current,
    }

    notify_crypto(&state, &user, &outcome.transaction);

    let tx = outcome.transaction;
    Ok(Json(ConvertResponse {
        success: true,
        message: format!(
            "Successfully converted ${} to {} {}",
            outcome.quote.usd_amount.round_dp(2),
            outcome.quote.crypto_amount,
            symbol
        ),
        conversion: ConversionView {
            reference: tx.reference,
            from_account: from_account.as_str().to_string(),
            from_currency: "USD",
            from_amount: outcome.quote.usd_amount,
            to_currency: symbol,
            to_amount: outcome.quote.crypto_amount,
            exchange_rate: outcome.quote.exchange_rate,
            fee: outcome.quote.fee,
            total_debited: outcome.quote.total_debit,
            status: tx.status,
            date: tx.created_at,
        },
        balances: balances.into(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCryptoRequest {
    crypto_currency: Option<String>,
    #[serde(default, deserialize_with = "crate::money::flexible_amount")]
    amount: Option<Decimal>,
    #[serde(default)]
    wallet_address: String,
    #[serde(default)]
    network: String,
    memo: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferView {
    crypto_currency: String,
    amount: Decimal,
    network_fee: Decimal,
    total_amount: Decimal,
    usd_value: Option<Decimal>,
    wallet_address: String,
    network: String,
    status: String,
    date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    success: bool,
    message: String,
    reference: String,
    transfer: TransferView,
}

async fn send(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<SendCryptoRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    let symbol = req
        .crypto_currency
        .as_deref()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request("Cryptocurrency is required"))?;
    let price = quote(&state, &symbol)?;

    // Address, network and amount are validated in that order by the model
    let request = SendRequest {
        symbol: symbol.clone(),
        amount: req.amount.unwrap_or_default(),
        wallet_address: req.wallet_address,
        network: req.network,
        memo: req.memo,
    };

    let outcome = CryptoTransaction::initiate_send(&state.pool, user.id, request, price)
        .await
        .map_err(|e| crypto_error(e, Some(&symbol)))?;

    notify_crypto(&state, &user, &outcome.transaction);

    let tx = outcome.transaction;
    Ok(Json(SendResponse {
        success: true,
        message: "Crypto transfer submitted for approval".into(),
        reference: tx.reference,
        transfer: TransferView {
            crypto_currency: symbol,
            amount: outcome.quote.amount,
            network_fee: outcome.quote.network_fee,
            total_amount: outcome.quote.total,
            usd_value: tx.usd_value,
            wallet_address: mask_address(tx.wallet_address.as_deref().unwrap_or_default()),
            network: tx.network.unwrap_or_default(),
            status: tx.status,
            date: tx.created_at,
        },
    }))
}

#[derive(Debug, Serialize)]
pub struct CryptoTransactionsResponse {
    success: bool,
    transactions: Vec<CryptoTransaction>,
}

async fn list_sends(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<CryptoTransactionsResponse>, ApiError> {
    let transactions = CryptoTransaction::list_sends(&state.pool, user.id, 20)
        .await
        .map_err(|e| internal("Failed to fetch transfers", e))?;

    Ok(Json(CryptoTransactionsResponse {
        success: true,
        transactions,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "type")]
    tx_type: Option<String>,
    limit: Option<i64>,
}

async fn list_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<CryptoTransactionsResponse>, ApiError> {
    let tx_type = match query.tx_type.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(
            CryptoTxType::parse(raw)
                .ok_or_else(|| error(StatusCode::BAD_REQUEST, "Invalid transaction type"))?,
        ),
    };
    let limit = clamp_limit(query.limit, 50, 100);

    let transactions = CryptoTransaction::list_for_user(&state.pool, user.id, tx_type, limit)
        .await
        .map_err(|e| internal("Failed to fetch transactions", e))?;

    Ok(Json(CryptoTransactionsResponse {
        success: true,
        transactions,
    }))
}
