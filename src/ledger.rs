//! Balance-mutation rules shared by every handler that moves money.
//!
//! Nothing in here touches the database. Models load the current state
//! under a row lock, run it through these functions and write the result
//! back in the same transaction.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Fee charged on top of a USD -> crypto conversion (1%)
pub const CONVERSION_FEE_RATE: Decimal = dec!(0.01);
/// Smallest USD amount accepted for a conversion
pub const MIN_CONVERSION_USD: Decimal = dec!(10);
/// Crypto quantities are kept to 8 decimal places
pub const CRYPTO_DECIMALS: u32 = 8;
/// Cash balances are stored with 4 decimal places
pub const CASH_STORAGE_DECIMALS: u32 = 4;
/// Largest single amount accepted for any movement
pub const MAX_AMOUNT: Decimal = dec!(1000000000000);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Amount must be greater than 0")]
    InvalidAmount,
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: Decimal, required: Decimal },
    #[error("Insufficient crypto balance: available {available}, required {required}")]
    InsufficientCrypto { available: Decimal, required: Decimal },
    #[error("Minimum conversion is ${0}")]
    BelowMinimum(Decimal),
    #[error("Invalid price: {0}")]
    InvalidPrice(Decimal),
    #[error("Locked balance {locked} cannot cover {amount}")]
    LockUnderflow { locked: Decimal, amount: Decimal },
    #[error("Amount is too large")]
    AmountTooLarge,
}

/// Positive and within `MAX_AMOUNT`
pub fn check_amount(amount: Decimal) -> Result<Decimal, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount);
    }
    if amount > MAX_AMOUNT {
        return Err(LedgerError::AmountTooLarge);
    }
    Ok(amount)
}

pub fn checked_sum(a: Decimal, b: Decimal) -> Result<Decimal, LedgerError> {
    a.checked_add(b).ok_or(LedgerError::AmountTooLarge)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Credit => write!(f, "credit"),
            Direction::Debit => write!(f, "debit"),
        }
    }
}

/// Category tag of a cash transaction. The tag alone decides whether the
/// transaction adds to or takes from the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionKind {
    Deposit,
    TransferIn,
    Interest,
    AdjustmentCredit,
    Withdraw,
    Withdrawal,
    TransferOut,
    Fee,
    AdjustmentDebit,
    Payment,
    Charge,
    Purchase,
    WireTransfer,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 13] = [
        TransactionKind::Deposit,
        TransactionKind::TransferIn,
        TransactionKind::Interest,
        TransactionKind::AdjustmentCredit,
        TransactionKind::Withdraw,
        TransactionKind::Withdrawal,
        TransactionKind::TransferOut,
        TransactionKind::Fee,
        TransactionKind::AdjustmentDebit,
        TransactionKind::Payment,
        TransactionKind::Charge,
        TransactionKind::Purchase,
        TransactionKind::WireTransfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::TransferIn => "transfer-in",
            TransactionKind::Interest => "interest",
            TransactionKind::AdjustmentCredit => "adjustment-credit",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::TransferOut => "transfer-out",
            TransactionKind::Fee => "fee",
            TransactionKind::AdjustmentDebit => "adjustment-debit",
            TransactionKind::Payment => "payment",
            TransactionKind::Charge => "charge",
            TransactionKind::Purchase => "purchase",
            TransactionKind::WireTransfer => "wire-transfer",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            TransactionKind::Deposit
            | TransactionKind::TransferIn
            | TransactionKind::Interest
            | TransactionKind::AdjustmentCredit => Direction::Credit,
            _ => Direction::Debit,
        }
    }

    pub fn is_credit(&self) -> bool {
        self.direction() == Direction::Credit
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Comma separated list of accepted tags, for validation messages
    pub fn accepted() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Checking,
    Savings,
    Investment,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "checking",
            AccountType::Savings => "savings",
            AccountType::Investment => "investment",
        }
    }

    /// Column holding this account's balance on `users`
    pub fn column(&self) -> &'static str {
        match self {
            AccountType::Checking => "checking_balance",
            AccountType::Savings => "savings_balance",
            AccountType::Investment => "investment_balance",
        }
    }

    /// Name of the balance as it appears in API responses
    pub fn field(&self) -> &'static str {
        match self {
            AccountType::Checking => "checkingBalance",
            AccountType::Savings => "savingsBalance",
            AccountType::Investment => "investmentBalance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "checking" => Some(AccountType::Checking),
            "savings" => Some(AccountType::Savings),
            "investment" => Some(AccountType::Investment),
            _ => None,
        }
    }

    /// Anything that is not savings or investment lands on checking.
    pub fn parse_or_checking(s: Option<&str>) -> Self {
        s.and_then(Self::parse).unwrap_or_default()
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceChange {
    pub previous: Decimal,
    pub current: Decimal,
    pub change: Decimal,
}

/// Apply one credit or debit to a balance.
///
/// Debits larger than the balance are refused; the balance never goes
/// negative.
pub fn apply(direction: Direction, current: Decimal, amount: Decimal) -> Result<BalanceChange, LedgerError> {
    let amount = check_amount(amount)?;

    let change = match direction {
        Direction::Credit => amount,
        Direction::Debit => {
            if amount > current {
                return Err(LedgerError::InsufficientFunds {
                    available: current,
                    required: amount,
                });
            }
            -amount
        }
    };

    Ok(BalanceChange {
        previous: current,
        current: checked_sum(current, change)?,
        change,
    })
}

/// The three cash balances of one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccountBalances {
    pub checking: Decimal,
    pub savings: Decimal,
    pub investment: Decimal,
}

impl AccountBalances {
    pub fn get(&self, account: AccountType) -> Decimal {
        match account {
            AccountType::Checking => self.checking,
            AccountType::Savings => self.savings,
            AccountType::Investment => self.investment,
        }
    }

    fn slot_mut(&mut self, account: AccountType) -> &mut Decimal {
        match account {
            AccountType::Checking => &mut self.checking,
            AccountType::Savings => &mut self.savings,
            AccountType::Investment => &mut self.investment,
        }
    }

    pub fn apply(
        &mut self,
        account: AccountType,
        direction: Direction,
        amount: Decimal,
    ) -> Result<BalanceChange, LedgerError> {
        let change = apply(direction, self.get(account), amount)?;
        *self.slot_mut(account) = change.current;
        Ok(change)
    }

    pub fn total(&self) -> Decimal {
        self.checking + self.savings + self.investment
    }
}

/// Price of buying crypto with USD from a cash account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionQuote {
    pub usd_amount: Decimal,
    pub fee: Decimal,
    pub total_debit: Decimal,
    pub crypto_amount: Decimal,
    pub exchange_rate: Decimal,
}

impl ConversionQuote {
    /// The USD amount is taken to the cent, so the fee and total debit fit
    /// the cash columns exactly.
    pub fn usd_to_crypto(usd_amount: Decimal, price: Decimal) -> Result<Self, LedgerError> {
        let usd_amount = check_amount(usd_amount.round_dp(crate::money::CASH_DECIMALS))?;
        if usd_amount < MIN_CONVERSION_USD {
            return Err(LedgerError::BelowMinimum(MIN_CONVERSION_USD));
        }
        if price <= Decimal::ZERO {
            return Err(LedgerError::InvalidPrice(price));
        }

        let fee = usd_amount
            .checked_mul(CONVERSION_FEE_RATE)
            .ok_or(LedgerError::AmountTooLarge)?
            .round_dp(CASH_STORAGE_DECIMALS);
        let crypto_amount = usd_amount
            .checked_div(price)
            .ok_or(LedgerError::AmountTooLarge)?
            .round_dp(CRYPTO_DECIMALS);
        if crypto_amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }

        Ok(Self {
            usd_amount,
            fee,
            total_debit: checked_sum(usd_amount, fee)?,
            crypto_amount,
            exchange_rate: price,
        })
    }
}

/// Amount, network fee and the total that gets locked for an outbound send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendQuote {
    pub amount: Decimal,
    pub network_fee: Decimal,
    pub total: Decimal,
}

impl SendQuote {
    /// The amount is rounded to 8 places; anything that rounds to zero is
    /// refused.
    pub fn new(amount: Decimal, network_fee: Decimal) -> Result<Self, LedgerError> {
        let amount = check_amount(amount.round_dp(CRYPTO_DECIMALS))?;
        Ok(Self {
            amount,
            network_fee,
            total: checked_sum(amount, network_fee)?,
        })
    }
}

/// Balance of one crypto symbol. `locked` is the part earmarked for
/// pending sends; `0 <= locked <= balance` holds after every operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CryptoHolding {
    pub balance: Decimal,
    pub locked: Decimal,
}

impl CryptoHolding {
    pub fn available(&self) -> Decimal {
        self.balance - self.locked
    }

    pub fn credit(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        self.balance = checked_sum(self.balance, amount)?;
        Ok(())
    }

    pub fn lock(&mut self, total: Decimal) -> Result<(), LedgerError> {
        if total <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let available = self.available();
        if total > available {
            return Err(LedgerError::InsufficientCrypto {
                available,
                required: total,
            });
        }
        self.locked += total;
        Ok(())
    }

    /// Give locked funds back without moving them (rejected send)
    pub fn release(&mut self, total: Decimal) -> Result<(), LedgerError> {
        self.check_locked(total)?;
        self.locked -= total;
        Ok(())
    }

    /// Spend locked funds (approved send)
    pub fn settle(&mut self, total: Decimal) -> Result<(), LedgerError> {
        self.check_locked(total)?;
        self.locked -= total;
        self.balance -= total;
        Ok(())
    }

    fn check_locked(&self, total: Decimal) -> Result<(), LedgerError> {
        if total <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if total > self.locked {
            return Err(LedgerError::LockUnderflow {
                locked: self.locked,
                amount: total,
            });
        }
        Ok(())
    }
}
