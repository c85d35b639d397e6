mod crypto_transaction;
mod crypto_wallet;
pub mod reference;
mod transaction;
mod user;

pub use crypto_transaction::{
    mask_address, ConversionOutcome, CryptoError, CryptoTransaction, CryptoTxStatus, CryptoTxType,
    PendingSend, SendDecision, SendOutcome, SendRequest, DEFAULT_REJECTION_REASON,
};
pub use crypto_wallet::{CryptoBalance, CryptoWallet, SUPPORTED_ASSETS};
pub use transaction::{
    InternalTransfer, NewTransaction, Recipient, Transaction, TransactionError, TransactionStatus,
};
pub use user::User;
