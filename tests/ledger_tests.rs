mod common;

use common::{create_test_user, fund, reload, setup_db};
use rust_decimal_macros::dec;
use serial_test::serial;
use teller::ledger::{AccountType, LedgerError, TransactionKind};
use teller::models::reference::{self, ReferenceKind};
use teller::models::{NewTransaction, Transaction, TransactionError, TransactionStatus};
use uuid::Uuid;

fn admin_entry(user_id: Uuid, kind: TransactionKind, amount: rust_decimal::Decimal) -> NewTransaction {
    let mut new = NewTransaction::new(user_id, kind, amount, reference::generate(ReferenceKind::Admin));
    new.channel = "admin";
    new.origin = "admin_panel";
    new
}

// =============================================================================
// POSTED TRANSACTIONS
// =============================================================================

#[tokio::test]
#[serial]
async fn test_posted_deposit_updates_balance() {
    let Some(pool) = setup_db().await else { return };
    let user = create_test_user(&pool, "deposit@test.com").await;

    let mut new = admin_entry(user.id, TransactionKind::Deposit, dec!(250.50));
    new.account_type = AccountType::Savings;

    let (tx, change) = Transaction::post(&pool, new, TransactionStatus::Approved, None)
        .await
        .expect("Deposit should succeed");

    assert_eq!(tx.status, "approved");
    assert!(tx.posted);
    assert!(tx.posted_at.is_some());
    assert_eq!(tx.account_type, "savings");
    assert_eq!(change.previous, dec!(0));
    assert_eq!(change.current, dec!(250.50));

    let user = reload(&pool, user.id).await;
    assert_eq!(user.savings_balance, dec!(250.50));
    assert_eq!(user.checking_balance, dec!(0));
}

#[tokio::test]
#[serial]
async fn test_overdraft_is_refused_and_nothing_is_written() {
    let Some(pool) = setup_db().await else { return };
    let user = create_test_user(&pool, "overdraft@test.com").await;
    fund(&pool, user.id, AccountType::Checking, dec!(1000)).await;

    let result = Transaction::post(
        &pool,
        admin_entry(user.id, TransactionKind::Withdrawal, dec!(1500)),
        TransactionStatus::Approved,
        None,
    )
    .await;

    match result {
        Err(TransactionError::Ledger(LedgerError::InsufficientFunds { available, required })) => {
            assert_eq!(available, dec!(1000));
            assert_eq!(required, dec!(1500));
        }
        other => panic!("Expected insufficient funds, got {:?}", other.map(|(t, _)| t.reference)),
    }

    let user = reload(&pool, user.id).await;
    assert_eq!(user.checking_balance, dec!(1000));

    let history = Transaction::list_for_user(&pool, user.id, 50).await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
#[serial]
async fn test_concurrent_withdrawals_cannot_overdraw() {
    let Some(pool) = setup_db().await else { return };
    let user = create_test_user(&pool, "race@test.com").await;
    fund(&pool, user.id, AccountType::Checking, dec!(1000)).await;

    let (first, second) = tokio::join!(
        Transaction::post(
            &pool,
            admin_entry(user.id, TransactionKind::Withdrawal, dec!(600)),
            TransactionStatus::Approved,
            None,
        ),
        Transaction::post(
            &pool,
            admin_entry(user.id, TransactionKind::Withdrawal, dec!(600)),
            TransactionStatus::Approved,
            None,
        ),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(TransactionError::Ledger(LedgerError::InsufficientFunds { .. }))
    )));

    assert_eq!(reload(&pool, user.id).await.checking_balance, dec!(400));
    assert_eq!(Transaction::list_for_user(&pool, user.id, 50).await.unwrap().len(), 1);
}

// =============================================================================
// PENDING TRANSACTIONS
// =============================================================================

#[tokio::test]
#[serial]
async fn test_submit_leaves_balance_untouched() {
    let Some(pool) = setup_db().await else { return };
    let user = create_test_user(&pool, "submit@test.com").await;
    fund(&pool, user.id, AccountType::Checking, dec!(500)).await;

    let tx = Transaction::submit(&pool, admin_entry(user.id, TransactionKind::Withdrawal, dec!(200)))
        .await
        .expect("Submit should succeed");

    assert_eq!(tx.status, "pending");
    assert!(!tx.posted);

    let user = reload(&pool, user.id).await;
    assert_eq!(user.checking_balance, dec!(500));
}

#[tokio::test]
#[serial]
async fn test_approve_applies_amount_and_fee() {
    let Some(pool) = setup_db().await else { return };
    let user = create_test_user(&pool, "approve@test.com").await;
    let admin = create_test_user(&pool, "admin@test.com").await;
    fund(&pool, user.id, AccountType::Checking, dec!(1000)).await;

    let mut wire = NewTransaction::new(
        user.id,
        TransactionKind::WireTransfer,
        dec!(400),
        reference::generate(ReferenceKind::Wire),
    );
    wire.fee = dec!(30);
    let pending = Transaction::submit(&pool, wire).await.unwrap();

    let (approved, change) = Transaction::approve(&pool, pending.id, admin.id)
        .await
        .expect("Approve should succeed");

    assert_eq!(approved.status, "approved");
    assert_eq!(approved.approved_by, Some(admin.id));
    assert!(approved.posted);
    assert_eq!(change.previous, dec!(1000));
    assert_eq!(change.current, dec!(570));

    let user = reload(&pool, user.id).await;
    assert_eq!(user.checking_balance, dec!(570));
}

#[tokio::test]
#[serial]
async fn test_approve_rechecks_funds() {
    let Some(pool) = setup_db().await else { return };
    let user = create_test_user(&pool, "recheck@test.com").await;
    let admin = create_test_user(&pool, "admin2@test.com").await;
    fund(&pool, user.id, AccountType::Checking, dec!(300)).await;

    let pending = Transaction::submit(&pool, admin_entry(user.id, TransactionKind::Withdrawal, dec!(250)))
        .await
        .unwrap();

    // Balance drops below the request between submission and approval
    fund(&pool, user.id, AccountType::Checking, dec!(100)).await;

    let result = Transaction::approve(&pool, pending.id, admin.id).await;
    assert!(matches!(
        result,
        Err(TransactionError::Ledger(LedgerError::InsufficientFunds { .. }))
    ));

    let still_pending = Transaction::find_by_id(&pool, pending.id).await.unwrap().unwrap();
    assert_eq!(still_pending.status, "pending");
    assert_eq!(reload(&pool, user.id).await.checking_balance, dec!(100));
}

#[tokio::test]
#[serial]
async fn test_approved_deposit_credits_checking() {
    let Some(pool) = setup_db().await else { return };
    let user = create_test_user(&pool, "approve_deposit@test.com").await;
    let admin = create_test_user(&pool, "admin5@test.com").await;

    let pending = Transaction::submit(&pool, admin_entry(user.id, TransactionKind::Deposit, dec!(500)))
        .await
        .unwrap();
    assert_eq!(reload(&pool, user.id).await.checking_balance, dec!(0));

    let (approved, change) = Transaction::approve(&pool, pending.id, admin.id)
        .await
        .expect("Approve should succeed");

    assert_eq!(approved.status, "approved");
    assert!(approved.posted);
    assert_eq!(change.previous, dec!(0));
    assert_eq!(change.current, dec!(500));
    assert_eq!(reload(&pool, user.id).await.checking_balance, dec!(500));
}

#[tokio::test]
#[serial]
async fn test_decided_transactions_cannot_be_decided_again() {
    let Some(pool) = setup_db().await else { return };
    let user = create_test_user(&pool, "twice@test.com").await;
    let admin = create_test_user(&pool, "admin3@test.com").await;

    let pending = Transaction::submit(&pool, admin_entry(user.id, TransactionKind::Deposit, dec!(75)))
        .await
        .unwrap();

    Transaction::approve(&pool, pending.id, admin.id).await.unwrap();

    let again = Transaction::approve(&pool, pending.id, admin.id).await;
    assert!(matches!(again, Err(TransactionError::AlreadyProcessed(ref s)) if s == "approved"));

    let decline = Transaction::decline(&pool, pending.id, admin.id, "late").await;
    assert!(matches!(decline, Err(TransactionError::AlreadyProcessed(_))));

    // Credited exactly once
    assert_eq!(reload(&pool, user.id).await.checking_balance, dec!(75));
}

#[tokio::test]
#[serial]
async fn test_decline_records_reason() {
    let Some(pool) = setup_db().await else { return };
    let user = create_test_user(&pool, "decline@test.com").await;
    let admin = create_test_user(&pool, "admin4@test.com").await;
    fund(&pool, user.id, AccountType::Checking, dec!(90)).await;

    let pending = Transaction::submit(&pool, admin_entry(user.id, TransactionKind::Withdrawal, dec!(50)))
        .await
        .unwrap();

    let declined = Transaction::decline(&pool, pending.id, admin.id, "Suspicious activity")
        .await
        .unwrap();

    assert_eq!(declined.status, "rejected");
    assert_eq!(declined.rejection_reason.as_deref(), Some("Suspicious activity"));
    assert_eq!(reload(&pool, user.id).await.checking_balance, dec!(90));

    let missing = Transaction::approve(&pool, Uuid::new_v4(), admin.id).await;
    assert!(matches!(missing, Err(TransactionError::NotFound)));
}

// =============================================================================
// INTERNAL TRANSFERS
// =============================================================================

#[tokio::test]
#[serial]
async fn test_internal_transfer_moves_both_legs() {
    let Some(pool) = setup_db().await else { return };
    let user = create_test_user(&pool, "internal@test.com").await;
    fund(&pool, user.id, AccountType::Checking, dec!(800)).await;

    let transfer = Transaction::transfer_internal(
        &pool,
        user.id,
        AccountType::Checking,
        AccountType::Investment,
        dec!(300),
        "",
    )
    .await
    .expect("Transfer should succeed");

    assert_eq!(transfer.debit.kind, "transfer-out");
    assert_eq!(transfer.credit.kind, "transfer-in");
    assert_eq!(transfer.credit.reference, format!("{}-IN", transfer.debit.reference));
    assert_eq!(transfer.debit.status, "completed");
    assert_eq!(transfer.debit.description, "Transfer from checking to investment");

    let user = reload(&pool, user.id).await;
    assert_eq!(user.checking_balance, dec!(500));
    assert_eq!(user.investment_balance, dec!(300));
}

#[tokio::test]
#[serial]
async fn test_internal_transfer_guards() {
    let Some(pool) = setup_db().await else { return };
    let user = create_test_user(&pool, "guards@test.com").await;
    fund(&pool, user.id, AccountType::Savings, dec!(100)).await;

    let same = Transaction::transfer_internal(
        &pool,
        user.id,
        AccountType::Savings,
        AccountType::Savings,
        dec!(10),
        "",
    )
    .await;
    assert!(matches!(same, Err(TransactionError::SameAccount)));

    let short = Transaction::transfer_internal(
        &pool,
        user.id,
        AccountType::Savings,
        AccountType::Checking,
        dec!(100.01),
        "",
    )
    .await;
    assert!(matches!(
        short,
        Err(TransactionError::Ledger(LedgerError::InsufficientFunds { .. }))
    ));

    let user = reload(&pool, user.id).await;
    assert_eq!(user.savings_balance, dec!(100));
    assert_eq!(user.checking_balance, dec!(0));
}

#[tokio::test]
#[serial]
async fn test_status_filter() {
    let Some(pool) = setup_db().await else { return };
    let user = create_test_user(&pool, "filter@test.com").await;

    Transaction::submit(&pool, admin_entry(user.id, TransactionKind::Deposit, dec!(5)))
        .await
        .unwrap();
    Transaction::post(
        &pool,
        admin_entry(user.id, TransactionKind::Deposit, dec!(7)),
        TransactionStatus::Approved,
        None,
    )
    .await
    .unwrap();

    let pending = Transaction::list_by_status(&pool, Some(TransactionStatus::Pending), 100)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].amount, dec!(5));

    let all = Transaction::list_by_status(&pool, None, 100).await.unwrap();
    assert_eq!(all.len(), 2);
}
