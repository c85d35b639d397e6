use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::CryptoTransaction;

pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(3600);

/// A wallet row whose locked balance disagrees with its pending sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockMismatch {
    pub user_id: Uuid,
    pub symbol: String,
    pub locked: Decimal,
    pub pending: Decimal,
}

/// Spawns a background task that checks locked crypto against pending
/// sends every hour. It only reports; balances are never touched.
pub fn spawn_reconciliation_task(pool: PgPool) {
    tokio::spawn(async move {
        tracing::info!(
            "Scheduler started - lock reconciliation every {} minutes",
            RECONCILE_INTERVAL.as_secs() / 60
        );

        let mut interval = tokio::time::interval(RECONCILE_INTERVAL);
        loop {
            interval.tick().await;

            match reconcile_locks(&pool).await {
                Ok(mismatches) if mismatches.is_empty() => {
                    tracing::debug!("Lock reconciliation clean");
                }
                Ok(mismatches) => {
                    for m in &mismatches {
                        tracing::warn!(
                            "Locked {} for user {} is {} but pending sends total {}",
                            m.symbol,
                            m.user_id,
                            m.locked,
                            m.pending
                        );
                    }
                }
                Err(e) => tracing::error!("Failed to reconcile crypto locks: {}", e),
            }
        }
    });
}

pub async fn reconcile_locks(pool: &PgPool) -> Result<Vec<LockMismatch>, sqlx::Error> {
    let locked = sqlx::query_as::<_, (Uuid, String, Decimal)>(
        "SELECT user_id, symbol, locked_balance FROM crypto_balances WHERE locked_balance > 0"
    )
    .fetch_all(pool)
    .await?;

    let pending = CryptoTransaction::pending_totals(pool).await?;

    Ok(compare(locked, pending))
}

fn compare(locked: Vec<(Uuid, String, Decimal)>, pending: Vec<(Uuid, String, Decimal)>) -> Vec<LockMismatch> {
    let mut expected: HashMap<(Uuid, String), Decimal> = pending
        .into_iter()
        .map(|(user_id, symbol, total)| ((user_id, symbol), total))
        .collect();

    let mut mismatches: Vec<LockMismatch> = locked
        .into_iter()
        .filter_map(|(user_id, symbol, locked)| {
            let pending = expected.remove(&(user_id, symbol.clone())).unwrap_or_default();
            (locked != pending).then_some(LockMismatch {
                user_id,
                symbol,
                locked,
                pending,
            })
        })
        .collect();

    // Pending sends with nothing locked behind them
    mismatches.extend(
        expected
            .into_iter()
            .filter(|(_, pending)| !pending.is_zero())
            .map(|((user_id, symbol), pending)| LockMismatch {
                user_id,
                symbol,
                locked: Decimal::ZERO,
                pending,
            }),
    );

    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn matching_locks_are_clean() {
        let user = Uuid::new_v4();
        let locked = vec![(user, "BTC".to_string(), dec!(0.5001))];
        let pending = vec![(user, "BTC".to_string(), dec!(0.5001))];
        assert!(compare(locked, pending).is_empty());
    }

    #[test]
    fn drift_is_reported_both_ways() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let locked = vec![(a, "ETH".to_string(), dec!(1.001))];
        let pending = vec![(b, "SOL".to_string(), dec!(2.01))];

        let mut found = compare(locked, pending);
        found.sort_by(|x, y| x.symbol.cmp(&y.symbol));

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].symbol, "ETH");
        assert_eq!(found[0].pending, Decimal::ZERO);
        assert_eq!(found[1].symbol, "SOL");
        assert_eq!(found[1].locked, Decimal::ZERO);
    }
}
