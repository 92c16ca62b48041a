use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate};

use crate::db::{Mutation, ScopedStore};
use crate::error::{AppError, Result};
use crate::models::{
    Collection, Identity, LedgerScope, PointCategory, PointTransaction, ScopeKey, Voucher,
};

/// Most points checks can earn in one local calendar day.
pub const DAILY_CHECK_CAP: i64 = 50;

pub const CHECK_REWARD: i64 = 5;

/// Flat reward for a confirmed report; not subject to the daily cap.
pub const REPORT_REWARD: i64 = 100;

pub const RECENT_HISTORY_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Credited(i64),
    Partial { granted: i64, requested: i64 },
    DailyLimitReached,
    /// No award was attempted (duplicate check, no ledger partition, ...).
    NotAwarded,
}

impl CreditOutcome {
    pub fn granted(self) -> i64 {
        match self {
            CreditOutcome::Credited(points) => points,
            CreditOutcome::Partial { granted, .. } => granted,
            CreditOutcome::DailyLimitReached | CreditOutcome::NotAwarded => 0,
        }
    }

    pub fn limit_message(self, earned_today: i64) -> Option<String> {
        match self {
            CreditOutcome::DailyLimitReached => Some(format!(
                "Daily check point limit ({DAILY_CHECK_CAP}P) reached. Check again tomorrow to earn more."
            )),
            CreditOutcome::Partial { .. } => Some(format!(
                "Points left today: {}P (daily max {DAILY_CHECK_CAP}P)",
                (DAILY_CHECK_CAP - earned_today).max(0)
            )),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct PointLedger {
    store: Arc<ScopedStore>,
    scope: LedgerScope,
}

impl PointLedger {
    pub fn new(store: Arc<ScopedStore>, scope: LedgerScope) -> Self {
        Self { store, scope }
    }

    fn partition(&self, identity: Option<&Identity>) -> Option<ScopeKey> {
        self.scope.resolve(identity)
    }

    /// Appends as given; capping is the caller's job. `false` when there is
    /// no partition to write to.
    pub async fn credit(
        &self,
        identity: Option<&Identity>,
        transaction: PointTransaction,
    ) -> Result<bool> {
        let Some(scope) = self.partition(identity) else {
            return Ok(false);
        };

        self.store
            .modify(Collection::PointHistory, &scope, move |txs: &mut Vec<PointTransaction>| {
                txs.push(transaction);
                Mutation::Persist(())
            })
            .await?;
        Ok(true)
    }

    pub async fn transactions(&self, identity: Option<&Identity>) -> Result<Vec<PointTransaction>> {
        let Some(scope) = self.partition(identity) else {
            return Ok(Vec::new());
        };
        self.store.load(Collection::PointHistory, &scope).await
    }

    pub async fn balance(&self, identity: Option<&Identity>) -> Result<i64> {
        Ok(balance_of(&self.transactions(identity).await?))
    }

    pub async fn daily_earned(&self, identity: Option<&Identity>, day: NaiveDate) -> Result<i64> {
        Ok(daily_earned_in(&self.transactions(identity).await?, day))
    }

    pub async fn history(
        &self,
        identity: Option<&Identity>,
        limit: Option<usize>,
    ) -> Result<Vec<PointTransaction>> {
        let mut txs = self.transactions(identity).await?;
        txs.reverse();
        txs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = limit {
            txs.truncate(limit);
        }
        Ok(txs)
    }

    // Cap check and append share one transaction.
    pub async fn award_check(
        &self,
        identity: Option<&Identity>,
        category: PointCategory,
        requested: i64,
        now: DateTime<Local>,
    ) -> Result<CreditOutcome> {
        let Some(scope) = self.partition(identity) else {
            return Ok(CreditOutcome::NotAwarded);
        };
        if !category.is_check() || requested <= 0 {
            return Ok(CreditOutcome::NotAwarded);
        }

        let today = now.date_naive();
        let timestamp = now.timestamp_millis();

        let outcome = self
            .store
            .modify(Collection::PointHistory, &scope, move |txs: &mut Vec<PointTransaction>| {
                let earned = daily_earned_in(txs, today);
                let granted = clamp_to_daily_cap(earned, requested);

                if granted == 0 {
                    return Mutation::Skip(CreditOutcome::DailyLimitReached);
                }

                txs.push(PointTransaction::new(category, granted, timestamp));
                if granted < requested {
                    Mutation::Persist(CreditOutcome::Partial { granted, requested })
                } else {
                    Mutation::Persist(CreditOutcome::Credited(granted))
                }
            })
            .await?;

        match outcome {
            CreditOutcome::DailyLimitReached => {
                tracing::debug!("Daily check point limit reached, nothing credited")
            }
            CreditOutcome::Partial { granted, requested } => {
                tracing::debug!("Check reward clamped from {} to {}", requested, granted)
            }
            _ => {}
        }

        Ok(outcome)
    }

    pub async fn credit_report(&self, identity: Option<&Identity>, now: DateTime<Local>) -> Result<bool> {
        let tx = PointTransaction::new(PointCategory::Report, REPORT_REWARD, now.timestamp_millis());
        self.credit(identity, tx).await
    }

    pub async fn redeem(
        &self,
        identity: Option<&Identity>,
        voucher: &Voucher,
        now: DateTime<Local>,
    ) -> Result<i64> {
        let scope = self.partition(identity).ok_or(AppError::MissingIdentity)?;
        let cost = voucher.cost;
        let tx = PointTransaction::new(PointCategory::Redemption, -cost, now.timestamp_millis())
            .with_note(voucher.name);

        let result = self
            .store
            .modify(Collection::PointHistory, &scope, move |txs: &mut Vec<PointTransaction>| {
                let balance = balance_of(txs);
                if balance < cost {
                    return Mutation::Skip(Err(AppError::InsufficientPoints { balance, cost }));
                }
                txs.push(tx);
                Mutation::Persist(Ok(balance - cost))
            })
            .await?;

        if let Ok(balance) = &result {
            tracing::info!("Redeemed {} for {}P, balance now {}P", voucher.name, cost, balance);
        }
        result
    }

    pub async fn clear(&self, identity: Option<&Identity>) -> Result<()> {
        if let Some(scope) = self.partition(identity) {
            self.store.reset(Collection::PointHistory, &scope).await?;
        }
        Ok(())
    }
}

pub fn balance_of(txs: &[PointTransaction]) -> i64 {
    txs.iter().map(|tx| tx.points).sum()
}

pub fn daily_earned_in(txs: &[PointTransaction], day: NaiveDate) -> i64 {
    txs.iter()
        .filter(|tx| tx.category.is_check() && tx.local_day() == Some(day))
        .map(|tx| tx.points)
        .sum()
}

pub fn clamp_to_daily_cap(earned_today: i64, requested: i64) -> i64 {
    if earned_today + requested > DAILY_CHECK_CAP {
        (DAILY_CHECK_CAP - earned_today).max(0)
    } else {
        requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tokio_test::{assert_err, assert_ok};

    use crate::models::VOUCHERS;

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
    }

    async fn ledger() -> PointLedger {
        let store = Arc::new(ScopedStore::open_in_memory().await.unwrap());
        PointLedger::new(store, LedgerScope::Global)
    }

    #[test]
    fn clamp_rules() {
        assert_eq!(clamp_to_daily_cap(0, 30), 30);
        assert_eq!(clamp_to_daily_cap(30, 30), 20);
        assert_eq!(clamp_to_daily_cap(50, 5), 0);
        assert_eq!(clamp_to_daily_cap(60, 5), 0);
    }

    #[tokio::test]
    async fn daily_cap_clamps_second_credit() {
        let ledger = ledger().await;

        let first = ledger
            .award_check(None, PointCategory::UrlCheck, 30, noon())
            .await
            .unwrap();
        let second = ledger
            .award_check(None, PointCategory::UrlCheck, 30, noon() + Duration::minutes(1))
            .await
            .unwrap();

        assert_eq!(first, CreditOutcome::Credited(30));
        assert_eq!(second, CreditOutcome::Partial { granted: 20, requested: 30 });

        let stored: Vec<i64> = ledger
            .transactions(None)
            .await
            .unwrap()
            .iter()
            .map(|tx| tx.points)
            .collect();
        assert_eq!(stored, vec![30, 20]);
        assert_eq!(ledger.daily_earned(None, noon().date_naive()).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn exhausted_cap_appends_nothing() {
        let ledger = ledger().await;

        ledger
            .award_check(None, PointCategory::ImageCheck, 50, noon())
            .await
            .unwrap();
        let outcome = ledger
            .award_check(None, PointCategory::UrlCheck, 5, noon())
            .await
            .unwrap();

        assert_eq!(outcome, CreditOutcome::DailyLimitReached);
        assert_eq!(ledger.transactions(None).await.unwrap().len(), 1);
        assert!(outcome.limit_message(50).is_some());
    }

    #[tokio::test]
    async fn report_credit_ignores_the_cap() {
        let ledger = ledger().await;

        ledger
            .award_check(None, PointCategory::UrlCheck, 30, noon())
            .await
            .unwrap();
        ledger
            .award_check(None, PointCategory::UrlCheck, 30, noon())
            .await
            .unwrap();
        let before = ledger.balance(None).await.unwrap();

        assert!(ledger.credit_report(None, noon()).await.unwrap());
        assert_eq!(ledger.balance(None).await.unwrap(), before + REPORT_REWARD);
        assert_eq!(ledger.daily_earned(None, noon().date_naive()).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn yesterdays_checks_do_not_count_today() {
        let ledger = ledger().await;

        ledger
            .award_check(None, PointCategory::UrlCheck, 50, noon() - Duration::days(1))
            .await
            .unwrap();
        let outcome = ledger
            .award_check(None, PointCategory::UrlCheck, 5, noon())
            .await
            .unwrap();
        assert_eq!(outcome, CreditOutcome::Credited(5));
    }

    #[tokio::test]
    async fn redemption_requires_sufficient_balance() {
        let ledger = ledger().await;
        let voucher = VOUCHERS[0];

        let denied = ledger.redeem(None, &voucher, noon()).await;
        assert!(matches!(
            denied,
            Err(AppError::InsufficientPoints { balance: 0, cost: 1_000 })
        ));
        assert!(ledger.transactions(None).await.unwrap().is_empty());

        for _ in 0..11 {
            assert_ok!(ledger.credit_report(None, noon()).await);
        }
        let remaining = assert_ok!(ledger.redeem(None, &voucher, noon()).await);
        assert_eq!(remaining, 100);

        let latest = ledger.history(None, Some(1)).await.unwrap();
        assert_eq!(latest[0].category, PointCategory::Redemption);
        assert_eq!(latest[0].points, -1_000);
        assert_eq!(latest[0].note.as_deref(), Some(voucher.name));
    }

    #[tokio::test]
    async fn history_is_most_recent_first() {
        let ledger = ledger().await;

        for i in 0..8 {
            let tx = PointTransaction::new(PointCategory::Report, 100, 1_000 + i);
            ledger.credit(None, tx).await.unwrap();
        }

        let recent = ledger.history(None, Some(RECENT_HISTORY_LIMIT)).await.unwrap();
        let stamps: Vec<i64> = recent.iter().map(|tx| tx.timestamp).collect();
        assert_eq!(stamps, vec![1_007, 1_006, 1_005, 1_004, 1_003]);
        assert_eq!(ledger.history(None, None).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn balance_survives_reload_between_steps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.db");
        let path = path.to_str().unwrap().to_string();
        let amounts = [100, 5, -30, 100, -75, 5];

        for (i, points) in amounts.iter().enumerate() {
            let store = Arc::new(ScopedStore::open(&path).await.unwrap());
            let ledger = PointLedger::new(store, LedgerScope::Global);
            let tx = PointTransaction::new(PointCategory::Report, *points, i as i64);
            ledger.credit(None, tx).await.unwrap();
        }

        let store = Arc::new(ScopedStore::open(&path).await.unwrap());
        let ledger = PointLedger::new(store, LedgerScope::Global);
        assert_eq!(ledger.balance(None).await.unwrap(), amounts.iter().sum::<i64>());
    }

    #[tokio::test]
    async fn identity_scope_fails_closed_and_isolates() {
        let store = Arc::new(ScopedStore::open_in_memory().await.unwrap());
        let ledger = PointLedger::new(store, LedgerScope::Identity);
        let alice = Identity::parse("alice@example.com").unwrap();
        let bob = Identity::parse("bob@example.com").unwrap();

        assert!(!ledger.credit_report(None, noon()).await.unwrap());
        assert_eq!(
            ledger
                .award_check(None, PointCategory::UrlCheck, 5, noon())
                .await
                .unwrap(),
            CreditOutcome::NotAwarded
        );
        assert_err!(ledger.redeem(None, &VOUCHERS[0], noon()).await);

        ledger.credit_report(Some(&alice), noon()).await.unwrap();
        assert_eq!(ledger.balance(Some(&alice)).await.unwrap(), 100);
        assert_eq!(ledger.balance(Some(&bob)).await.unwrap(), 0);
    }
}
