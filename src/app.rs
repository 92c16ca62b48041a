use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::config::Config;
use crate::db::ScopedStore;
use crate::error::{AppError, Result};
use crate::ledger::{
    AccountBook, CheckRecordLedger, CreditOutcome, PointLedger, ReportStateTracker, CHECK_REWARD,
    RECENT_HISTORY_LIMIT,
};
use crate::models::{
    CheckKind, CheckRecord, Identity, PointCategory, PointTransaction, Voucher, RELIABLE_THRESHOLD,
};
use crate::reconcile::{HistoryStats, ReconciliationPolicy, View};
use crate::report::{
    remove_report_image, PendingReports, ReportDraft, ReportFlow, ReportMessage, ReportReceipt,
    ReportState, ReportTransport,
};
use crate::services::{EvaluationResult, HistoryApiClient};

/// What happened to a finished evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub record: CheckRecord,
    /// `false` when the check was a duplicate within the window, or nobody is
    /// logged in.
    pub inserted: bool,
    pub credit: CreditOutcome,
}

/// Point balance summary for the rewards screen.
#[derive(Debug, Clone)]
pub struct PointSummary {
    pub balance: i64,
    pub earned_today: i64,
    pub recent: Vec<PointTransaction>,
}

pub struct App {
    pub history: CheckRecordLedger,
    pub points: PointLedger,
    pub reports: ReportStateTracker,
    pub account: AccountBook,
    pending: PendingReports,
    reconciliation: ReconciliationPolicy<HistoryApiClient>,
    report_recipient: String,
    image_dir: PathBuf,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let store = ScopedStore::open(&config.db_path).await?;
        Self::with_store(store, config)
    }

    pub fn with_store(store: ScopedStore, config: &Config) -> Result<Self> {
        let store = Arc::new(store);
        let history = CheckRecordLedger::new(store.clone());

        let remote = config
            .api_base_url
            .as_deref()
            .map(|url| HistoryApiClient::new(url, config.remote_timeout()))
            .transpose()?;

        Ok(Self {
            points: PointLedger::new(store.clone(), config.ledger_scope),
            reports: ReportStateTracker::new(store.clone(), config.ledger_scope),
            account: AccountBook::new(store.clone()),
            pending: PendingReports::new(store),
            reconciliation: ReconciliationPolicy::new(
                history.clone(),
                remote,
                config.remote_timeout(),
            ),
            history,
            report_recipient: config.report_recipient.clone(),
            image_dir: PathBuf::from(&config.image_dir),
        })
    }

    pub async fn identity(&self) -> Result<Option<Identity>> {
        self.account.current().await
    }

    pub async fn login(&self, email: &str, remember_email: bool) -> Result<Identity> {
        let identity = Identity::parse(email).ok_or(AppError::MissingIdentity)?;
        self.account.login(identity.clone(), remember_email).await?;
        Ok(identity)
    }

    pub async fn logout(&self) -> Result<()> {
        self.account.logout().await
    }

    /// Records a finished evaluation and pays the check reward.
    ///
    /// For an unreliable image, `image_source` is copied into the image
    /// directory so it can be attached to a report later. The reward is only
    /// paid when the record actually lands in history.
    pub async fn complete_evaluation(
        &self,
        kind: CheckKind,
        subject: &str,
        result: EvaluationResult,
        image_source: Option<&Path>,
    ) -> Result<EvaluationOutcome> {
        let now = Local::now();
        let identity = self.identity().await?;

        let saved_image_path = match image_source {
            Some(source) if kind == CheckKind::Image && result.score() < RELIABLE_THRESHOLD => {
                self.keep_report_image(source, now).await
            }
            _ => None,
        };

        let candidate = result.into_record(kind, subject, saved_image_path, now);
        let stored = self
            .history
            .insert(identity.as_ref(), candidate.clone())
            .await?;

        let Some(record) = stored else {
            if let Some(path) = &candidate.saved_image_path {
                remove_report_image(path).await;
            }
            return Ok(EvaluationOutcome {
                record: candidate,
                inserted: false,
                credit: CreditOutcome::NotAwarded,
            });
        };

        let category = match kind {
            CheckKind::Url => Some(PointCategory::UrlCheck),
            CheckKind::Image => Some(PointCategory::ImageCheck),
            CheckKind::Other => None,
        };
        let credit = match category {
            Some(category) => {
                self.points
                    .award_check(identity.as_ref(), category, CHECK_REWARD, now)
                    .await?
            }
            None => CreditOutcome::NotAwarded,
        };

        Ok(EvaluationOutcome {
            record,
            inserted: true,
            credit,
        })
    }

    async fn keep_report_image(&self, source: &Path, now: DateTime<Local>) -> Option<String> {
        if let Err(e) = tokio::fs::create_dir_all(&self.image_dir).await {
            tracing::warn!("Cannot create image directory {:?}: {}", self.image_dir, e);
            return None;
        }

        let stamp = now.timestamp_millis();
        let mut target = self.image_dir.join(format!("report_image_{}.jpg", stamp));
        let mut n = 1;
        while tokio::fs::try_exists(&target).await.unwrap_or(false) {
            target = self
                .image_dir
                .join(format!("report_image_{}_{}.jpg", stamp, n));
            n += 1;
        }
        match tokio::fs::copy(source, &target).await {
            Ok(_) => Some(target.to_string_lossy().to_string()),
            Err(e) => {
                tracing::warn!("Failed to keep report image {:?}: {}", source, e);
                None
            }
        }
    }

    pub async fn view(&self) -> Result<View> {
        let identity = self.identity().await?;
        self.reconciliation.view(identity.as_ref()).await
    }

    pub async fn stats(&self) -> Result<HistoryStats> {
        Ok(self.view().await?.stats())
    }

    /// Local records with a low score that have not been reported yet.
    pub async fn reportable(&self) -> Result<Vec<CheckRecord>> {
        let identity = self.identity().await?;
        let records = self.history.list(identity.as_ref()).await?;
        self.reports.reportable(identity.as_ref(), records).await
    }

    pub async fn points_summary(&self) -> Result<PointSummary> {
        let identity = self.identity().await?;
        let identity = identity.as_ref();
        Ok(PointSummary {
            balance: self.points.balance(identity).await?,
            earned_today: self
                .points
                .daily_earned(identity, Local::now().date_naive())
                .await?,
            recent: self
                .points
                .history(identity, Some(RECENT_HISTORY_LIMIT))
                .await?,
        })
    }

    pub async fn redeem(&self, cost: i64) -> Result<i64> {
        let voucher = Voucher::by_cost(cost)
            .ok_or_else(|| AppError::NotFound(format!("voucher for {}P", cost)))?;
        let identity = self.identity().await?;
        self.points
            .redeem(identity.as_ref(), &voucher, Local::now())
            .await
    }

    pub async fn pending_reports(&self) -> Result<Vec<ReportFlow>> {
        let identity = self.identity().await?;
        self.pending.list(identity.as_ref()).await
    }

    /// Composes a report for history record `record_id` and hands it to
    /// `transport`. The flow is kept as pending until confirmed.
    pub async fn submit_report<T: ReportTransport>(
        &self,
        record_id: i64,
        reporter_name: &str,
        reason: &str,
        transport: &T,
    ) -> Result<ReportMessage> {
        let identity = self.identity().await?.ok_or(AppError::MissingIdentity)?;
        let record = self
            .history
            .find(Some(&identity), record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("check record {}", record_id)))?;

        let mut flow = ReportFlow::new(ReportDraft {
            record,
            reporter_name: reporter_name.to_string(),
            reporter_email: identity.to_string(),
            reason: reason.to_string(),
        });

        let message = flow
            .submit(
                Some(&identity),
                &self.reports,
                transport,
                &self.report_recipient,
                Local::now(),
            )
            .await?;
        self.pending.save(Some(&identity), flow).await?;
        Ok(message)
    }

    async fn returning_flow(&self, identity: &Identity, record_id: i64) -> Result<ReportFlow> {
        let mut flow = self
            .pending
            .get(Some(identity), record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("pending report {}", record_id)))?;
        if flow.state() == ReportState::Submitted {
            flow.resume()?;
        }
        Ok(flow)
    }

    /// The user confirms the report email went out.
    pub async fn confirm_report(&self, record_id: i64) -> Result<ReportReceipt> {
        let identity = self.identity().await?.ok_or(AppError::MissingIdentity)?;
        let mut flow = self.returning_flow(&identity, record_id).await?;

        match flow
            .confirm(Some(&identity), &self.reports, &self.points, Local::now())
            .await
        {
            Ok(receipt) => {
                self.pending.save(Some(&identity), flow).await?;
                Ok(receipt)
            }
            Err(e @ AppError::AlreadyReported(_)) => {
                self.pending.remove(Some(&identity), record_id).await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// The user has not sent the email yet; keep the report for later.
    pub async fn defer_report(&self, record_id: i64) -> Result<ReportState> {
        let identity = self.identity().await?.ok_or(AppError::MissingIdentity)?;
        let mut flow = self.returning_flow(&identity, record_id).await?;
        flow.defer()?;
        let state = flow.state();
        self.pending.save(Some(&identity), flow).await?;
        Ok(state)
    }

    pub async fn clear_history(&self) -> Result<()> {
        let identity = self.identity().await?;
        self.history.clear(identity.as_ref()).await
    }

    pub async fn clear_reported(&self) -> Result<()> {
        let identity = self.identity().await?;
        self.reports.clear(identity.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::models::LedgerScope;

    #[derive(Default)]
    struct RecordingTransport {
        sent: RefCell<Vec<ReportMessage>>,
    }

    impl ReportTransport for RecordingTransport {
        fn hand_off(&self, message: &ReportMessage) -> Result<()> {
            self.sent.borrow_mut().push(message.clone());
            Ok(())
        }
    }

    fn test_config(image_dir: &Path, scope: LedgerScope) -> Config {
        Config {
            db_path: String::new(),
            api_base_url: None,
            remote_timeout_secs: 30,
            ledger_scope: scope,
            report_recipient: "admin@example.com".into(),
            image_dir: image_dir.to_string_lossy().to_string(),
        }
    }

    async fn app_with(scope: LedgerScope) -> (App, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ScopedStore::open_in_memory().await.unwrap();
        let app = App::with_store(store, &test_config(dir.path(), scope)).unwrap();
        (app, dir)
    }

    async fn logged_in_app() -> (App, tempfile::TempDir) {
        let (app, dir) = app_with(LedgerScope::Global).await;
        app.login("user@example.com", true).await.unwrap();
        (app, dir)
    }

    fn score(value: f64) -> EvaluationResult {
        EvaluationResult::from_score(json!(value))
    }

    #[tokio::test]
    async fn evaluation_is_recorded_and_rewarded_once() {
        let (app, _dir) = logged_in_app().await;

        let first = app
            .complete_evaluation(CheckKind::Url, "https://a", score(0.4), None)
            .await
            .unwrap();
        assert!(first.inserted);
        assert_eq!(first.credit, CreditOutcome::Credited(CHECK_REWARD));
        assert_eq!(first.record.reliability_score, 40.0);

        let again = app
            .complete_evaluation(CheckKind::Url, "https://a", score(0.4), None)
            .await
            .unwrap();
        assert!(!again.inserted);
        assert_eq!(again.credit, CreditOutcome::NotAwarded);

        let summary = app.points_summary().await.unwrap();
        assert_eq!(summary.balance, CHECK_REWARD);
        assert_eq!(summary.earned_today, CHECK_REWARD);
        assert_eq!(summary.recent.len(), 1);
    }

    #[tokio::test]
    async fn without_login_nothing_is_recorded() {
        let (app, _dir) = app_with(LedgerScope::Identity).await;
        let outcome = app
            .complete_evaluation(CheckKind::Url, "https://a", score(90.0), None)
            .await
            .unwrap();
        assert!(!outcome.inserted);
        assert_eq!(app.points_summary().await.unwrap().balance, 0);
        assert!(app.view().await.unwrap().is_seed());
    }

    #[tokio::test]
    async fn daily_cap_applies_across_evaluations() {
        let (app, _dir) = logged_in_app().await;
        let mut last = CreditOutcome::NotAwarded;
        for i in 0..11 {
            last = app
                .complete_evaluation(CheckKind::Url, &format!("https://site/{i}"), score(80.0), None)
                .await
                .unwrap()
                .credit;
        }
        assert_eq!(last, CreditOutcome::DailyLimitReached);
        assert_eq!(app.points_summary().await.unwrap().balance, 50);
    }

    #[tokio::test]
    async fn unreliable_image_is_kept_for_reporting() {
        let (app, dir) = logged_in_app().await;
        let source = dir.path().join("picked.jpg");
        std::fs::write(&source, b"jpeg").unwrap();

        let outcome = app
            .complete_evaluation(CheckKind::Image, "content://media/7", score(30.0), Some(&source))
            .await
            .unwrap();
        let saved = outcome.record.saved_image_path.clone().unwrap();
        assert!(Path::new(&saved).exists());
        assert_eq!(outcome.credit, CreditOutcome::Credited(CHECK_REWARD));

        let reliable = app
            .complete_evaluation(CheckKind::Image, "content://media/8", score(95.0), Some(&source))
            .await
            .unwrap();
        assert!(reliable.record.saved_image_path.is_none());
    }

    #[tokio::test]
    async fn duplicate_image_check_drops_its_copy_only() {
        let (app, dir) = logged_in_app().await;
        let source = dir.path().join("picked.jpg");
        std::fs::write(&source, b"jpeg").unwrap();

        let first = app
            .complete_evaluation(CheckKind::Image, "content://media/7", score(30.0), Some(&source))
            .await
            .unwrap();
        let second = app
            .complete_evaluation(CheckKind::Image, "content://media/7", score(30.0), Some(&source))
            .await
            .unwrap();

        assert!(!second.inserted);
        let kept = first.record.saved_image_path.unwrap();
        let dropped = second.record.saved_image_path.unwrap();
        assert_ne!(kept, dropped);
        assert!(Path::new(&kept).exists());
        assert!(!Path::new(&dropped).exists());
    }

    #[tokio::test]
    async fn outcome_carries_the_stored_id_after_a_collision() {
        let (app, _dir) = logged_in_app().await;
        let me = app.identity().await.unwrap();
        let ahead = CheckRecord::new(
            CheckKind::Url,
            "https://earlier-device-clock",
            20.0,
            Local::now() + chrono::Duration::hours(1),
        );
        let ahead = app.history.insert(me.as_ref(), ahead).await.unwrap().unwrap();

        let outcome = app
            .complete_evaluation(CheckKind::Url, "https://b", score(20.0), None)
            .await
            .unwrap();
        assert!(outcome.record.id > ahead.id);

        let found = app
            .history
            .find(me.as_ref(), outcome.record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.subject_identifier, "https://b");

        let transport = RecordingTransport::default();
        let message = app
            .submit_report(outcome.record.id, "User", "Fabricated", &transport)
            .await
            .unwrap();
        assert!(message.body.contains("https://b"));
    }

    #[tokio::test]
    async fn report_lifecycle_through_the_app() {
        let (app, dir) = logged_in_app().await;
        let source = dir.path().join("picked.jpg");
        std::fs::write(&source, b"jpeg").unwrap();
        let outcome = app
            .complete_evaluation(CheckKind::Image, "content://media/7", score(20.0), Some(&source))
            .await
            .unwrap();
        let id = outcome.record.id;
        let saved = outcome.record.saved_image_path.clone().unwrap();

        assert_eq!(app.reportable().await.unwrap().len(), 1);

        let transport = RecordingTransport::default();
        let message = app.submit_report(id, "User", "Fabricated", &transport).await.unwrap();
        assert_eq!(message.recipient, "admin@example.com");
        assert_eq!(transport.sent.borrow().len(), 1);

        assert_eq!(app.defer_report(id).await.unwrap(), ReportState::Submitted);
        assert_eq!(app.pending_reports().await.unwrap().len(), 1);

        let receipt = app.confirm_report(id).await.unwrap();
        assert_eq!(receipt.points_awarded, 100);
        assert!(receipt.image_removed);
        assert!(!Path::new(&saved).exists());
        assert!(app.pending_reports().await.unwrap().is_empty());
        assert!(app.reportable().await.unwrap().is_empty());
        assert_eq!(app.points_summary().await.unwrap().balance, 105);

        let err = assert_err!(app.submit_report(id, "User", "again", &transport).await);
        assert!(matches!(err, AppError::AlreadyReported(_)));
        assert_eq!(transport.sent.borrow().len(), 1);
    }

    #[tokio::test]
    async fn unknown_records_and_vouchers_are_not_found() {
        let (app, _dir) = logged_in_app().await;
        let transport = RecordingTransport::default();
        let err = assert_err!(app.submit_report(42, "User", "r", &transport).await);
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(matches!(assert_err!(app.redeem(1234).await), AppError::NotFound(_)));
        assert!(matches!(
            assert_err!(app.redeem(1000).await),
            AppError::InsufficientPoints { balance: 0, cost: 1000 }
        ));
    }

    #[tokio::test]
    async fn clearing_history_returns_to_seed_view() {
        let (app, _dir) = logged_in_app().await;
        assert_ok!(
            app.complete_evaluation(CheckKind::Url, "https://a", score(50.0), None)
                .await
        );
        assert_eq!(app.stats().await.unwrap().total, 1);

        app.clear_history().await.unwrap();
        assert!(app.view().await.unwrap().is_seed());
        assert_eq!(app.points_summary().await.unwrap().balance, CHECK_REWARD);
    }

    #[tokio::test]
    async fn logout_hides_history() {
        let (app, _dir) = logged_in_app().await;
        app.complete_evaluation(CheckKind::Url, "https://a", score(50.0), None)
            .await
            .unwrap();
        app.logout().await.unwrap();
        assert!(app.identity().await.unwrap().is_none());
        assert!(app.reportable().await.unwrap().is_empty());
        assert_eq!(
            app.account.state().await.unwrap().remembered_email.as_deref(),
            Some("user@example.com")
        );
    }
}
