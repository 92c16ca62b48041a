mod account;
mod history;
mod points;
mod reports;

pub use account::{AccountBook, AccountState};
pub use history::{
    dedup_by_subject, sort_newest_first, CheckRecordLedger, DUPLICATE_WINDOW_SECS, HISTORY_LIMIT,
};
pub use points::{
    balance_of, clamp_to_daily_cap, daily_earned_in, CreditOutcome, PointLedger, CHECK_REWARD,
    DAILY_CHECK_CAP, RECENT_HISTORY_LIMIT, REPORT_REWARD,
};
pub use reports::{candidate_identifiers, ReportStateTracker};
