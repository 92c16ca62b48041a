mod check;
mod identity;
mod points;

pub use check::{
    normalize_score, parse_checked_at, CheckKind, CheckRecord, CHECKED_AT_FORMAT,
    RELIABLE_THRESHOLD,
};
pub use identity::{Collection, Identity, LedgerScope, ScopeKey};
pub use points::{PointCategory, PointTransaction, Voucher, VOUCHERS};
