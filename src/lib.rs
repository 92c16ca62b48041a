//! Offline-first bookkeeping for the Veriscope client: per-user check history,
//! a capped point ledger, reported-content tracking and the read-time
//! reconciliation between local, remote and sample history.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod reconcile;
pub mod report;
pub mod services;

pub use app::{App, EvaluationOutcome, PointSummary};
pub use config::Config;
pub use error::{AppError, Result};
pub use reconcile::{HistoryStats, ReconciliationPolicy, View, ViewSource};
