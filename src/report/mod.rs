mod flow;
mod pending;
mod transport;

pub(crate) use flow::remove_report_image;
pub use flow::{ReportDraft, ReportFlow, ReportReceipt, ReportState};
pub use pending::PendingReports;
pub use transport::{MailtoTransport, ReportMessage, ReportTransport, DEFAULT_REPORT_RECIPIENT};
