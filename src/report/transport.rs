use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::CheckKind;

use super::ReportDraft;

pub const DEFAULT_REPORT_RECIPIENT: &str = "smartit.ngms@gmail.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl ReportMessage {
    pub fn compose(draft: &ReportDraft, recipient: &str) -> Self {
        let record = &draft.record;
        let kind = match record.kind {
            CheckKind::Url => "URL",
            CheckKind::Image => "IMAGE",
            CheckKind::Other => "GENERAL",
        };

        let mut body = String::new();
        body.push_str("Veriscope misinformation report\n\n");
        body.push_str(&format!("Reporter: {}\n", draft.reporter_name));
        body.push_str(&format!("Reporter email: {}\n", draft.reporter_email));
        body.push_str(&format!("Type: {}\n", kind));
        if !record.subject_identifier.is_empty() {
            body.push_str(&format!("Content: {}\n", record.subject_identifier));
        }
        if let Some(path) = &record.saved_image_path {
            body.push_str(&format!("Attached image: {}\n", path));
        }
        body.push_str(&format!(
            "Reliability score: {:.1}%\n",
            record.reliability_score
        ));
        body.push_str(&format!(
            "Checked at: {}\n",
            record.checked_at.format(crate::models::CHECKED_AT_FORMAT)
        ));
        body.push_str(&format!("\nReason:\n{}\n", draft.reason));

        Self {
            recipient: recipient.to_string(),
            subject: format!("[{}] Veriscope misinformation report", kind),
            body,
        }
    }

    pub fn mailto_url(&self) -> String {
        format!(
            "mailto:{}?subject={}&body={}",
            self.recipient,
            urlencoding::encode(&self.subject),
            urlencoding::encode(&self.body)
        )
    }
}

/// Hands a composed report to whatever actually delivers it. Returning `Ok`
/// means the hand-off happened, not that the report was sent.
pub trait ReportTransport {
    fn hand_off(&self, message: &ReportMessage) -> Result<()>;
}

/// Opens the report in the desktop mail client.
pub struct MailtoTransport;

impl ReportTransport for MailtoTransport {
    fn hand_off(&self, message: &ReportMessage) -> Result<()> {
        let url = message.mailto_url();
        open::that(&url).map_err(|e| AppError::Other(anyhow::anyhow!("Failed to open mail client: {}", e)))?;
        tracing::info!("Opened report email to {}", message.recipient);
        Ok(())
    }
}
