use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{normalize_score, CheckKind, CheckRecord};

/// Envelope every evaluation endpoint wraps its payload in.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

/// Result of a remote reliability evaluation. The score arrives in whatever
/// shape the server felt like; [`EvaluationResult::score`] is the one place
/// it gets normalized.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationResult {
    pub reliability_score: Value,
    #[serde(default)]
    pub reliability_level: Option<String>,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub evidence: Option<Vec<Value>>,
    #[serde(default)]
    pub elapsed_seconds: Option<f64>,
}

impl EvaluationResult {
    pub fn from_score(score: Value) -> Self {
        Self {
            reliability_score: score,
            reliability_level: None,
            recommendation: None,
            evidence: None,
            elapsed_seconds: None,
        }
    }

    /// Parses a full `{ success, message, data }` response body.
    pub fn from_response_body(body: &str) -> Result<Self> {
        let response: ApiResponse<EvaluationResult> = serde_json::from_str(body)?;
        match response.data {
            Some(result) if response.success => Ok(result),
            _ => Err(AppError::RemoteApi(format!(
                "Evaluation failed: {}",
                if response.message.is_empty() {
                    "no result returned"
                } else {
                    &response.message
                }
            ))),
        }
    }

    /// Score as a 0-100 percentage.
    pub fn score(&self) -> f64 {
        normalize_score(&self.reliability_score)
    }

    /// Evidence list re-serialized for storage, untouched otherwise.
    pub fn evidence_blob(&self) -> Option<String> {
        self.evidence
            .as_ref()
            .and_then(|list| serde_json::to_string(list).ok())
    }

    pub fn into_record(
        self,
        kind: CheckKind,
        subject_identifier: impl Into<String>,
        saved_image_path: Option<String>,
        now: DateTime<Local>,
    ) -> CheckRecord {
        let evidence = self.evidence_blob();
        CheckRecord::new(kind, subject_identifier, self.score(), now)
            .with_saved_image_path(saved_image_path)
            .with_evidence(evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 5, 4, 11, 0, 0).unwrap()
    }

    #[test]
    fn parses_successful_response() {
        let body = r#"{
            "success": true,
            "message": "ok",
            "data": {
                "reliability_score": 0.35,
                "reliability_level": "low",
                "recommendation": "Be careful",
                "evidence": [{"number": 1, "url": "https://src", "similarity": 0.8}]
            }
        }"#;

        let result = EvaluationResult::from_response_body(body).unwrap();
        assert_eq!(result.score(), 35.0);

        let record = result.into_record(
            CheckKind::Image,
            "content://media/9",
            Some("/files/report_image_9.jpg".into()),
            now(),
        );
        assert!(!record.is_reliable);
        assert_eq!(record.saved_image_path.as_deref(), Some("/files/report_image_9.jpg"));
        let evidence: Value = serde_json::from_str(record.evidence.as_deref().unwrap()).unwrap();
        assert_eq!(evidence[0]["url"], "https://src");
    }

    #[test]
    fn failed_response_is_an_error() {
        let body = r#"{"success": false, "message": "model offline", "data": null}"#;
        let err = EvaluationResult::from_response_body(body).unwrap_err();
        assert!(matches!(err, AppError::RemoteApi(msg) if msg.contains("model offline")));
    }

    #[test]
    fn string_scores_are_normalized() {
        let result = EvaluationResult::from_score(Value::String("82".into()));
        let record = result.into_record(CheckKind::Url, "https://x", None, now());
        assert_eq!(record.reliability_score, 82.0);
        assert!(record.is_reliable);
        assert!(record.evidence.is_none());
    }
}
