use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{normalize_score, parse_checked_at, CheckKind, CheckRecord, Identity};

/// Source of previously stored history for an identity, consulted only when
/// the device has none of its own.
pub trait RemoteHistory {
    fn fetch_history(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Vec<CheckRecord>>> + Send;
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    success: bool,
    #[serde(default)]
    history: Vec<RemoteCheck>,
    #[allow(dead_code)]
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteCheck {
    id: i64,
    #[serde(default)]
    url: Option<String>,
    reliability_score: Value,
    checked_at: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    saved_image_path: Option<String>,
    #[serde(default)]
    evidence: Option<String>,
}

impl RemoteCheck {
    fn into_record(self) -> Option<CheckRecord> {
        let Some(checked_at) = parse_checked_at(&self.checked_at) else {
            tracing::warn!("Dropping remote record {} with bad date {:?}", self.id, self.checked_at);
            return None;
        };

        let reliability_score = normalize_score(&self.reliability_score);
        let kind = CheckKind::parse(&self.kind).unwrap_or(CheckKind::Other);
        let mut record = CheckRecord {
            id: self.id,
            kind,
            subject_identifier: self.url.unwrap_or_default(),
            reliability_score,
            is_reliable: reliability_score >= crate::models::RELIABLE_THRESHOLD,
            checked_at,
            saved_image_path: None,
            evidence: self.evidence,
        };
        record = record.with_saved_image_path(self.saved_image_path);
        Some(record)
    }
}

#[derive(Debug)]
pub struct HistoryApiClient {
    client: Client,
    base_url: Url,
}

impl HistoryApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("Invalid api_base_url {base_url}: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("veriscope-ledger/1.0")
            .build()?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Config(format!("Invalid endpoint {path}: {e}")))
    }

    pub async fn get_user_history(&self, identity: &Identity) -> Result<Vec<CheckRecord>> {
        let response = self
            .client
            .get(self.endpoint("user/history")?)
            .query(&[("user_id", identity.as_str())])
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::RemoteApi(format!(
                "History request failed: HTTP {}",
                response.status()
            )));
        }

        let body: HistoryResponse = response.json().await?;
        if !body.success {
            return Err(AppError::RemoteApi("History request was not successful".to_string()));
        }

        let records: Vec<CheckRecord> = body
            .history
            .into_iter()
            .filter_map(RemoteCheck::into_record)
            .collect();
        tracing::debug!("Fetched {} remote history records", records.len());
        Ok(records)
    }
}

impl RemoteHistory for HistoryApiClient {
    fn fetch_history(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Vec<CheckRecord>>> + Send {
        self.get_user_history(identity)
    }
}
