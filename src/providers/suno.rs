use super::http::{opt_or, opt_str, CreatedTask, ProviderClient};
use super::{ProviderAdapter, RawProviderStatus};
use crate::{
    error::GatewayError,
    models::{CanonicalState, NormalizedStatus, ProviderKind},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct SunoAdapter {
    client: ProviderClient,
}

impl SunoAdapter {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SunoRecord {
    pub task_id: String,
    pub status: String,
    #[serde(default)]
    pub response: Option<SunoResponse>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SunoResponse {
    #[serde(default)]
    pub suno_data: Vec<SunoTrack>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SunoTrack {
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl SunoRecord {
    fn audio_urls(&self) -> Vec<String> {
        self.response
            .iter()
            .flat_map(|r| r.suno_data.iter())
            .filter_map(|track| track.audio_url.clone())
            .filter(|url| !url.is_empty())
            .collect()
    }

    pub fn normalize(&self) -> NormalizedStatus {
        match self.status.as_str() {
            "PENDING" => NormalizedStatus::in_flight(CanonicalState::Pending),
            "TEXT_SUCCESS" | "FIRST_SUCCESS" => NormalizedStatus::in_flight(CanonicalState::Processing),
            "SUCCESS" => NormalizedStatus::from_results(self.audio_urls()),
            failed if failed.ends_with("_FAILED")
                || failed.ends_with("_ERROR")
                || failed == "CALLBACK_EXCEPTION" =>
            {
                NormalizedStatus::failed(
                    self.error_message.clone().unwrap_or_else(|| failed.to_string()),
                )
            }
            _ => NormalizedStatus::in_flight(CanonicalState::Processing)
                .with_error(self.error_message.clone()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for SunoAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Suno
    }

    async fn create_task(&self, prompt: &str, options: &Value) -> Result<String, GatewayError> {
        let mut body = json!({
            "prompt": prompt,
            "customMode": options.get("customMode").and_then(Value::as_bool).unwrap_or(false),
            "instrumental": options.get("instrumental").and_then(Value::as_bool).unwrap_or(false),
            "model": opt_or(options, "model", "V4"),
        });
        if let Some(callback) = opt_str(options, "callBackUrl") {
            body["callBackUrl"] = Value::from(callback);
        }

        let created: CreatedTask = self.client.post("/api/v1/generate", &body).await?;
        Ok(created.task_id)
    }

    async fn query_task(&self, external_task_id: &str) -> Result<RawProviderStatus, GatewayError> {
        let record: SunoRecord = self
            .client
            .get("/api/v1/generate/record-info", &[("taskId", external_task_id)])
            .await?;
        Ok(RawProviderStatus::Suno(record))
    }
}
