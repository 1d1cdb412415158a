use super::http::{opt_or, CreatedTask, ProviderClient};
use super::{ProviderAdapter, RawProviderStatus};
use crate::{
    error::GatewayError,
    models::{CanonicalState, NormalizedStatus, ProviderKind},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct MidjourneyAdapter {
    client: ProviderClient,
}

impl MidjourneyAdapter {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MidjourneyRecord {
    pub task_id: String,
    pub success_flag: i32,
    #[serde(default)]
    pub result_info_json: Option<MidjourneyResult>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MidjourneyResult {
    #[serde(default)]
    pub result_urls: Vec<MidjourneyImage>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MidjourneyImage {
    pub result_url: String,
}

impl MidjourneyRecord {
    pub fn normalize(&self) -> NormalizedStatus {
        match self.success_flag {
            1 => NormalizedStatus::from_results(
                self.result_info_json
                    .iter()
                    .flat_map(|info| info.result_urls.iter().map(|img| img.result_url.clone()))
                    .collect(),
            ),
            2 | 3 => NormalizedStatus::failed(
                self.error_message.clone().unwrap_or_else(|| "midjourney job failed".into()),
            ),
            _ => NormalizedStatus::in_flight(CanonicalState::Processing)
                .with_error(self.error_message.clone()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MidjourneyAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Midjourney
    }

    async fn create_task(&self, prompt: &str, options: &Value) -> Result<String, GatewayError> {
        let mut body = json!({
            "taskType": opt_or(options, "taskType", "mj_txt2img"),
            "prompt": prompt,
            "speed": opt_or(options, "speed", "fast"),
            "aspectRatio": opt_or(options, "aspectRatio", "1:1"),
            "version": opt_or(options, "version", "7"),
        });
        if let Some(files) = options.get("fileUrls") {
            body["fileUrls"] = files.clone();
        }

        let created: CreatedTask = self.client.post("/api/v1/mj/generate", &body).await?;
        Ok(created.task_id)
    }

    async fn query_task(&self, external_task_id: &str) -> Result<RawProviderStatus, GatewayError> {
        let record: MidjourneyRecord = self
            .client
            .get("/api/v1/mj/record-info", &[("taskId", external_task_id)])
            .await?;
        Ok(RawProviderStatus::Midjourney(record))
    }
}
