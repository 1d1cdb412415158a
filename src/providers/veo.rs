use super::http::{opt_or, CreatedTask, ProviderClient};
use super::{ProviderAdapter, RawProviderStatus};
use crate::{
    error::GatewayError,
    models::{CanonicalState, NormalizedStatus, ProviderKind},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct VeoAdapter {
    client: ProviderClient,
}

impl VeoAdapter {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VeoRecord {
    pub task_id: String,
    pub success_flag: i32,
    #[serde(default)]
    pub response: Option<VeoResponse>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VeoResponse {
    #[serde(default)]
    pub result_urls: Vec<String>,
}

impl VeoRecord {
    pub fn normalize(&self) -> NormalizedStatus {
        match self.success_flag {
            1 => NormalizedStatus::from_results(
                self.response.iter().flat_map(|r| r.result_urls.clone()).collect(),
            ),
            2 | 3 => NormalizedStatus::failed(
                self.error_message.clone().unwrap_or_else(|| "video generation failed".into()),
            ),
            _ => NormalizedStatus::in_flight(CanonicalState::Processing)
                .with_error(self.error_message.clone()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for VeoAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Veo
    }

    async fn create_task(&self, prompt: &str, options: &Value) -> Result<String, GatewayError> {
        let mut body = json!({
            "prompt": prompt,
            "model": opt_or(options, "model", "veo3_fast"),
            "aspectRatio": opt_or(options, "aspectRatio", "16:9"),
        });
        if let Some(images) = options.get("imageUrls") {
            body["imageUrls"] = images.clone();
        }

        let created: CreatedTask = self.client.post("/api/v1/veo/generate", &body).await?;
        Ok(created.task_id)
    }

    async fn query_task(&self, external_task_id: &str) -> Result<RawProviderStatus, GatewayError> {
        let record: VeoRecord = self
            .client
            .get("/api/v1/veo/record-info", &[("taskId", external_task_id)])
            .await?;
        Ok(RawProviderStatus::Veo(record))
    }
}
