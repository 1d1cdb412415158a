use super::http::{opt_or, CreatedTask, ProviderClient};
use super::{ProviderAdapter, RawProviderStatus};
use crate::{
    error::GatewayError,
    models::{CanonicalState, NormalizedStatus, ProviderKind},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct Gpt4oImageAdapter {
    client: ProviderClient,
}

impl Gpt4oImageAdapter {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Gpt4oRecord {
    pub task_id: String,
    pub success_flag: i32,
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default)]
    pub response: Option<Gpt4oResponse>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Gpt4oResponse {
    #[serde(default)]
    pub result_urls: Vec<String>,
}

impl Gpt4oRecord {
    pub fn normalize(&self) -> NormalizedStatus {
        match self.success_flag {
            1 => NormalizedStatus::from_results(
                self.response.clone().unwrap_or_default().result_urls,
            ),
            2 | 3 => NormalizedStatus::failed(
                self.error_message.clone().unwrap_or_else(|| "image generation failed".into()),
            ),
            _ => NormalizedStatus::in_flight(CanonicalState::Processing)
                .with_error(self.error_message.clone()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for Gpt4oImageAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gpt4oImage
    }

    async fn create_task(&self, prompt: &str, options: &Value) -> Result<String, GatewayError> {
        let mut body = json!({
            "prompt": prompt,
            "size": opt_or(options, "size", "1:1"),
            "nVariants": options.get("nVariants").and_then(Value::as_u64).unwrap_or(1),
        });
        if let Some(files) = options.get("filesUrl") {
            body["filesUrl"] = files.clone();
        }

        let created: CreatedTask = self.client.post("/api/v1/gpt4o-image/generate", &body).await?;
        Ok(created.task_id)
    }

    async fn query_task(&self, external_task_id: &str) -> Result<RawProviderStatus, GatewayError> {
        let record: Gpt4oRecord = self
            .client
            .get("/api/v1/gpt4o-image/record-info", &[("taskId", external_task_id)])
            .await?;
        Ok(RawProviderStatus::Gpt4oImage(record))
    }
}
