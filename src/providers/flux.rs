use super::http::{opt_or, CreatedTask, ProviderClient};
use super::{ProviderAdapter, RawProviderStatus};
use crate::{
    error::GatewayError,
    models::{CanonicalState, NormalizedStatus, ProviderKind},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct FluxKontextAdapter {
    client: ProviderClient,
}

impl FluxKontextAdapter {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FluxRecord {
    pub task_id: String,
    pub success_flag: i32,
    #[serde(default)]
    pub response: Option<FluxResponse>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FluxResponse {
    #[serde(default)]
    pub result_image_url: Option<String>,
}

impl FluxRecord {
    pub fn normalize(&self) -> NormalizedStatus {
        match self.success_flag {
            0 => NormalizedStatus::in_flight(CanonicalState::Processing)
                .with_error(self.error_message.clone()),
            1 => NormalizedStatus::from_results(
                self.response
                    .as_ref()
                    .and_then(|r| r.result_image_url.clone())
                    .into_iter()
                    .collect(),
            ),
            2 | 3 => NormalizedStatus::failed(
                self.error_message.clone().unwrap_or_else(|| "flux generation failed".into()),
            ),
            _ => NormalizedStatus::in_flight(CanonicalState::Processing),
        }
    }
}

#[async_trait]
impl ProviderAdapter for FluxKontextAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::FluxKontext
    }

    async fn create_task(&self, prompt: &str, options: &Value) -> Result<String, GatewayError> {
        let mut body = json!({
            "prompt": prompt,
            "aspectRatio": opt_or(options, "aspectRatio", "1:1"),
            "model": opt_or(options, "model", "flux-kontext-pro"),
            "outputFormat": opt_or(options, "outputFormat", "png"),
        });
        if let Some(image) = options.get("inputImage") {
            body["inputImage"] = image.clone();
        }

        let created: CreatedTask = self.client.post("/api/v1/flux/kontext/generate", &body).await?;
        Ok(created.task_id)
    }

    async fn query_task(&self, external_task_id: &str) -> Result<RawProviderStatus, GatewayError> {
        let record: FluxRecord = self
            .client
            .get("/api/v1/flux/kontext/record-info", &[("taskId", external_task_id)])
            .await?;
        Ok(RawProviderStatus::FluxKontext(record))
    }
}
