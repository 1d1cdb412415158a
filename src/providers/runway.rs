use super::http::{opt_or, CreatedTask, ProviderClient};
use super::{ProviderAdapter, RawProviderStatus};
use crate::{
    error::GatewayError,
    models::{CanonicalState, NormalizedStatus, ProviderKind},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct RunwayAdapter {
    client: ProviderClient,
}

impl RunwayAdapter {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunwayRecord {
    pub task_id: String,
    pub state: String,
    #[serde(default)]
    pub video_info: Option<RunwayVideo>,
    #[serde(default)]
    pub fail_msg: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunwayVideo {
    #[serde(default)]
    pub video_url: Option<String>,
}

impl RunwayRecord {
    pub fn normalize(&self) -> NormalizedStatus {
        match self.state.as_str() {
            "wait" | "queueing" | "generating" => {
                NormalizedStatus::in_flight(CanonicalState::Processing)
                    .with_error(self.fail_msg.clone())
            }
            "success" => NormalizedStatus::from_results(
                self.video_info
                    .as_ref()
                    .and_then(|v| v.video_url.clone())
                    .into_iter()
                    .collect(),
            ),
            "fail" => NormalizedStatus::failed(
                self.fail_msg.clone().unwrap_or_else(|| "runway generation failed".into()),
            ),
            other => {
                tracing::debug!("Unrecognised runway state {:?}", other);
                NormalizedStatus::in_flight(CanonicalState::Processing)
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for RunwayAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Runway
    }

    async fn create_task(&self, prompt: &str, options: &Value) -> Result<String, GatewayError> {
        let mut body = json!({
            "prompt": prompt,
            "duration": options.get("duration").and_then(Value::as_u64).unwrap_or(5),
            "quality": opt_or(options, "quality", "720p"),
            "aspectRatio": opt_or(options, "aspectRatio", "16:9"),
        });
        if let Some(image) = options.get("imageUrl") {
            body["imageUrl"] = image.clone();
        }

        let created: CreatedTask = self.client.post("/api/v1/runway/generate", &body).await?;
        Ok(created.task_id)
    }

    async fn query_task(&self, external_task_id: &str) -> Result<RawProviderStatus, GatewayError> {
        let record: RunwayRecord = self
            .client
            .get("/api/v1/runway/record-detail", &[("taskId", external_task_id)])
            .await?;
        Ok(RawProviderStatus::Runway(record))
    }
}
