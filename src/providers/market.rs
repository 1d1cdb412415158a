use super::http::{opt_or, CreatedTask, ProviderClient};
use super::{ProviderAdapter, RawProviderStatus};
use crate::{
    error::GatewayError,
    models::{CanonicalState, NormalizedStatus, ProviderKind},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Generic jobs endpoint hosting third-party image models.
pub struct MarketAdapter {
    client: ProviderClient,
}

impl MarketAdapter {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarketRecord {
    pub task_id: String,
    pub state: String,
    /// JSON document encoded as a string, e.g. `{"resultUrls":["..."]}`.
    #[serde(default)]
    pub result_json: Option<String>,
    #[serde(default)]
    pub fail_msg: Option<String>,
    #[serde(default)]
    pub fail_code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketResult {
    #[serde(default)]
    result_urls: Vec<String>,
}

impl MarketRecord {
    pub fn normalize(&self) -> NormalizedStatus {
        match self.state.as_str() {
            "waiting" | "queuing" | "generating" => {
                NormalizedStatus::in_flight(CanonicalState::Processing)
                    .with_error(self.fail_msg.clone())
            }
            "success" => {
                let raw = self.result_json.as_deref().unwrap_or("{}");
                match serde_json::from_str::<MarketResult>(raw) {
                    Ok(result) => NormalizedStatus::from_results(result.result_urls),
                    Err(e) => NormalizedStatus::failed(format!("unreadable resultJson: {}", e)),
                }
            }
            "fail" => {
                let message = self.fail_msg.clone().unwrap_or_else(|| "job failed".into());
                match &self.fail_code {
                    Some(code) => NormalizedStatus::failed(format!("{} ({})", message, code)),
                    None => NormalizedStatus::failed(message),
                }
            }
            _ => NormalizedStatus::in_flight(CanonicalState::Processing),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MarketAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Market
    }

    async fn create_task(&self, prompt: &str, options: &Value) -> Result<String, GatewayError> {
        let mut input: Map<String, Value> = options
            .as_object()
            .map(|o| o.iter().filter(|(k, _)| *k != "model").map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        input.insert("prompt".to_string(), Value::from(prompt));

        let body = json!({
            "model": opt_or(options, "model", "google/nano-banana"),
            "input": input,
        });

        let created: CreatedTask = self.client.post("/api/v1/jobs/createTask", &body).await?;
        Ok(created.task_id)
    }

    async fn query_task(&self, external_task_id: &str) -> Result<RawProviderStatus, GatewayError> {
        let record: MarketRecord = self
            .client
            .get("/api/v1/jobs/recordInfo", &[("taskId", external_task_id)])
            .await?;
        Ok(RawProviderStatus::Market(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(state: &str, result_json: Option<&str>, fail_msg: Option<&str>) -> MarketRecord {
        MarketRecord {
            task_id: "t".into(),
            state: state.into(),
            result_json: result_json.map(Into::into),
            fail_msg: fail_msg.map(Into::into),
            fail_code: None,
        }
    }

    #[test]
    fn named_state_vocabulary() {
        for state in ["waiting", "queuing", "generating"] {
            assert_eq!(record(state, None, None).normalize().state, CanonicalState::Processing);
        }
        let done = record("success", Some(r#"{"resultUrls":["https://p/a.png","https://p/b.png"]}"#), None);
        assert_eq!(done.normalize().result_urls.len(), 2);
    }

    #[test]
    fn policy_failure_keeps_message() {
        let failed = record("fail", None, Some("policy violation")).normalize();
        assert_eq!(failed, NormalizedStatus::failed("policy violation"));
    }

    #[test]
    fn garbled_result_json_fails() {
        let status = record("success", Some("not json"), None).normalize();
        assert_eq!(status.state, CanonicalState::Failed);
    }
}
