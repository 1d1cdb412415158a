use crate::{config::ProviderConfig, error::GatewayError, models::ProviderKind};
use reqwest::RequestBuilder;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

/// `{code, msg, data}` wrapper every provider answers with. `code` 200 means success.
#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    data: Option<T>,
}

/// Authenticated JSON transport for one provider. Never retries.
pub struct ProviderClient {
    kind: ProviderKind,
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ProviderClient {
    pub fn new(kind: ProviderKind, config: &ProviderConfig, http: reqwest::Client) -> Self {
        Self {
            kind,
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn api_key(&self) -> Result<&str, GatewayError> {
        self.api_key.as_deref().ok_or_else(|| {
            GatewayError::Configuration(format!(
                "{}_API_KEY is not configured",
                self.kind.env_prefix()
            ))
        })
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, GatewayError> {
        let key = self.api_key()?;
        let request = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(key)
            .json(body);
        self.send(request).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, GatewayError> {
        let key = self.api_key()?;
        let request = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(key)
            .query(query);
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::upstream(self.kind, None, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::upstream(self.kind, Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            tracing::warn!("{} answered HTTP {}", self.kind, status);
            return Err(GatewayError::upstream(self.kind, Some(status.as_u16()), body));
        }

        let parsed = serde_json::from_str::<Envelope<T>>(&body);
        match parsed {
            Ok(Envelope { code: 200, data: Some(data) }) => Ok(data),
            Ok(envelope) => {
                tracing::warn!("{} returned envelope code {}", self.kind, envelope.code);
                Err(GatewayError::upstream(self.kind, Some(status.as_u16()), body))
            }
            Err(e) => {
                tracing::warn!("{} returned malformed body: {}", self.kind, e);
                Err(GatewayError::upstream(self.kind, Some(status.as_u16()), body))
            }
        }
    }
}

/// `taskId` carried by every create response.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTask {
    pub task_id: String,
}

pub fn opt_str<'a>(options: &'a Value, key: &str) -> Option<&'a str> {
    options.get(key).and_then(Value::as_str)
}

pub fn opt_or<'a>(options: &'a Value, key: &str, default: &'a str) -> &'a str {
    opt_str(options, key).unwrap_or(default)
}
