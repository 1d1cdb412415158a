//! One adapter per generation backend. Adapters translate `create_task` /
//! `query_task` into the provider's wire format and hand back the provider's
//! own status record; interpretation happens in the normalizer.

pub mod http;
pub mod flux;
pub mod gpt4o;
pub mod market;
pub mod midjourney;
pub mod runway;
pub mod suno;
pub mod veo;

pub use flux::{FluxKontextAdapter, FluxRecord};
pub use gpt4o::{Gpt4oImageAdapter, Gpt4oRecord};
pub use http::ProviderClient;
pub use market::{MarketAdapter, MarketRecord};
pub use midjourney::{MidjourneyAdapter, MidjourneyRecord};
pub use runway::{RunwayAdapter, RunwayRecord};
pub use suno::{SunoAdapter, SunoRecord};
pub use veo::{VeoAdapter, VeoRecord};

use crate::{
    config::ProviderConfig,
    error::GatewayError,
    models::{NormalizedStatus, ProviderKind},
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn create_task(&self, prompt: &str, options: &Value) -> Result<String, GatewayError>;

    async fn query_task(&self, external_task_id: &str) -> Result<RawProviderStatus, GatewayError>;
}

/// A provider's status record, still in that provider's vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum RawProviderStatus {
    Gpt4oImage(Gpt4oRecord),
    FluxKontext(FluxRecord),
    Midjourney(MidjourneyRecord),
    Veo(VeoRecord),
    Runway(RunwayRecord),
    Suno(SunoRecord),
    Market(MarketRecord),
}

impl RawProviderStatus {
    pub fn provider(&self) -> ProviderKind {
        match self {
            RawProviderStatus::Gpt4oImage(_) => ProviderKind::Gpt4oImage,
            RawProviderStatus::FluxKontext(_) => ProviderKind::FluxKontext,
            RawProviderStatus::Midjourney(_) => ProviderKind::Midjourney,
            RawProviderStatus::Veo(_) => ProviderKind::Veo,
            RawProviderStatus::Runway(_) => ProviderKind::Runway,
            RawProviderStatus::Suno(_) => ProviderKind::Suno,
            RawProviderStatus::Market(_) => ProviderKind::Market,
        }
    }

    /// Maps the provider vocabulary onto the canonical states.
    pub fn normalize(&self) -> NormalizedStatus {
        match self {
            RawProviderStatus::Gpt4oImage(record) => record.normalize(),
            RawProviderStatus::FluxKontext(record) => record.normalize(),
            RawProviderStatus::Midjourney(record) => record.normalize(),
            RawProviderStatus::Veo(record) => record.normalize(),
            RawProviderStatus::Runway(record) => record.normalize(),
            RawProviderStatus::Suno(record) => record.normalize(),
            RawProviderStatus::Market(record) => record.normalize(),
        }
    }
}

pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn from_config(
        providers: &HashMap<ProviderKind, ProviderConfig>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let fallback = ProviderConfig {
            base_url: "https://api.kie.ai".to_string(),
            api_key: None,
        };

        let adapters = ProviderKind::ALL
            .into_iter()
            .map(|kind| {
                let config = providers.get(&kind).unwrap_or(&fallback);
                let client = ProviderClient::new(kind, config, http.clone());
                let adapter: Arc<dyn ProviderAdapter> = match kind {
                    ProviderKind::Gpt4oImage => Arc::new(Gpt4oImageAdapter::new(client)),
                    ProviderKind::FluxKontext => Arc::new(FluxKontextAdapter::new(client)),
                    ProviderKind::Midjourney => Arc::new(MidjourneyAdapter::new(client)),
                    ProviderKind::Veo => Arc::new(VeoAdapter::new(client)),
                    ProviderKind::Runway => Arc::new(RunwayAdapter::new(client)),
                    ProviderKind::Suno => Arc::new(SunoAdapter::new(client)),
                    ProviderKind::Market => Arc::new(MarketAdapter::new(client)),
                };
                adapter
            })
            .collect();

        Ok(Self::with_adapters(adapters))
    }

    pub fn with_adapters(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        Self {
            adapters: adapters.into_iter().map(|a| (a.kind(), a)).collect(),
        }
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn ProviderAdapter>, GatewayError> {
        self.adapters
            .get(&kind)
            .cloned()
            .ok_or_else(|| GatewayError::Configuration(format!("no adapter registered for {}", kind)))
    }
}
