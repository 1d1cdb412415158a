use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shared lifecycle every provider's native status is normalized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CanonicalState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CanonicalState::Completed | CanonicalState::Failed)
    }

    /// Clients only ever see `processing`, `completed` or `failed`.
    pub fn client_visible(self) -> Self {
        match self {
            CanonicalState::Pending => CanonicalState::Processing,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Gpt4oImage,
    FluxKontext,
    Midjourney,
    Veo,
    Runway,
    Suno,
    Market,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 7] = [
        ProviderKind::Gpt4oImage,
        ProviderKind::FluxKontext,
        ProviderKind::Midjourney,
        ProviderKind::Veo,
        ProviderKind::Runway,
        ProviderKind::Suno,
        ProviderKind::Market,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Gpt4oImage => "gpt4o_image",
            ProviderKind::FluxKontext => "flux_kontext",
            ProviderKind::Midjourney => "midjourney",
            ProviderKind::Veo => "veo",
            ProviderKind::Runway => "runway",
            ProviderKind::Suno => "suno",
            ProviderKind::Market => "market",
        }
    }

    /// Prefix for the provider's `_API_KEY` / `_BASE_URL` environment variables.
    pub fn env_prefix(self) -> String {
        self.as_str().to_uppercase()
    }

    pub fn media(self) -> MediaKind {
        match self {
            ProviderKind::Gpt4oImage
            | ProviderKind::FluxKontext
            | ProviderKind::Midjourney
            | ProviderKind::Market => MediaKind::Image,
            ProviderKind::Veo | ProviderKind::Runway => MediaKind::Video,
            ProviderKind::Suno => MediaKind::Audio,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSpec {
    pub id: &'static str,
    pub provider: ProviderKind,
    pub price_usd: f64,
}

impl ModelSpec {
    pub fn media(&self) -> MediaKind {
        self.provider.media()
    }
}

const CATALOG: &[ModelSpec] = &[
    ModelSpec { id: "gpt-4o-image", provider: ProviderKind::Gpt4oImage, price_usd: 0.03 },
    ModelSpec { id: "flux-kontext-pro", provider: ProviderKind::FluxKontext, price_usd: 0.04 },
    ModelSpec { id: "midjourney", provider: ProviderKind::Midjourney, price_usd: 0.05 },
    ModelSpec { id: "veo3-fast", provider: ProviderKind::Veo, price_usd: 0.40 },
    ModelSpec { id: "runway-gen3", provider: ProviderKind::Runway, price_usd: 0.20 },
    ModelSpec { id: "suno-v4", provider: ProviderKind::Suno, price_usd: 0.10 },
    ModelSpec { id: "nano-banana", provider: ProviderKind::Market, price_usd: 0.03 },
];

pub struct ModelCatalog;

impl ModelCatalog {
    pub fn lookup(model: &str) -> Option<&'static ModelSpec> {
        CATALOG.iter().find(|spec| spec.id.eq_ignore_ascii_case(model.trim()))
    }

    pub fn all() -> &'static [ModelSpec] {
        CATALOG
    }
}

/// A dispatched generation. Only the terminal annotation changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationTask {
    pub id: String,
    pub provider: ProviderKind,
    pub external_task_id: String,
    pub model: String,
    pub prompt: String,
    pub options: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_state: Option<CanonicalState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_at: Option<DateTime<Utc>>,
}

/// Provider status after normalization, with re-hosted media where applicable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedStatus {
    pub state: CanonicalState,
    pub result_urls: Vec<String>,
    pub error: Option<String>,
}

impl NormalizedStatus {
    pub fn in_flight(state: CanonicalState) -> Self {
        Self { state, result_urls: Vec::new(), error: None }
    }

    pub fn completed(result_urls: Vec<String>) -> Self {
        Self { state: CanonicalState::Completed, result_urls, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { state: CanonicalState::Failed, result_urls: Vec::new(), error: Some(error.into()) }
    }

    /// A success report with nothing to show for it counts as a failure.
    pub fn from_results(result_urls: Vec<String>) -> Self {
        if result_urls.is_empty() {
            Self::failed("provider reported success without results")
        } else {
            Self::completed(result_urls)
        }
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        if self.error.is_none() {
            self.error = error.filter(|e| !e.trim().is_empty());
        }
        self
    }
}

const CONTENT_POLICY_MARKERS: &[&str] = &[
    "content policy",
    "policy violation",
    "violates",
    "sensitive",
    "nsfw",
    "safety",
    "flagged",
];

/// Whether an error message reads as a content-policy rejection.
pub fn is_content_policy_error(message: &str) -> bool {
    let message = message.to_lowercase();
    CONTENT_POLICY_MARKERS.iter().any(|marker| message.contains(marker))
}
