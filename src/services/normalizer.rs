use crate::{
    models::{is_content_policy_error, CanonicalState, MediaKind, NormalizedStatus},
    providers::RawProviderStatus,
    services::MediaRehoster,
};
use std::sync::Arc;

/// Turns a provider's raw record into the canonical status, re-hosting finished images.
pub struct TaskNormalizer {
    rehoster: Arc<MediaRehoster>,
}

impl TaskNormalizer {
    pub fn new(rehoster: Arc<MediaRehoster>) -> Self {
        Self { rehoster }
    }

    pub async fn resolve(&self, raw: &RawProviderStatus, external_task_id: &str) -> NormalizedStatus {
        let provider = raw.provider();
        let mut status = normalize(raw);

        if status.state == CanonicalState::Completed && provider.media() == MediaKind::Image {
            status.result_urls = self
                .rehoster
                .rehost_all(provider, external_task_id, status.result_urls)
                .await;
        }

        status
    }
}

/// Pure part of normalization: the provider mapping plus content-policy inference.
pub fn normalize(raw: &RawProviderStatus) -> NormalizedStatus {
    let status = raw.normalize();
    match &status.error {
        Some(error) if !status.state.is_terminal() && is_content_policy_error(error) => {
            NormalizedStatus::failed(error.clone())
        }
        _ => status,
    }
}
