//! Paid generation flow: quote, verify, record, dispatch exactly once, then
//! answer status queries in the canonical vocabulary.

use crate::{
    error::GatewayError,
    models::{
        CanonicalState, GenerateRequest, GenerateResponse, GenerationTask, ModelCatalog, ModelSpec,
        NormalizedStatus, PaymentExpectation, PaymentMethod, PaymentQuote, PaymentRecord,
        PaymentTracking, RefundOrder, RefundRequest, TaskStatusResponse, VerifyPaymentRequest,
    },
    providers::ProviderRegistry,
    services::{canonical_signature, store::Store, BuybackQueue, PaymentVerifier, TaskNormalizer},
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

const QUOTE_CURRENCY: &str = "USDC";

pub struct GenerationGateway {
    store: Arc<dyn Store>,
    providers: Arc<ProviderRegistry>,
    verifier: Arc<dyn PaymentVerifier>,
    normalizer: Arc<TaskNormalizer>,
    queue: Arc<BuybackQueue>,
    network: String,
    tracking_ttl: chrono::Duration,
}

impl GenerationGateway {
    pub fn new(
        store: Arc<dyn Store>,
        providers: Arc<ProviderRegistry>,
        verifier: Arc<dyn PaymentVerifier>,
        normalizer: Arc<TaskNormalizer>,
        queue: Arc<BuybackQueue>,
        network: impl Into<String>,
        tracking_ttl: chrono::Duration,
    ) -> Self {
        Self {
            store,
            providers,
            verifier,
            normalizer,
            queue,
            network: network.into(),
            tracking_ttl,
        }
    }

    pub fn quote(&self, spec: &ModelSpec) -> PaymentQuote {
        PaymentQuote {
            generation_id: Uuid::new_v4().to_string(),
            amount: spec.price_usd,
            currency: QUOTE_CURRENCY.to_string(),
            network: self.network.clone(),
        }
    }

    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, GatewayError> {
        let spec = resolve_model(&request.model)?;
        if let Some(kind) = request.media_type {
            if kind != spec.media() {
                return Err(GatewayError::BadRequest(format!(
                    "model {} produces {:?}, not {:?}",
                    spec.id,
                    spec.media(),
                    kind
                )));
            }
        }
        if request.prompt.trim().is_empty() {
            return Err(GatewayError::BadRequest("prompt must not be empty".to_string()));
        }

        let submitted = match request.payment_signature.as_deref().map(str::trim) {
            Some(sig) if !sig.is_empty() => sig.to_string(),
            _ => return Err(GatewayError::PaymentRequired(self.quote(spec))),
        };

        let method = request.payment_method.unwrap_or_default();
        let generation_id = request
            .generation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let payment = self
            .verify_and_record(
                &submitted,
                &generation_id,
                spec.price_usd,
                method,
                request.user_wallet.clone(),
            )
            .await?;
        let signature = payment.signature.clone();

        if payment.amount_usd + f64::EPSILON < spec.price_usd {
            return Err(GatewayError::PaymentVerificationFailed(format!(
                "payment {} covers ${} but {} costs ${}",
                signature, payment.amount_usd, spec.id, spec.price_usd
            )));
        }

        if let Some(task_id) = payment.task_id.clone() {
            if let Some(task) = self.store.get_generation(&task_id).await? {
                if task.model != spec.id {
                    return Err(GatewayError::BadRequest(format!(
                        "payment {} already dispatched task {} for model {}",
                        signature, task_id, task.model
                    )));
                }
            }
            tracing::info!("Payment {} already dispatched as task {}", signature, task_id);
            return Ok(GenerateResponse {
                success: true,
                task_id,
                model: spec.id.to_string(),
            });
        }

        if !self.store.claim_dispatch(&signature).await? {
            return Err(GatewayError::DispatchInProgress(signature));
        }

        let task_id = match self.dispatch(spec, &request).await {
            Ok(task_id) => task_id,
            Err(e) => {
                if let Err(release_err) = self.store.release_dispatch(&signature).await {
                    tracing::error!("Failed to release dispatch claim for {}: {}", signature, release_err);
                }
                return Err(e);
            }
        };

        self.store.bind_task(&signature, &task_id).await?;
        self.remember(spec, &request, &payment, &generation_id, &task_id).await;

        tracing::info!(
            "Dispatched {} task {} for payment {}",
            spec.provider,
            task_id,
            signature
        );

        Ok(GenerateResponse {
            success: true,
            task_id,
            model: spec.id.to_string(),
        })
    }

    async fn dispatch(&self, spec: &ModelSpec, request: &GenerateRequest) -> Result<String, GatewayError> {
        let adapter = self.providers.get(spec.provider)?;
        let options = if request.options.is_null() {
            serde_json::json!({})
        } else {
            request.options.clone()
        };
        adapter.create_task(&request.prompt, &options).await
    }

    /// Ledger and tracking writes after a successful dispatch. The task already
    /// exists upstream, so failures here are logged instead of surfaced.
    async fn remember(
        &self,
        spec: &ModelSpec,
        request: &GenerateRequest,
        payment: &PaymentRecord,
        generation_id: &str,
        task_id: &str,
    ) {
        let task = GenerationTask {
            id: generation_id.to_string(),
            provider: spec.provider,
            external_task_id: task_id.to_string(),
            model: spec.id.to_string(),
            prompt: request.prompt.clone(),
            options: request.options.clone(),
            created_at: Utc::now(),
            terminal_state: None,
            terminal_at: None,
        };
        if let Err(e) = self.store.record_generation(&task).await {
            tracing::error!("Failed to record generation {}: {}", task_id, e);
        }

        let tracking = PaymentTracking::new(task_id, payment, self.tracking_ttl);
        if let Err(e) = self.store.track_payment(&tracking).await {
            tracing::error!("Failed to track payment {} for task {}: {}", payment.signature, task_id, e);
        }
    }

    /// Returns the stored record for a signature, verifying and recording it on first sight.
    /// The signature is canonicalised first, so the returned record carries the stored spelling.
    pub async fn verify_and_record(
        &self,
        signature: &str,
        generation_id: &str,
        amount_usd: f64,
        method: PaymentMethod,
        user_wallet: Option<String>,
    ) -> Result<PaymentRecord, GatewayError> {
        let signature = canonical_signature(signature)?;
        let signature = signature.as_str();
        if let Some(existing) = self.store.get_payment(signature).await? {
            return Ok(existing);
        }

        let expectation = PaymentExpectation { amount_usd, method };
        let verification = self.verifier.verify(signature, &expectation).await?;
        if !verification.valid {
            return Err(GatewayError::PaymentVerificationFailed(verification.reason));
        }

        let record = PaymentRecord {
            signature: signature.to_string(),
            generation_id: generation_id.to_string(),
            task_id: None,
            user_wallet: user_wallet.or(verification.payer),
            amount_usd,
            payment_method: method,
            timestamp: Utc::now(),
        };

        if !self.store.insert_payment(&record).await? {
            // Lost the insert race; the winner queued the contribution.
            return self
                .store
                .get_payment(signature)
                .await?
                .ok_or_else(|| GatewayError::Internal(anyhow::anyhow!("payment {} vanished", signature)));
        }

        if let Err(e) = self.queue.contribute(signature, generation_id, amount_usd).await {
            tracing::warn!("Buyback contribution for {} not queued: {}", signature, e);
        }

        Ok(record)
    }

    pub async fn verify_payment(&self, request: VerifyPaymentRequest) -> Result<bool, GatewayError> {
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(GatewayError::BadRequest(format!("invalid amount {}", request.amount)));
        }

        let outcome = self
            .verify_and_record(
                request.signature.trim(),
                &request.generation_id,
                request.amount,
                request.payment_method.unwrap_or_default(),
                request.user_wallet,
            )
            .await;

        match outcome {
            Ok(_) => Ok(true),
            Err(GatewayError::PaymentVerificationFailed(reason)) => {
                tracing::info!("Payment {} not verified: {}", request.signature, reason);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn task_status(&self, model: &str, external_task_id: &str) -> Result<TaskStatusResponse, GatewayError> {
        let spec = resolve_model(model)?;
        let adapter = self.providers.get(spec.provider)?;

        let raw = adapter.query_task(external_task_id).await?;
        let status = self.normalizer.resolve(&raw, external_task_id).await;

        if status.state.is_terminal() {
            match self.store.annotate_terminal(external_task_id, status.state).await {
                Ok(true) => tracing::info!("Task {} reached {:?}", external_task_id, status.state),
                Ok(false) => {}
                Err(e) => tracing::warn!("Failed to annotate task {}: {}", external_task_id, e),
            }
        }

        if status.state == CanonicalState::Failed {
            self.request_refund(external_task_id, &status).await;
        }

        Ok(status.into())
    }

    async fn request_refund(&self, external_task_id: &str, status: &NormalizedStatus) {
        let tracking = match self.store.get_tracking(external_task_id).await {
            Ok(Some(tracking)) => tracking,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Payment tracking lookup for {} failed: {}", external_task_id, e);
                return;
            }
        };

        // A refund that was attempted once is not requested again.
        match self.store.get_refund(&tracking.signature).await {
            Ok(None) => {}
            Ok(Some(_)) => return,
            Err(e) => {
                tracing::warn!("Refund lookup for {} failed: {}", tracking.signature, e);
                return;
            }
        }

        let Some(user_wallet) = tracking.user_wallet.clone() else {
            tracing::warn!(
                "Task {} failed but payment {} has no wallet to refund",
                external_task_id,
                tracking.signature
            );
            return;
        };

        let request = RefundRequest {
            order: RefundOrder {
                user_wallet,
                amount_usd: tracking.amount_usd,
                payment_method: tracking.payment_method,
                reason: status
                    .error
                    .clone()
                    .unwrap_or_else(|| "generation failed".to_string()),
                original_signature: tracking.signature.clone(),
            },
            external_task_id: Some(external_task_id.to_string()),
            created_at: Utc::now(),
        };

        match self.store.enqueue_refund_request(&request).await {
            Ok(true) => tracing::info!(
                "Refund requested for payment {} after task {} failed",
                tracking.signature,
                external_task_id
            ),
            Ok(false) => {}
            Err(e) => tracing::error!("Failed to queue refund for {}: {}", tracking.signature, e),
        }
    }
}

fn resolve_model(model: &str) -> Result<&'static ModelSpec, GatewayError> {
    ModelCatalog::lookup(model).ok_or_else(|| GatewayError::UnknownModel(model.to_string()))
}
