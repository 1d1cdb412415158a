mod common;

use common::*;
use gen_gateway::{
    error::GatewayError,
    models::{
        CanonicalState, ContributionStatus, GenerateRequest, MediaKind, PaymentMethod, ProviderKind,
        VerifyPaymentRequest,
    },
};
use gen_gateway::services::Store;
use serde_json::json;
use std::sync::atomic::Ordering;

fn request(signature: Option<&str>) -> GenerateRequest {
    GenerateRequest {
        model: "gpt-4o-image".to_string(),
        prompt: "a lighthouse at dusk".to_string(),
        media_type: Some(MediaKind::Image),
        options: json!({ "size": "1:1" }),
        payment_signature: signature.map(str::to_string),
        generation_id: None,
        user_wallet: Some(WALLET.to_string()),
        payment_method: None,
    }
}

#[tokio::test]
async fn unpaid_request_gets_a_quote() {
    let h = harness();

    let err = h.gateway.generate(request(None)).await.unwrap_err();
    let GatewayError::PaymentRequired(quote) = err else {
        panic!("expected 402, got {:?}", err);
    };

    assert_eq!(quote.amount, 0.03);
    assert_eq!(quote.currency, "USDC");
    assert_eq!(quote.network, "base");
    assert!(uuid::Uuid::parse_str(&quote.generation_id).is_ok());
    assert_eq!(h.adapter.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_model_and_wrong_media_type_are_rejected() {
    let h = harness();

    let mut unknown = request(Some(SIG));
    unknown.model = "dall-e-9".to_string();
    assert!(matches!(
        h.gateway.generate(unknown).await,
        Err(GatewayError::UnknownModel(_))
    ));

    let mut mismatched = request(Some(SIG));
    mismatched.media_type = Some(MediaKind::Video);
    assert!(matches!(
        h.gateway.generate(mismatched).await,
        Err(GatewayError::BadRequest(_))
    ));
}

#[tokio::test]
async fn paid_request_dispatches_and_queues_ten_percent() {
    let h = harness();

    let response = h.gateway.generate(request(Some(SIG))).await.unwrap();
    assert!(response.success);
    assert_eq!(response.task_id, "task-1");
    assert_eq!(response.model, "gpt-4o-image");

    let payment = h.store.get_payment(SIG).await.unwrap().unwrap();
    assert_eq!(payment.task_id.as_deref(), Some("task-1"));
    assert_eq!(payment.payment_method, PaymentMethod::Usdc);

    let pending = h.store.contributions(ContributionStatus::Pending).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].amount_usd, 0.003);
    assert_eq!(pending[0].payment_signature, SIG);

    let tracking = h.store.get_tracking("task-1").await.unwrap().unwrap();
    assert_eq!(tracking.signature, SIG);
    assert!(h.store.get_generation("task-1").await.unwrap().is_some());
}

#[tokio::test]
async fn replayed_signature_returns_the_same_task() {
    let h = harness();

    let first = h.gateway.generate(request(Some(SIG))).await.unwrap();
    let second = h.gateway.generate(request(Some(SIG))).await.unwrap();

    assert_eq!(first.task_id, second.task_id);
    assert_eq!(h.adapter.created.load(Ordering::SeqCst), 1);
    assert_eq!(h.verifier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.store.contributions(ContributionStatus::Pending).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn replay_in_another_hex_spelling_is_the_same_payment() {
    let h = harness();
    let digits = SIG.trim_start_matches("0x");
    let spellings = [
        SIG.to_string(),
        format!("0X{}", digits.to_uppercase()),
        digits.to_string(),
    ];

    let mut tasks = Vec::new();
    for spelling in &spellings {
        tasks.push(h.gateway.generate(request(Some(spelling))).await.unwrap().task_id);
    }

    assert_eq!(tasks, vec!["task-1"; 3]);
    assert_eq!(h.adapter.created.load(Ordering::SeqCst), 1);
    assert_eq!(h.verifier.calls.load(Ordering::SeqCst), 1);
    let pending = h.store.contributions(ContributionStatus::Pending).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payment_signature, SIG);

    let standalone = VerifyPaymentRequest {
        signature: digits.to_uppercase(),
        generation_id: "gen-2".to_string(),
        amount: 0.03,
        payment_method: None,
        user_wallet: None,
    };
    assert!(h.gateway.verify_payment(standalone).await.unwrap());
    assert_eq!(h.verifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_signature_is_rejected_before_any_write() {
    let h = harness();

    let err = h.gateway.generate(request(Some("0xnot-a-hash"))).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidPaymentProof(_)));
    assert_eq!(h.verifier.calls.load(Ordering::SeqCst), 0);
    assert!(h.store.contributions(ContributionStatus::Pending).await.unwrap().is_empty());
}

#[tokio::test]
async fn replay_under_another_model_is_refused() {
    let h = harness();
    h.gateway.generate(request(Some(SIG))).await.unwrap();

    let mut other = request(Some(SIG));
    other.model = "nano-banana".to_string();
    let err = h.gateway.generate(other).await.unwrap_err();

    assert!(matches!(err, GatewayError::BadRequest(_)));
    assert!(err.to_string().contains("gpt-4o-image"));
    assert_eq!(h.adapter.created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_dispatch_on_one_signature_loses_the_claim() {
    let h = harness();
    assert!(h.store.claim_dispatch(SIG).await.unwrap());

    let err = h.gateway.generate(request(Some(SIG))).await.unwrap_err();
    assert!(matches!(err, GatewayError::DispatchInProgress(_)));
    assert_eq!(h.adapter.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_payment_is_not_recorded() {
    let h = harness_with(FakeVerifier::rejecting(), FakeAdapter::new(ProviderKind::Gpt4oImage));

    let err = h.gateway.generate(request(Some(SIG))).await.unwrap_err();
    assert!(matches!(err, GatewayError::PaymentVerificationFailed(_)));
    assert!(h.store.get_payment(SIG).await.unwrap().is_none());
    assert!(h.store.contributions(ContributionStatus::Pending).await.unwrap().is_empty());
}

#[tokio::test]
async fn provider_failure_releases_the_claim_and_keeps_the_body() {
    let h = harness_with(FakeVerifier::accepting(), FakeAdapter::failing(ProviderKind::Gpt4oImage));

    let err = h.gateway.generate(request(Some(SIG))).await.unwrap_err();
    assert!(err.to_string().contains("quota exhausted"));
    assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);

    // Payment was recorded, the slot is free again for a retry.
    assert!(h.store.get_payment(SIG).await.unwrap().is_some());
    assert!(h.store.claim_dispatch(SIG).await.unwrap());
}

#[tokio::test]
async fn status_collapses_pending_and_returns_results() {
    let h = harness();
    h.gateway.generate(request(Some(SIG))).await.unwrap();

    h.adapter.answer(gpt4o_record(0, &[], None));
    let status = h.gateway.task_status("gpt-4o-image", "task-1").await.unwrap();
    assert_eq!(status.state, CanonicalState::Processing);
    assert!(status.result.is_none());

    h.adapter.answer(gpt4o_record(1, &["https://cdn.example/1.png"], None));
    let status = h.gateway.task_status("gpt-4o-image", "task-1").await.unwrap();
    assert_eq!(status.state, CanonicalState::Completed);
    assert_eq!(status.result.as_deref(), Some("https://cdn.example/1.png"));

    let task = h.store.get_generation("task-1").await.unwrap().unwrap();
    assert_eq!(task.terminal_state, Some(CanonicalState::Completed));
}

#[tokio::test]
async fn failed_paid_task_places_one_refund_request() {
    let h = harness();
    h.gateway.generate(request(Some(SIG))).await.unwrap();

    h.adapter.answer(gpt4o_record(2, &[], Some("upstream crashed")));
    for _ in 0..2 {
        let status = h.gateway.task_status("gpt-4o-image", "task-1").await.unwrap();
        assert_eq!(status.state, CanonicalState::Failed);
        assert_eq!(status.error.as_deref(), Some("upstream crashed"));
    }

    let outbox = h.store.refund_requests().await.unwrap();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].order.original_signature, SIG);
    assert_eq!(outbox[0].order.user_wallet, WALLET);
    assert_eq!(outbox[0].order.amount_usd, 0.03);
}

#[tokio::test]
async fn policy_message_on_running_task_reads_as_failure() {
    let h = harness();
    h.gateway.generate(request(Some(SIG))).await.unwrap();

    h.adapter.answer(gpt4o_record(0, &[], Some("Prompt flagged by content policy")));
    let status = h.gateway.task_status("gpt-4o-image", "task-1").await.unwrap();
    assert_eq!(status.state, CanonicalState::Failed);
}

#[tokio::test]
async fn standalone_verification_is_idempotent() {
    let h = harness();
    let verify = || VerifyPaymentRequest {
        signature: SIG.to_string(),
        generation_id: "gen-1".to_string(),
        amount: 0.05,
        payment_method: None,
        user_wallet: None,
    };

    assert!(h.gateway.verify_payment(verify()).await.unwrap());
    assert!(h.gateway.verify_payment(verify()).await.unwrap());

    let pending = h.store.contributions(ContributionStatus::Pending).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].amount_usd, 0.005);
    assert_eq!(pending[0].generation_id, "gen-1");
}

#[tokio::test]
async fn standalone_verification_reports_unpaid() {
    let h = harness_with(FakeVerifier::rejecting(), FakeAdapter::new(ProviderKind::Gpt4oImage));
    let paid = h
        .gateway
        .verify_payment(VerifyPaymentRequest {
            signature: SIG.to_string(),
            generation_id: "gen-1".to_string(),
            amount: 0.05,
            payment_method: None,
            user_wallet: None,
        })
        .await
        .unwrap();
    assert!(!paid);
}
