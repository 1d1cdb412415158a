#![allow(dead_code)]

use async_trait::async_trait;
use gen_gateway::{
    error::GatewayError,
    models::{PaymentExpectation, PaymentMethod, PaymentVerification, ProviderKind},
    providers::{Gpt4oRecord, ProviderAdapter, ProviderRegistry, RawProviderStatus},
    services::{
        BuybackQueue, GenerationGateway, MediaRehoster, MemoryStore, PaymentVerifier, PriceFeed,
        RefundChain, Store, SwapExecutor, TaskNormalizer,
    },
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const WALLET: &str = "0x1111111111111111111111111111111111111111";
pub const SIG: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

pub struct FakeVerifier {
    pub valid: bool,
    pub calls: AtomicUsize,
}

impl FakeVerifier {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self { valid: true, calls: AtomicUsize::new(0) })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self { valid: false, calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl PaymentVerifier for FakeVerifier {
    async fn verify(
        &self,
        signature: &str,
        _expectation: &PaymentExpectation,
    ) -> Result<PaymentVerification, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.valid {
            Ok(PaymentVerification::accepted(signature, Some(WALLET.to_string()), None))
        } else {
            Ok(PaymentVerification::rejected(signature, "Transaction failed"))
        }
    }

    async fn healthy(&self) -> bool {
        true
    }
}

/// Adapter with scripted answers.
pub struct FakeAdapter {
    pub kind: ProviderKind,
    pub created: AtomicUsize,
    pub fail_create: bool,
    pub status: Mutex<Option<RawProviderStatus>>,
}

impl FakeAdapter {
    pub fn new(kind: ProviderKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            created: AtomicUsize::new(0),
            fail_create: false,
            status: Mutex::new(None),
        })
    }

    pub fn failing(kind: ProviderKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            created: AtomicUsize::new(0),
            fail_create: true,
            status: Mutex::new(None),
        })
    }

    pub fn answer(&self, status: RawProviderStatus) {
        *self.status.lock().unwrap() = Some(status);
    }
}

#[async_trait]
impl ProviderAdapter for FakeAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn create_task(&self, _prompt: &str, _options: &Value) -> Result<String, GatewayError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        if self.fail_create {
            return Err(GatewayError::upstream(self.kind, Some(500), r#"{"code":500,"msg":"quota exhausted"}"#));
        }
        Ok(format!("task-{}", n + 1))
    }

    async fn query_task(&self, _external_task_id: &str) -> Result<RawProviderStatus, GatewayError> {
        self.status
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GatewayError::upstream(self.kind, Some(404), "record not found"))
    }
}

pub fn gpt4o_record(flag: i32, urls: &[&str], error: Option<&str>) -> RawProviderStatus {
    serde_json::from_value::<Gpt4oRecord>(serde_json::json!({
        "taskId": "task-1",
        "successFlag": flag,
        "response": { "resultUrls": urls },
        "errorMessage": error,
    }))
    .map(RawProviderStatus::Gpt4oImage)
    .unwrap()
}

pub struct FixedPrices {
    pub native: f64,
    pub token: Option<f64>,
}

#[async_trait]
impl PriceFeed for FixedPrices {
    async fn native_usd(&self) -> f64 {
        self.native
    }

    async fn reward_token_usd(&self) -> Result<f64, GatewayError> {
        self.token
            .ok_or_else(|| GatewayError::PriceUnavailable("no token quote".to_string()))
    }
}

pub fn prices(native: f64, token: Option<f64>) -> Arc<FixedPrices> {
    Arc::new(FixedPrices { native, token })
}

#[derive(Default)]
pub struct FakeSwap {
    pub fail: bool,
    pub amounts: Mutex<Vec<u128>>,
}

#[async_trait]
impl SwapExecutor for FakeSwap {
    async fn buy_reward_token(&self, native_amount_wei: u128) -> Result<String, GatewayError> {
        self.amounts.lock().unwrap().push(native_amount_wei);
        if self.fail {
            return Err(GatewayError::BatchExecution("router reverted".to_string()));
        }
        Ok("0xbatch".to_string())
    }
}

pub struct FakeRefundChain {
    pub balance: u128,
    pub recipient_ready: bool,
    pub fail_transfer: bool,
    /// Broadcast succeeds but the receipt never arrives.
    pub unconfirmed: bool,
    /// The broadcast call itself times out.
    pub submit_timeout: bool,
    pub transfers: Mutex<Vec<(PaymentMethod, String, u128)>>,
}

impl FakeRefundChain {
    pub fn funded(balance: u128) -> Self {
        Self {
            balance,
            recipient_ready: true,
            fail_transfer: false,
            unconfirmed: false,
            submit_timeout: false,
            transfers: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RefundChain for FakeRefundChain {
    fn funding_address(&self) -> String {
        "0x2222222222222222222222222222222222222222".to_string()
    }

    async fn token_balance(&self, _token: PaymentMethod, _owner: &str) -> Result<u128, GatewayError> {
        Ok(self.balance)
    }

    async fn recipient_ready(&self, _token: PaymentMethod, _recipient: &str) -> Result<bool, GatewayError> {
        Ok(self.recipient_ready)
    }

    async fn submit_transfer(&self, token: PaymentMethod, recipient: &str, amount: u128) -> Result<String, GatewayError> {
        if self.fail_transfer {
            return Err(GatewayError::Refund("transfer submission failed".to_string()));
        }
        let mut transfers = self.transfers.lock().unwrap();
        transfers.push((token, recipient.to_string(), amount));
        if self.submit_timeout {
            return Err(GatewayError::Timeout("refund transfer submission".to_string()));
        }
        Ok(format!("0xrefund{}", transfers.len()))
    }

    async fn confirm_transfer(&self, _tx_hash: &str) -> Result<(), GatewayError> {
        if self.unconfirmed {
            return Err(GatewayError::Timeout("refund transfer receipt".to_string()));
        }
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<GenerationGateway>,
    pub verifier: Arc<FakeVerifier>,
    pub adapter: Arc<FakeAdapter>,
}

pub fn harness_with(verifier: Arc<FakeVerifier>, adapter: Arc<FakeAdapter>) -> Harness {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let registered: Arc<dyn ProviderAdapter> = adapter.clone();
    let providers = Arc::new(ProviderRegistry::with_adapters(vec![registered]));
    let normalizer = Arc::new(TaskNormalizer::new(Arc::new(MediaRehoster::disabled())));
    let queue = Arc::new(BuybackQueue::new(store.clone(), 10.0));
    let gateway = Arc::new(GenerationGateway::new(
        store.clone(),
        providers,
        verifier.clone(),
        normalizer,
        queue,
        "base",
        chrono::Duration::hours(24),
    ));
    Harness { store, gateway, verifier, adapter }
}

pub fn harness() -> Harness {
    harness_with(FakeVerifier::accepting(), FakeAdapter::new(ProviderKind::Gpt4oImage))
}
