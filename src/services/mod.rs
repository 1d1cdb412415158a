pub mod store;
pub mod media;
pub mod normalizer;
pub mod price;
pub mod payment_verifier;
pub mod swap;
pub mod buyback;
pub mod refund;
pub mod gateway;

pub use store::{MemoryStore, RedisStore, Store, StoreError};
pub use media::{HttpObjectStore, MediaRehoster, MediaStore};
pub use normalizer::{normalize, TaskNormalizer};
pub use price::{HttpPriceFeed, PriceFeed};
pub use payment_verifier::{canonical_signature, EthereumPaymentVerifier, PaymentVerifier};
pub use swap::{SwapExecutor, UniswapSwapExecutor};
pub use buyback::{BatchExecutor, BuybackQueue};
pub use refund::{DrainReport, EthereumRefundChain, RefundChain, RefundEngine, RefundWorker};
pub use gateway::GenerationGateway;
