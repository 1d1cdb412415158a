pub mod payment;
pub mod poller;

pub use payment::PaymentClient;
pub use poller::{poll_until_terminal, HttpStatusSource, PollOutcome, PollerConfig, StatusSource};
