pub mod task;
pub mod response;
pub mod payment;
pub mod buyback;
pub mod refund;

pub use task::*;
pub use response::*;
pub use payment::*;
pub use buyback::*;
pub use refund::*;
