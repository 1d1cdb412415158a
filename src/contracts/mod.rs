pub mod erc20;
pub mod uniswap;

pub use erc20::IERC20;
pub use uniswap::UniswapV2Router;

use anyhow::{Context, Result};
use ethers::{
    prelude::*,
    providers::{Http, Provider},
};
use std::sync::Arc;

/// RPC provider with a local signing wallet attached.
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

pub fn signer_client(rpc_url: &str, private_key: &str, chain_id: u64) -> Result<Arc<SignerClient>> {
    let provider = Provider::<Http>::try_from(rpc_url).context("Invalid RPC URL")?;
    let wallet = private_key
        .parse::<LocalWallet>()
        .context("Invalid wallet private key")?
        .with_chain_id(chain_id);
    Ok(Arc::new(SignerMiddleware::new(provider, wallet)))
}

/// Converts a display amount to integer base units.
pub fn to_base_units(amount: f64, decimals: u8) -> u128 {
    if !amount.is_finite() || amount <= 0.0 {
        return 0;
    }
    (amount * 10f64.powi(decimals as i32)).round() as u128
}

pub fn from_base_units(amount: u128, decimals: u8) -> f64 {
    amount as f64 / 10f64.powi(decimals as i32)
}

/// Saturating narrow of an on-chain amount.
pub fn u256_to_u128(value: U256) -> u128 {
    if value > U256::from(u128::MAX) {
        u128::MAX
    } else {
        value.as_u128()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_unit_conversion() {
        assert_eq!(to_base_units(0.03, 6), 30_000);
        assert_eq!(to_base_units(0.001, 18), 1_000_000_000_000_000);
        assert_eq!(to_base_units(-1.0, 6), 0);
        assert_eq!(from_base_units(1_500_000, 6), 1.5);
    }
}
