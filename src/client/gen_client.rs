use anyhow::{Context, Result};
use ethers::types::Address;
use gen_gateway::{
    client::{poll_until_terminal, HttpStatusSource, PaymentClient, PollOutcome, PollerConfig},
    models::{GenerateResponse, PaymentQuote},
};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();

    let base_url = std::env::var("GATEWAY_URL")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());
    let wallet_key = std::env::var("CLIENT_WALLET_PRIVATE_KEY")
        .context("CLIENT_WALLET_PRIVATE_KEY required")?;
    let recipient = Address::from_str(&std::env::var("RECIPIENT_ADDRESS")?)?;
    let usdc_address = Address::from_str(&std::env::var("USDC_ADDRESS")?)?;
    let rpc_url = std::env::var("PAYMENT_RPC_URL").context("PAYMENT_RPC_URL required")?;
    let chain_id: u64 = std::env::var("CHAIN_ID")
        .unwrap_or_else(|_| "8453".to_string())
        .parse()
        .context("Invalid CHAIN_ID")?;

    let mut args = std::env::args().skip(1);
    let model = args.next().unwrap_or_else(|| "gpt-4o-image".to_string());
    let prompt = args.collect::<Vec<_>>().join(" ");
    if prompt.is_empty() {
        anyhow::bail!("usage: gen-client <model> <prompt...>");
    }

    let payment_client = PaymentClient::new(&rpc_url, &wallet_key, chain_id, usdc_address)?;
    let wallet = format!("{:?}", payment_client.address());
    println!("Gateway: {}", base_url);
    println!("Wallet: {} ({:.6} USDC)", wallet, payment_client.usdc_balance().await?);
    println!();

    let http = Client::new();
    let url = format!("{}/generate", base_url.trim_end_matches('/'));

    println!("Step 1: Requesting a quote for {}...", model);
    let response = http
        .post(&url)
        .json(&json!({ "model": model, "prompt": prompt }))
        .send()
        .await?;
    if response.status() != StatusCode::PAYMENT_REQUIRED {
        anyhow::bail!("Expected 402 Payment Required, got {}", response.status());
    }
    let quote: PaymentQuote = response.json().await.context("Malformed quote")?;
    println!("   [OK] {} {} on {}", quote.amount, quote.currency, quote.network);

    println!("Step 2: Paying...");
    let tx_hash = payment_client.send_usdc(quote.amount, recipient).await?;
    let signature = format!("{:?}", tx_hash);
    println!("   [OK] Payment sent: {}", signature);

    println!("Step 3: Dispatching with payment proof...");
    let response = http
        .post(&url)
        .json(&json!({
            "model": model,
            "prompt": prompt,
            "paymentSignature": signature,
            "generationId": quote.generation_id,
            "userWallet": wallet,
        }))
        .send()
        .await?;
    if !response.status().is_success() {
        let body: Value = response.json().await.unwrap_or(Value::Null);
        anyhow::bail!("Dispatch failed: {}", body);
    }
    let dispatched: GenerateResponse = response.json().await?;
    println!("   [OK] Task {}", dispatched.task_id);

    println!("Step 4: Waiting for the result (Ctrl-C to stop)...");
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let source = HttpStatusSource::new(http, base_url, model);
    match poll_until_terminal(&source, &dispatched.task_id, &PollerConfig::default(), &cancel).await {
        PollOutcome::Completed(status) => {
            println!("   [SUCCESS]");
            for url in status.result_urls.unwrap_or_default() {
                println!("   {}", url);
            }
        }
        PollOutcome::Failed(reason) => println!("   [FAILED] {}", reason),
        PollOutcome::Timeout => println!("   [TIMEOUT] task is still running upstream"),
        PollOutcome::Cancelled => println!("   [CANCELLED]"),
    }

    Ok(())
}
