mod cli;

use std::process::ExitCode;

use alloy::providers::ProviderBuilder;
use clap::Parser;
use cli::{Cli, ClientCommand};
use reqwest::header::CONTENT_TYPE;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use x402::codec::parse_challenge;
use x402::constants::validate_base_url;
use x402::{
    ConfidentialTokenGateway, Erc7984Gateway, FacilitatorClient, ProtocolConfig, X402Error,
};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(cli).await {
        Ok(found) if found => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Runs one command. `Ok(false)` means it ran but found nothing to report.
async fn run(cli: Cli) -> Result<bool, X402Error> {
    let mut config = ProtocolConfig::from_env()?;
    if let Some(url) = cli.facilitator {
        config = config.with_facilitator(validate_base_url(&url)?);
    }

    match cli.command {
        ClientCommand::Challenge { url } => {
            let resp = reqwest::get(&url)
                .await
                .map_err(|e| X402Error::HttpError(format!("request failed: {e}")))?;
            let status = resp.status().as_u16();
            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body = resp
                .bytes()
                .await
                .map_err(|e| X402Error::HttpError(format!("failed to read body: {e}")))?;

            match parse_challenge(status, &body, content_type.as_deref()) {
                Some(requirement) => {
                    println!("{}", serde_json::to_string_pretty(&requirement)?);
                    Ok(true)
                }
                None => {
                    eprintln!("no fhe-transfer challenge (HTTP {status})");
                    Ok(false)
                }
            }
        }
        ClientCommand::Health => {
            let client = FacilitatorClient::new(&config);
            let health = client.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
            Ok(health.is_ok())
        }
        ClientCommand::Supported => {
            let client = FacilitatorClient::new(&config);
            let supported = client.supported().await?;
            println!("{}", serde_json::to_string_pretty(&supported)?);
            Ok(!supported.supported.is_empty())
        }
        ClientCommand::Balance { account } => {
            let gateway = gateway(&cli.rpc_url, &config)?;
            match gateway.read_balance_handle(account).await {
                Some(handle) => {
                    println!("{handle}");
                    Ok(true)
                }
                None => {
                    eprintln!("no confidential balance for {account} on {}", config.token_address);
                    Ok(false)
                }
            }
        }
        ClientCommand::Transaction { tx_hash } => {
            let gateway = gateway(&cli.rpc_url, &config)?;
            match gateway.confirmed_transaction(tx_hash).await? {
                Some(tx) => {
                    println!("{}", serde_json::to_string_pretty(&tx)?);
                    Ok(tx.succeeded)
                }
                None => {
                    eprintln!("transaction {tx_hash} not found or pending");
                    Ok(false)
                }
            }
        }
    }
}

fn gateway(
    rpc_url: &str,
    config: &ProtocolConfig,
) -> Result<Erc7984Gateway<impl alloy::providers::Provider>, X402Error> {
    let url: reqwest::Url = validate_base_url(rpc_url)?
        .parse()
        .map_err(|e| X402Error::ConfigError(format!("invalid RPC_URL '{rpc_url}': {e}")))?;
    Ok(Erc7984Gateway::new(
        ProviderBuilder::new().connect_http(url),
        config.token_address,
    ))
}
