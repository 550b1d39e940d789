//! CLI definition for x402-client.

use alloy::primitives::{Address, TxHash};
use clap::{Parser, Subcommand};

/// Operational probes for fhe-transfer resources and facilitators.
#[derive(Parser, Debug)]
#[command(name = "x402-client")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Facilitator base URL (defaults to FACILITATOR_URL or the public facilitator).
    #[arg(long, env = "FACILITATOR_URL")]
    pub facilitator: Option<String>,

    /// JSON-RPC endpoint for on-chain reads.
    #[arg(long, env = "RPC_URL", default_value = x402::RPC_URL)]
    pub rpc_url: String,

    /// Log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: ClientCommand,
}

#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    /// Request a URL without payment and print its fhe-transfer requirement.
    Challenge {
        /// Resource URL.
        url: String,
    },
    /// Query the facilitator's /health endpoint.
    Health,
    /// List the networks and tokens the facilitator supports.
    Supported,
    /// Print the encrypted balance handle of an account.
    Balance {
        account: Address,
    },
    /// Print the confidential transfers performed by a mined transaction.
    Transaction {
        tx_hash: TxHash,
    },
}
