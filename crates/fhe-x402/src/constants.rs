use alloy::primitives::{address, Address};

use crate::X402Error;

/// x402 protocol version carried in every payment payload.
pub const X402_VERSION: u32 = 1;

/// x402 scheme name for confidential (FHE) token transfers.
pub const SCHEME_NAME: &str = "fhe-transfer";

/// Sepolia chain ID.
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;

/// Network name used in requirements for Sepolia.
pub const SEPOLIA_NETWORK: &str = "sepolia";

/// Confidential token (ERC-7984) deployed on Sepolia.
pub const DEFAULT_TOKEN: Address = address!("803d7ADD44B238F40106B1C4439ecAcd05910dc7");

/// Facilitator used when neither the requirement nor the environment names one.
pub const DEFAULT_FACILITATOR_URL: &str = "https://zama-facilitator.ultravioletadao.xyz";

/// Default public RPC endpoint for Sepolia.
pub const RPC_URL: &str = "https://ethereum-sepolia-rpc.publicnode.com";

/// Request header carrying the payment transaction hash.
pub const PAYMENT_TX_HASH_HEADER: &str = "X-Payment-TxHash";

/// Request header carrying the base64-encoded JSON [`PaymentPayload`](crate::PaymentPayload).
pub const PAYMENT_PAYLOAD_HEADER: &str = "X-Payment-Payload";

/// Default `maxTimeoutSeconds` for issued requirements.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;

/// MIME type advertised by issued requirements.
pub const DEFAULT_MIME_TYPE: &str = "application/json";

/// Validity, in days, of decryption signatures created by the client.
pub const DEFAULT_SIGNATURE_DURATION_DAYS: u32 = 10;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Runtime protocol configuration. Replaces process-wide settings so that
/// codec, facilitator client and servers can be instantiated per test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub facilitator_base_url: String,
    /// Payee for issued requirements. Only resource servers need one.
    pub merchant_address: Option<Address>,
    pub token_address: Address,
    pub default_chain_id: u64,
    pub network: String,
}

impl Default for ProtocolConfig {
    /// Defaults to Sepolia with the public confidential token and facilitator.
    fn default() -> Self {
        Self {
            facilitator_base_url: DEFAULT_FACILITATOR_URL.to_string(),
            merchant_address: None,
            token_address: DEFAULT_TOKEN,
            default_chain_id: SEPOLIA_CHAIN_ID,
            network: SEPOLIA_NETWORK.to_string(),
        }
    }
}

impl ProtocolConfig {
    /// Read `FACILITATOR_URL`, `MERCHANT_ADDRESS`, `TOKEN_ADDRESS`, `CHAIN_ID`
    /// and `NETWORK`, falling back to [`ProtocolConfig::default`] per field.
    pub fn from_env() -> Result<Self, X402Error> {
        let defaults = Self::default();

        let facilitator_base_url = match env_var("FACILITATOR_URL") {
            Some(raw) => validate_base_url(&raw)?,
            None => defaults.facilitator_base_url,
        };

        let merchant_address = env_var("MERCHANT_ADDRESS")
            .map(|raw| parse_address("MERCHANT_ADDRESS", &raw))
            .transpose()?;

        let token_address = match env_var("TOKEN_ADDRESS") {
            Some(raw) => parse_address("TOKEN_ADDRESS", &raw)?,
            None => defaults.token_address,
        };

        let default_chain_id = match env_var("CHAIN_ID") {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                X402Error::ConfigError(format!("CHAIN_ID '{raw}' is not a chain id: {e}"))
            })?,
            None => defaults.default_chain_id,
        };

        let network = env_var("NETWORK").unwrap_or(defaults.network);

        Ok(Self {
            facilitator_base_url,
            merchant_address,
            token_address,
            default_chain_id,
            network,
        })
    }

    pub fn with_facilitator(mut self, base_url: impl Into<String>) -> Self {
        self.facilitator_base_url = base_url.into();
        self
    }

    pub fn with_merchant(mut self, merchant: Address) -> Self {
        self.merchant_address = Some(merchant);
        self
    }

    pub fn with_token(mut self, token: Address) -> Self {
        self.token_address = token;
        self
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_address(name: &str, raw: &str) -> Result<Address, X402Error> {
    raw.parse::<Address>()
        .map_err(|e| X402Error::ConfigError(format!("{name} '{raw}' is not an address: {e}")))
}

/// Check that `raw` is an absolute http(s) URL and strip any trailing slash.
pub fn validate_base_url(raw: &str) -> Result<String, X402Error> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| X402Error::ConfigError(format!("invalid URL '{raw}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(raw.trim_end_matches('/').to_string()),
        other => Err(X402Error::ConfigError(format!(
            "unsupported URL scheme '{other}' in '{raw}'"
        ))),
    }
}
