use x402::{ProtocolConfig, SupportedNetwork, SupportedResponse, SupportedToken};

/// Symbol advertised for the default confidential token.
pub const DEFAULT_TOKEN_SYMBOL: &str = "CTKN";
pub const DEFAULT_TOKEN_NAME: &str = "Confidential Token";

/// Shared application state for the facilitator server, generic over the
/// verifier: the on-chain [`x402::FheSchemeFacilitator`] or a
/// [`x402::FacilitatorClient`] proxying to an upstream facilitator.
pub struct AppState<S> {
    pub facilitator: S,
    pub config: ProtocolConfig,
    /// Served verbatim by `GET /supported`.
    pub supported: SupportedResponse,
    /// Bearer token for `/metrics`.
    pub metrics_token: Option<Vec<u8>>,
    /// Serve `/metrics` without a token when none is configured.
    pub public_metrics: bool,
}

impl<S> AppState<S> {
    /// State advertising the configured token on the configured network.
    pub fn new(facilitator: S, config: ProtocolConfig) -> Self {
        let supported = SupportedResponse {
            supported: vec![SupportedNetwork {
                network: config.network.clone(),
                chain_id: config.default_chain_id,
                tokens: vec![SupportedToken {
                    address: config.token_address,
                    symbol: DEFAULT_TOKEN_SYMBOL.to_string(),
                    name: DEFAULT_TOKEN_NAME.to_string(),
                }],
            }],
        };
        Self {
            facilitator,
            config,
            supported,
            metrics_token: None,
            public_metrics: false,
        }
    }

    pub fn with_metrics_token(mut self, token: Option<Vec<u8>>) -> Self {
        self.metrics_token = token;
        self
    }

    pub fn with_public_metrics(mut self, public: bool) -> Self {
        self.public_metrics = public;
        self
    }
}

impl<S> std::fmt::Debug for AppState<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("supported", &self.supported)
            .field("metrics_token", &self.metrics_token.as_ref().map(|_| "<redacted>"))
            .field("public_metrics", &self.public_metrics)
            .finish_non_exhaustive()
    }
}
