use std::collections::HashMap;

use x402::security::env_flag;
use x402::{PaymentRequirement, ProtocolConfig, X402Error};

pub const PREMIUM_DATA_PATH: &str = "/premium-data";
/// One token at 6 decimals.
pub const PREMIUM_DATA_PRICE: &str = "1000000";
pub const PREMIUM_DATA_DESCRIPTION: &str = "Premium content access";

/// Payment configuration for a single route.
#[derive(Debug, Clone)]
pub struct RoutePaymentConfig {
    /// Template requirement; `resource` is replaced by the request URL when issued.
    pub requirement: PaymentRequirement,
}

/// Process-level settings of the resource server binary.
#[derive(Clone)]
pub struct ServerSettings {
    pub port: u16,
    pub rate_limit_rpm: u64,
    pub allowed_origins: Vec<String>,
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
}

impl std::fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSettings")
            .field("port", &self.port)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field("allowed_origins", &self.allowed_origins)
            .field("metrics_token", &self.metrics_token.as_ref().map(|_| "<redacted>"))
            .field("public_metrics", &self.public_metrics)
            .finish()
    }
}

impl ServerSettings {
    /// Read `PORT`, `RATE_LIMIT_RPM`, `ALLOWED_ORIGINS`, `METRICS_TOKEN` and
    /// `X402_PUBLIC_METRICS`.
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(4021);

        let rate_limit_rpm: u64 = std::env::var("RATE_LIMIT_RPM")
            .ok()
            .and_then(|r| r.parse().ok())
            .unwrap_or(60);

        let allowed_origins: Vec<String> = std::env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|origins| parse_origins(&origins))
            .unwrap_or_default();

        let metrics_token = std::env::var("METRICS_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.into_bytes());

        Self {
            port,
            rate_limit_rpm,
            allowed_origins,
            metrics_token,
            public_metrics: env_flag(std::env::var("X402_PUBLIC_METRICS").ok().as_deref()),
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Holds payment configuration for all protected routes.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub protocol: ProtocolConfig,
    pub routes: HashMap<String, RoutePaymentConfig>,
}

/// Builder for constructing a `PaymentConfig` with multiple priced routes.
pub struct PaymentConfigBuilder {
    protocol: ProtocolConfig,
    routes: HashMap<String, RoutePaymentConfig>,
}

impl PaymentConfigBuilder {
    /// Payee, token, chain and facilitator come from `protocol`.
    pub fn new(protocol: ProtocolConfig) -> Self {
        Self {
            protocol,
            routes: HashMap::new(),
        }
    }

    /// Register a priced route, e.g. `route("GET", "/premium-data", "1000000", "...")`.
    ///
    /// `amount` is in the token's smallest unit. Fails if it is not a
    /// non-negative integer or no merchant address is configured.
    pub fn route(
        mut self,
        method: &str,
        path: &str,
        amount: &str,
        description: &str,
    ) -> Result<Self, X402Error> {
        let requirement =
            PaymentRequirement::for_resource(&self.protocol, path, amount, description)?;
        self.routes.insert(
            route_key(method, path),
            RoutePaymentConfig { requirement },
        );
        Ok(self)
    }

    /// Consume the builder and produce a `PaymentConfig`.
    pub fn build(self) -> PaymentConfig {
        PaymentConfig {
            protocol: self.protocol,
            routes: self.routes,
        }
    }
}

impl PaymentConfig {
    /// `GET` and `POST /premium-data` at one token each.
    pub fn premium_data(protocol: ProtocolConfig) -> Result<Self, X402Error> {
        Ok(PaymentConfigBuilder::new(protocol)
            .route(
                "GET",
                PREMIUM_DATA_PATH,
                PREMIUM_DATA_PRICE,
                PREMIUM_DATA_DESCRIPTION,
            )?
            .route(
                "POST",
                PREMIUM_DATA_PATH,
                PREMIUM_DATA_PRICE,
                PREMIUM_DATA_DESCRIPTION,
            )?
            .build())
    }

    /// Look up the payment config for a route (e.g. `"GET"`, `"/premium-data"`).
    pub fn get_route(&self, method: &str, path: &str) -> Option<&RoutePaymentConfig> {
        self.routes.get(&route_key(method, path))
    }
}

fn route_key(method: &str, path: &str) -> String {
    format!("{} {path}", method.to_ascii_uppercase())
}
