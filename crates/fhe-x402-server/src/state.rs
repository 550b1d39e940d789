use crate::config::PaymentConfig;

/// Shared state of the resource server, generic over the payment verifier
/// (normally a [`x402::FacilitatorClient`]).
pub struct ServerState<S> {
    pub payments: PaymentConfig,
    pub verifier: S,
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
}

impl<S> ServerState<S> {
    pub fn new(payments: PaymentConfig, verifier: S) -> Self {
        Self {
            payments,
            verifier,
            metrics_token: None,
            public_metrics: false,
        }
    }

    pub fn with_metrics(mut self, token: Option<Vec<u8>>, public: bool) -> Self {
        self.metrics_token = token;
        self.public_metrics = public;
        self
    }
}
