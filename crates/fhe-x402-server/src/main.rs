use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use x402::{FacilitatorClient, ProtocolConfig, PAYMENT_PAYLOAD_HEADER, PAYMENT_TX_HASH_HEADER};
use x402_server::config::{PaymentConfig, ServerSettings, PREMIUM_DATA_PATH};
use x402_server::routes;
use x402_server::state::ServerState;

fn build_cors(origins: &[String]) -> Cors {
    let headers = vec![
        "content-type",
        "authorization",
        PAYMENT_TX_HASH_HEADER,
        PAYMENT_PAYLOAD_HEADER,
    ];
    if origins.is_empty() {
        Cors::default()
            .allowed_origin_fn(|origin, _| {
                origin
                    .to_str()
                    .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                    .unwrap_or(false)
            })
            .allow_any_method()
            .allowed_headers(headers)
            .max_age(3600)
    } else {
        let mut cors = Cors::default();
        for origin in origins {
            cors = cors.allowed_origin(origin);
        }
        cors.allow_any_method()
            .allowed_headers(headers)
            .max_age(3600)
    }
}

fn invalid_config(e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let protocol = ProtocolConfig::from_env().map_err(invalid_config)?;
    let payments = PaymentConfig::premium_data(protocol.clone()).map_err(invalid_config)?;
    let verifier = FacilitatorClient::new(&protocol);
    let settings = ServerSettings::from_env();
    tracing::debug!(?settings, "server settings");

    if settings.metrics_token.is_none() && !settings.public_metrics {
        tracing::warn!("METRICS_TOKEN not set, /metrics will answer 403");
    }

    let state = web::Data::new(
        ServerState::new(payments, verifier)
            .with_metrics(settings.metrics_token.clone(), settings.public_metrics),
    );

    let port = settings.port;
    tracing::info!("fhe-x402 resource server listening at http://localhost:{port}");
    tracing::info!("Facilitator: {}", protocol.facilitator_base_url);
    tracing::info!(
        "Payee: {:?} on {} (chain {})",
        protocol.merchant_address,
        protocol.network,
        protocol.default_chain_id
    );
    tracing::info!("Rate limit: {} req/min per IP", settings.rate_limit_rpm);
    tracing::info!("  GET  http://localhost:{port}{PREMIUM_DATA_PATH}");
    tracing::info!("  POST http://localhost:{port}{PREMIUM_DATA_PATH}");

    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(settings.rate_limit_rpm)
        .finish()
        .ok_or_else(|| invalid_config("RATE_LIMIT_RPM must be positive"))?;

    let cors_origins = settings.allowed_origins.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(web::PayloadConfig::new(65_536))
            .app_data(state.clone())
            .configure(routes::configure::<FacilitatorClient>)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
