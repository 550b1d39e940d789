use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use x402::constants::validate_base_url;
use x402::security::env_flag;
use x402::{FacilitatorClient, ProtocolConfig};
use x402_facilitator::routes;
use x402_facilitator::state::AppState;

fn parse_cors_origins() -> Vec<String> {
    match std::env::var("ALLOWED_ORIGINS") {
        Ok(origins) => origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => vec![],
    }
}

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        // Default: allow localhost on any port
        Cors::default()
            .allowed_origin_fn(|origin, _| {
                origin
                    .to_str()
                    .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                    .unwrap_or(false)
            })
            .allow_any_method()
            .allowed_headers(vec!["content-type", "authorization"])
            .max_age(3600)
    } else {
        let mut cors = Cors::default();
        for origin in origins {
            cors = cors.allowed_origin(origin);
        }
        cors.allow_any_method()
            .allowed_headers(vec!["content-type", "authorization"])
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

    let config = ProtocolConfig::from_env().map_err(invalid_config)?;

    // Verification is delegated to an upstream facilitator that holds the
    // FHE decryption capability. Pinned: the requirement's own facilitator
    // field comes from the caller and must not pick the upstream.
    let upstream = match std::env::var("UPSTREAM_FACILITATOR_URL") {
        Ok(url) if !url.trim().is_empty() => validate_base_url(&url).map_err(invalid_config)?,
        _ => x402::DEFAULT_FACILITATOR_URL.to_string(),
    };
    let facilitator =
        FacilitatorClient::new(&config.clone().with_facilitator(upstream.clone())).pinned();

    let metrics_token = std::env::var("METRICS_TOKEN")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|s| s.into_bytes());
    let public_metrics = env_flag(std::env::var("X402_PUBLIC_METRICS").ok().as_deref());
    if metrics_token.is_none() && !public_metrics {
        tracing::warn!("METRICS_TOKEN not set, /metrics will answer 403");
    }

    let state = web::Data::new(
        AppState::new(facilitator, config)
            .with_metrics_token(metrics_token)
            .with_public_metrics(public_metrics),
    );

    let port: u16 = std::env::var("FACILITATOR_PORT")
        .or_else(|_| std::env::var("PORT"))
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(4022);

    let rate_limit_rpm: u64 = std::env::var("RATE_LIMIT_RPM")
        .ok()
        .and_then(|r| r.parse().ok())
        .unwrap_or(120);

    let cors_origins = parse_cors_origins();

    tracing::info!("fhe-x402 facilitator listening on port {port}");
    tracing::info!("Upstream facilitator: {upstream}");
    tracing::info!("Rate limit: {rate_limit_rpm} req/min per IP");
    tracing::info!("  GET  http://localhost:{port}/supported");
    tracing::info!("  POST http://localhost:{port}/verify");

    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(rate_limit_rpm)
        .finish()
        .ok_or_else(|| invalid_config("RATE_LIMIT_RPM must be positive"))?;

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
