use actix_web::{web, HttpRequest, HttpResponse};
use x402::security::bearer_matches;
use x402::{PaymentVerifyResult, SchemeFacilitator, VerifyRequest};

use crate::metrics;
use crate::state::AppState;

/// Register the facilitator endpoints for verifier `S`.
pub fn configure<S: SchemeFacilitator + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/verify").route(web::post().to(verify::<S>)))
        .service(web::resource("/health").route(web::get().to(health::<S>)))
        .service(web::resource("/supported").route(web::get().to(supported::<S>)))
        .service(web::resource("/metrics").route(web::get().to(metrics_endpoint::<S>)));
}

pub async fn verify<S: SchemeFacilitator + 'static>(
    state: web::Data<AppState<S>>,
    body: web::Bytes,
) -> HttpResponse {
    let parsed: VerifyRequest = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(error = %e, "malformed verify request");
            metrics::VERIFY_REQUESTS
                .with_label_values(&["malformed"])
                .inc();
            return HttpResponse::BadRequest()
                .json(PaymentVerifyResult::invalid("invalid request body"));
        }
    };

    let start = std::time::Instant::now();

    match state
        .facilitator
        .verify(&parsed.payment_payload, &parsed.payment_requirements)
        .await
    {
        Ok(verdict) => {
            let label = if verdict.is_valid { "valid" } else { "invalid" };
            metrics::VERIFY_REQUESTS.with_label_values(&[label]).inc();
            metrics::VERIFY_LATENCY
                .with_label_values(&[label])
                .observe(start.elapsed().as_secs_f64());
            if verdict.is_valid {
                tracing::info!(
                    tx = ?verdict.tx_hash,
                    amount = ?verdict.amount,
                    "payment verified"
                );
            } else {
                tracing::warn!(
                    tx = %parsed.payment_payload.payload.tx_hash,
                    reason = verdict.reason_or_unknown(),
                    "payment rejected"
                );
            }
            HttpResponse::Ok().json(verdict)
        }
        Err(e) => {
            metrics::VERIFY_REQUESTS.with_label_values(&["error"]).inc();
            metrics::VERIFY_LATENCY
                .with_label_values(&["error"])
                .observe(start.elapsed().as_secs_f64());
            tracing::error!(error = %e, "verification failed");
            HttpResponse::InternalServerError()
                .json(PaymentVerifyResult::invalid("verification could not be completed"))
        }
    }
}

pub async fn health<S: SchemeFacilitator + 'static>(
    state: web::Data<AppState<S>>,
) -> HttpResponse {
    match state.facilitator.health().await {
        Ok(status) if status.is_ok() => HttpResponse::Ok().json(status),
        Ok(status) => HttpResponse::ServiceUnavailable().json(status),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "degraded",
                "service": "fhe-x402-facilitator",
                "error": e.to_string(),
            }))
        }
    }
}

pub async fn supported<S: SchemeFacilitator + 'static>(
    state: web::Data<AppState<S>>,
) -> HttpResponse {
    HttpResponse::Ok().json(&state.supported)
}

pub async fn metrics_endpoint<S: SchemeFacilitator + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<S>>,
) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            let header = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok());
            if !bearer_matches(header, token) {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None => {
            // No token configured: metrics are protected unless explicitly public.
            if !state.public_metrics {
                return HttpResponse::Forbidden().json(serde_json::json!({
                    "error": "forbidden",
                    "message": "Set METRICS_TOKEN or X402_PUBLIC_METRICS=true to access /metrics"
                }));
            }
        }
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}
