use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use x402::security::bearer_matches;
use x402::{PaymentPayload, PaymentRequirement, SchemeFacilitator};

use crate::config::PREMIUM_DATA_PATH;
use crate::metrics;
use crate::middleware::{
    require_payment, requirement_for, verify_payment, PaymentDenied, VerifiedPayment,
};
use crate::state::ServerState;

const PREMIUM_CONTENT: &str = "This is premium data that requires payment to access.";

/// Body of `POST /premium-data`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumDataRequest {
    pub payment_payload: PaymentPayload,
    /// Informational; the server verifies against its own requirement.
    #[serde(default)]
    pub payment_requirements: Option<PaymentRequirement>,
}

/// Register the resource-server endpoints for verifier `S`.
pub fn configure<S: SchemeFacilitator + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource(PREMIUM_DATA_PATH)
            .route(web::get().to(premium_data::<S>))
            .route(web::post().to(premium_data_with_proof::<S>)),
    )
    .service(web::resource("/health").route(web::get().to(health::<S>)))
    .service(web::resource("/metrics").route(web::get().to(metrics_endpoint::<S>)));
}

fn premium_body(message: &str, payment: &VerifiedPayment) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "message": message,
        "data": {
            "content": PREMIUM_CONTENT,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "paymentTxHash": payment.tx_hash,
            "amount": payment.amount,
        }
    })
}

pub async fn premium_data<S: SchemeFacilitator + 'static>(
    req: HttpRequest,
    state: web::Data<ServerState<S>>,
) -> HttpResponse {
    match require_payment(&req, &state).await {
        Ok(payment) => {
            HttpResponse::Ok().json(premium_body("Welcome to premium content!", &payment))
        }
        Err(resp) => resp,
    }
}

pub async fn premium_data_with_proof<S: SchemeFacilitator + 'static>(
    req: HttpRequest,
    state: web::Data<ServerState<S>>,
    body: web::Bytes,
) -> HttpResponse {
    let Some(requirement) = requirement_for(&req, &state.payments) else {
        return HttpResponse::InternalServerError().json(serde_json::json!({
            "success": false,
            "error": "route is not priced",
        }));
    };

    let parsed: PremiumDataRequest = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "success": false,
                "error": format!("invalid request body: {e}"),
            }));
        }
    };

    if let Some(claimed) = &parsed.payment_requirements {
        if claimed.pay_to != requirement.pay_to
            || claimed.asset != requirement.asset
            || claimed.max_amount_required != requirement.max_amount_required
        {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "success": false,
                "error": "payment requirements do not match this resource",
            }));
        }
    }

    match verify_payment(
        &state.verifier,
        &parsed.payment_payload,
        &requirement,
        PREMIUM_DATA_PATH,
    )
    .await
    {
        Ok(payment) => HttpResponse::Ok().json(premium_body(
            "Payment verified! Welcome to premium content.",
            &payment,
        )),
        Err(PaymentDenied::Rejected(reason)) => HttpResponse::BadRequest().json(serde_json::json!({
            "success": false,
            "error": reason,
        })),
        Err(PaymentDenied::Unavailable) => PaymentDenied::unavailable_response(),
    }
}

pub async fn health<S: SchemeFacilitator + 'static>(
    state: web::Data<ServerState<S>>,
) -> HttpResponse {
    match state.verifier.health().await {
        Ok(status) if status.is_ok() => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "fhe-x402-server",
            "facilitator": status.status,
        })),
        Ok(status) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "degraded",
            "service": "fhe-x402-server",
            "facilitator": status.status,
        })),
        Err(e) => {
            tracing::error!(error = %e, "health check: facilitator unreachable");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "degraded",
                "service": "fhe-x402-server",
                "facilitator": "unreachable",
            }))
        }
    }
}

pub async fn metrics_endpoint<S: SchemeFacilitator + 'static>(
    req: HttpRequest,
    state: web::Data<ServerState<S>>,
) -> HttpResponse {
    match &state.metrics_token {
        Some(expected) => {
            let header = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok());
            if !bearer_matches(header, expected) {
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
