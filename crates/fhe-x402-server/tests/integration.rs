use actix_web::{test, web, App};
use alloy::primitives::{Address, B256, U256};

use x402::codec::{build_payload, encode_payload_header};
use x402::mock::{MockFhe, MockTokenGateway};
use x402::{
    parse_challenge, ConfidentialTokenGateway, FheCapability, FheSchemeFacilitator, HealthStatus,
    PaymentPayload, PaymentRequirement, PaymentVerifyResult, ProtocolConfig, SchemeFacilitator,
    X402Error, DEFAULT_TOKEN, PAYMENT_PAYLOAD_HEADER, PAYMENT_TX_HASH_HEADER,
};
use x402_server::config::{PaymentConfig, PaymentConfigBuilder};
use x402_server::routes;
use x402_server::state::ServerState;

const PAYER: Address = Address::repeat_byte(0x01);
const MERCHANT: Address = Address::repeat_byte(0xaa);

type OnChain = FheSchemeFacilitator<MockTokenGateway, MockFhe>;

struct Fixture {
    fhe: MockFhe,
    gateway: MockTokenGateway,
    state: web::Data<ServerState<OnChain>>,
}

fn protocol() -> ProtocolConfig {
    ProtocolConfig::default().with_merchant(MERCHANT)
}

fn fixture() -> Fixture {
    let fhe = MockFhe::new();
    let gateway = MockTokenGateway::new(DEFAULT_TOKEN, PAYER, fhe.clone());
    gateway.mint(PAYER, U256::from(10_000_000u64));
    let verifier = FheSchemeFacilitator::new(gateway.clone(), fhe.clone(), protocol());
    let payments = PaymentConfig::premium_data(protocol()).unwrap();
    Fixture {
        fhe,
        gateway,
        state: web::Data::new(ServerState::new(payments, verifier)),
    }
}

fn issued_requirement() -> PaymentRequirement {
    PaymentConfig::premium_data(protocol())
        .unwrap()
        .get_route("GET", "/premium-data")
        .unwrap()
        .requirement
        .clone()
}

async fn pay(fx: &Fixture, amount: u64) -> PaymentPayload {
    let input = fx.fhe.encrypt(U256::from(amount), DEFAULT_TOKEN).await.unwrap();
    let tx = fx
        .gateway
        .transfer(MERCHANT, input.handle, input.proof)
        .await
        .unwrap();
    let sig = fx
        .fhe
        .create_decryption_signature(PAYER, &[DEFAULT_TOKEN], 1)
        .await
        .unwrap();
    build_payload(&issued_requirement(), tx, sig)
}

#[actix_rt::test]
async fn test_unpaid_request_gets_challenge() {
    let fx = fixture();
    let app = test::init_service(
        App::new()
            .app_data(fx.state.clone())
            .configure(routes::configure::<OnChain>),
    )
    .await;

    let req = test::TestRequest::get().uri("/premium-data").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 402);
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = test::read_body(resp).await;

    let requirement = parse_challenge(402, &body, content_type.as_deref()).unwrap();
    assert_eq!(requirement.scheme, "fhe-transfer");
    assert_eq!(requirement.pay_to, MERCHANT);
    assert_eq!(requirement.asset, DEFAULT_TOKEN);
    assert_eq!(requirement.max_amount_required, "1000000");
    assert!(requirement.resource.ends_with("/premium-data"));
}

#[actix_rt::test]
async fn test_paid_request_returns_premium_content() {
    let fx = fixture();
    let app = test::init_service(
        App::new()
            .app_data(fx.state.clone())
            .configure(routes::configure::<OnChain>),
    )
    .await;

    let payload = pay(&fx, 1_000_000).await;
    let req = test::TestRequest::get()
        .uri("/premium-data")
        .insert_header((PAYMENT_TX_HASH_HEADER, payload.payload.tx_hash.to_string()))
        .insert_header((PAYMENT_PAYLOAD_HEADER, encode_payload_header(&payload).unwrap()))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Welcome to premium content!");
    assert_eq!(
        body["data"]["paymentTxHash"],
        payload.payload.tx_hash.to_string()
    );
    assert_eq!(body["data"]["amount"], "1000000");
    assert!(body["data"]["timestamp"].is_string());
}

#[actix_rt::test]
async fn test_underpayment_is_rechallenged_with_reason() {
    let fx = fixture();
    let app = test::init_service(
        App::new()
            .app_data(fx.state.clone())
            .configure(routes::configure::<OnChain>),
    )
    .await;

    let payload = pay(&fx, 10).await;
    let req = test::TestRequest::get()
        .uri("/premium-data")
        .insert_header((PAYMENT_TX_HASH_HEADER, payload.payload.tx_hash.to_string()))
        .insert_header((PAYMENT_PAYLOAD_HEADER, encode_payload_header(&payload).unwrap()))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 402);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Payment amount below required");
    assert_eq!(body["scheme"], "fhe-transfer");
}

#[actix_rt::test]
async fn test_tx_header_without_payload_is_rejected() {
    let fx = fixture();
    let app = test::init_service(
        App::new()
            .app_data(fx.state.clone())
            .configure(routes::configure::<OnChain>),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/premium-data")
        .insert_header((PAYMENT_TX_HASH_HEADER, B256::repeat_byte(0x11).to_string()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "payment payload required");

    let req = test::TestRequest::get()
        .uri("/premium-data")
        .insert_header((PAYMENT_TX_HASH_HEADER, "0x1234"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_rt::test]
async fn test_payload_for_other_transaction_is_rejected() {
    let fx = fixture();
    let app = test::init_service(
        App::new()
            .app_data(fx.state.clone())
            .configure(routes::configure::<OnChain>),
    )
    .await;

    let payload = pay(&fx, 1_000_000).await;
    let req = test::TestRequest::get()
        .uri("/premium-data")
        .insert_header((PAYMENT_TX_HASH_HEADER, B256::repeat_byte(0x22).to_string()))
        .insert_header((PAYMENT_PAYLOAD_HEADER, encode_payload_header(&payload).unwrap()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "payment proof mismatch");

    let req = test::TestRequest::get()
        .uri("/premium-data")
        .insert_header((PAYMENT_TX_HASH_HEADER, payload.payload.tx_hash.to_string()))
        .insert_header((PAYMENT_PAYLOAD_HEADER, "not base64!"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_rt::test]
async fn test_post_with_proof_in_body() {
    let fx = fixture();
    let app = test::init_service(
        App::new()
            .app_data(fx.state.clone())
            .configure(routes::configure::<OnChain>),
    )
    .await;

    let payload = pay(&fx, 2_000_000).await;
    let req = test::TestRequest::post()
        .uri("/premium-data")
        .set_json(serde_json::json!({
            "paymentPayload": payload,
            "paymentRequirements": issued_requirement(),
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Payment verified! Welcome to premium content.");
    assert_eq!(body["data"]["amount"], "2000000");
}

#[actix_rt::test]
async fn test_post_rejections_are_bad_requests() {
    let fx = fixture();
    let app = test::init_service(
        App::new()
            .app_data(fx.state.clone())
            .configure(routes::configure::<OnChain>),
    )
    .await;

    let mut payload = pay(&fx, 1_000_000).await;
    payload.payload.tx_hash = B256::repeat_byte(0xde);
    let req = test::TestRequest::post()
        .uri("/premium-data")
        .set_json(serde_json::json!({ "paymentPayload": payload }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Transaction not found");

    let mut cheaper = issued_requirement();
    cheaper.max_amount_required = "1".to_string();
    let req = test::TestRequest::post()
        .uri("/premium-data")
        .set_json(serde_json::json!({
            "paymentPayload": payload,
            "paymentRequirements": cheaper,
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "payment requirements do not match this resource");

    let req = test::TestRequest::post()
        .uri("/premium-data")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{}")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_rt::test]
async fn test_unpriced_method_is_not_routed() {
    let fx = fixture();
    let payments = PaymentConfigBuilder::new(protocol())
        .route("GET", "/premium-data", "5", "cheap")
        .unwrap()
        .build();
    let verifier = FheSchemeFacilitator::new(fx.gateway.clone(), fx.fhe.clone(), protocol());
    let state = web::Data::new(ServerState::new(payments, verifier));
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<OnChain>),
    )
    .await;

    let req = test::TestRequest::get().uri("/premium-data").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 402);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["maxAmountRequired"], "5");

    let req = test::TestRequest::post()
        .uri("/premium-data")
        .set_json(serde_json::json!({}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 500);
}

/// Verifier whose facilitator is down.
struct Unreachable;

impl SchemeFacilitator for Unreachable {
    async fn verify(
        &self,
        _payload: &PaymentPayload,
        _requirement: &PaymentRequirement,
    ) -> Result<PaymentVerifyResult, X402Error> {
        Err(X402Error::FacilitatorUnreachable("connection refused".to_string()))
    }

    async fn health(&self) -> Result<HealthStatus, X402Error> {
        Err(X402Error::FacilitatorUnreachable("connection refused".to_string()))
    }
}

#[actix_rt::test]
async fn test_facilitator_outage_is_a_server_error() {
    let fx = fixture();
    let payload = pay(&fx, 1_000_000).await;
    let payments = PaymentConfig::premium_data(protocol()).unwrap();
    let state = web::Data::new(ServerState::new(payments, Unreachable));
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<Unreachable>),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/premium-data")
        .insert_header((PAYMENT_TX_HASH_HEADER, payload.payload.tx_hash.to_string()))
        .insert_header((PAYMENT_PAYLOAD_HEADER, encode_payload_header(&payload).unwrap()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 500);

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 503);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["facilitator"], "unreachable");
}

#[actix_rt::test]
async fn test_health_and_metrics() {
    let fx = fixture();
    let app = test::init_service(
        App::new()
            .app_data(fx.state.clone())
            .configure(routes::configure::<OnChain>),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");

    let req = test::TestRequest::get().uri("/metrics").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let payments = PaymentConfig::premium_data(protocol()).unwrap();
    let state = web::Data::new(
        ServerState::new(payments, Unreachable).with_metrics(Some(b"tok".to_vec()), false),
    );
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<Unreachable>),
    )
    .await;
    let req = test::TestRequest::get().uri("/premium-data").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 402);
    let req = test::TestRequest::get().uri("/metrics").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
    let req = test::TestRequest::get()
        .uri("/metrics")
        .insert_header(("Authorization", "Bearer tok"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    assert!(String::from_utf8_lossy(&body).contains("x402_server"));
}
