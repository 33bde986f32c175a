//! End-to-End Workflow Tests
//!
//! Exercises the full marketplace flow over HTTP against in-memory state:
//! register with an identity proof, discover by capability and tier, hit the
//! x402 gate, book with a payment proof, exhaust capacity, and report
//! completion.

use std::sync::Arc;

use actix_web::{test, web, App};
use chrono::Utc;

use agentmesh_registry::handlers::{configure_agent_routes, configure_booking_routes};
use agentmesh_registry::services::chain::{evm_address, personal_message_hash};
use agentmesh_registry::services::{NullGateway, PAYMENT_HEADER};
use agentmesh_registry::{AppState, Config, PaymentProof};

use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;

/// Generate an EVM keypair, returning the signing key and 0x address
fn evm_keypair() -> (SigningKey, String) {
    let signing_key = SigningKey::random(&mut OsRng);
    let address = evm_address(signing_key.verifying_key());
    (signing_key, address)
}

/// 65-byte `r||s||v` personal-message signature, hex encoded
fn evm_sign(signing_key: &SigningKey, message: &str) -> String {
    let prehash = personal_message_hash(message);
    let (sig, recovery_id) = signing_key
        .sign_prehash_recoverable(&prehash)
        .expect("sign prehash");
    let mut bytes = sig.to_bytes().to_vec();
    bytes.push(27 + recovery_id.to_byte());
    format!("0x{}", hex::encode(bytes))
}

fn payment_header(amount: &str) -> String {
    let (signing_key, address) = evm_keypair();
    let nonce = uuid::Uuid::new_v4().to_string();
    let message = format!("pay {amount} USDC for agentmesh booking nonce {nonce}");
    let signature = evm_sign(&signing_key, &message);

    PaymentProof {
        scheme: "exact".to_string(),
        network: "base-sepolia".to_string(),
        asset: "USDC".to_string(),
        amount: amount.to_string(),
        pay_to: Config::default().evm_pay_to,
        signer: address,
        timestamp: Utc::now().timestamp_millis(),
        nonce,
        signature,
        message,
    }
    .to_header()
}

#[actix_web::test]
async fn test_register_discover_book_complete_workflow() {
    let state = web::Data::new(AppState::new(Config::default(), Arc::new(NullGateway)));
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .configure(configure_agent_routes)
            .configure(configure_booking_routes),
    )
    .await;

    // --- Register agent A with a signed identity proof -----------------
    let (signing_key, address) = evm_keypair();
    let message = "register agent macro-chef at https://macro-chef.example/api";
    let register_body = serde_json::json!({
        "profile": {
            "id": "macro-chef",
            "name": "Macro Chef",
            "endpoint": "https://macro-chef.example/api",
            "capabilities": ["nutrition_planning"],
            "signer": address,
            "chain": "evm",
            "tieredPricing": {
                "nutrition_planning": {
                    "pro": { "baseFee": "0.03", "asset": "USDC", "network": "base-sepolia" }
                }
            },
            "serviceAvailability": {
                "basic": { "slots": 4, "responseSLA": 30000 },
                "pro": { "slots": 1, "responseSLA": 9000, "uptime": 99.5 }
            }
        },
        "message": message,
        "signature": evm_sign(&signing_key, message)
    });

    let req = test::TestRequest::post()
        .uri("/agents/register")
        .set_json(register_body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let registered: serde_json::Value = test::read_body_json(resp).await;
    assert!(registered["agent"]["verifiedAt"].is_i64());
    assert_eq!(registered["agent"]["type"], "dynamic");

    // --- Discover by capability and tier -------------------------------
    let req = test::TestRequest::get()
        .uri("/agents?capability=nutrition_planning&tier=pro")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let discovered: serde_json::Value = test::read_body_json(resp).await;
    let ids: Vec<&str> = discovered["agents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"macro-chef"), "agent A must appear: {ids:?}");

    // --- First booking attempt hits the x402 gate ----------------------
    let book_body = serde_json::json!({
        "tier": "pro",
        "capability": "nutrition_planning",
        "requestData": { "calories": 2400 }
    });
    let req = test::TestRequest::post()
        .uri("/agents/macro-chef/book")
        .set_json(book_body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 402);
    let challenge: serde_json::Value = test::read_body_json(resp).await;
    assert!(challenge["accepts"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["amount"] == "0.03"));

    // --- Booking with a payment proof returns the configured quote -----
    let req = test::TestRequest::post()
        .uri("/agents/macro-chef/book")
        .insert_header((PAYMENT_HEADER, payment_header("0.03")))
        .set_json(book_body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let booking: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(booking["pricing"]["baseFee"], "0.03");
    assert_eq!(booking["sla"]["responseSLA"], 9000);
    let booking_id = booking["bookingId"].as_str().unwrap().to_string();

    // --- The pro tier had one slot: the next attempt conflicts ---------
    let req = test::TestRequest::post()
        .uri("/agents/macro-chef/book")
        .insert_header((PAYMENT_HEADER, payment_header("0.03")))
        .set_json(book_body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
    let conflict: serde_json::Value = test::read_body_json(resp).await;
    assert!(conflict["nextAvailable"].is_i64());

    // --- Completion report feeds reputation and frees the slot ---------
    let req = test::TestRequest::post()
        .uri(&format!("/agents/macro-chef/booking/{booking_id}/complete"))
        .set_json(serde_json::json!({
            "success": true,
            "actualResponseTime": 7100,
            "transactionHash": "0x51a7e5"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let completed: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(completed["booking"]["paymentState"], "settled");
    assert_eq!(completed["agent"]["reputationScore"], 51);
    assert_eq!(completed["slaReport"]["withinSLA"], true);

    // The released slot books again
    let req = test::TestRequest::post()
        .uri("/agents/macro-chef/book")
        .insert_header((PAYMENT_HEADER, payment_header("0.03")))
        .set_json(serde_json::json!({
            "tier": "pro",
            "capability": "nutrition_planning"
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
}

#[actix_web::test]
async fn test_offline_registry_still_serves_core_agents() {
    // No persistence at all: the core set answers discovery regardless
    let state = web::Data::new(AppState::new(Config::default(), Arc::new(NullGateway)));
    state.store.hydrate().await;

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .configure(configure_agent_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/agents?capability=workout_planning")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["count"].as_u64().unwrap() >= 1);
    assert!(body["agents"]
        .as_array()
        .unwrap()
        .iter()
        .any(|a| a["type"] == "core"));
}

#[actix_web::test]
async fn test_stale_classification_spares_core_agents() {
    let state = AppState::new(Config::default(), Arc::new(NullGateway));

    // With a zero threshold every dynamic agent is stale, yet the core set
    // never appears.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let stale = state
        .liveness
        .find_stale_agents(chrono::Duration::zero())
        .await;
    assert!(stale.is_empty());
}
