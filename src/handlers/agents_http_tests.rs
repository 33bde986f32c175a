//! HTTP Integration Tests for the agent registry routes
//!
//! These tests exercise registration, discovery, heartbeat and availability
//! end-to-end over an in-memory application state; no external services are
//! required.

#[cfg(test)]
mod http_integration_tests {
    use std::sync::Arc;

    use actix_web::{test, web, App};

    use crate::config::Config;
    use crate::handlers::{configure_agent_routes, configure_booking_routes};
    use crate::services::chain::test_keys::*;
    use crate::services::persistence::NullGateway;
    use crate::AppState;

    fn test_state() -> web::Data<AppState> {
        web::Data::new(AppState::new(Config::default(), Arc::new(NullGateway)))
    }

    macro_rules! init_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state.clone())
                    .configure(configure_agent_routes)
                    .configure(configure_booking_routes),
            )
            .await
        };
    }

    fn register_body(id: &str, signer: &str, chain: &str) -> serde_json::Value {
        serde_json::json!({
            "profile": {
                "id": id,
                "name": format!("Agent {id}"),
                "endpoint": format!("https://{id}.example/api"),
                "capabilities": ["nutrition_planning"],
                "signer": signer,
                "chain": chain,
                "serviceAvailability": {
                    "basic": { "slots": 4, "responseSLA": 20000 },
                    "pro": { "slots": 2, "responseSLA": 8000 }
                }
            }
        })
    }

    #[actix_web::test]
    async fn test_register_unsigned_returns_created_unverified() {
        let state = test_state();
        let app = init_app!(state);
        let (_, address) = evm_keypair();

        let req = test::TestRequest::post()
            .uri("/agents/register")
            .set_json(register_body("dev-agent", &address, "evm"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["agent"]["type"], "dynamic");
        assert_eq!(body["agent"]["status"], "active");
        assert_eq!(body["agent"]["reputationScore"], 50);
        assert!(body["agent"]["verifiedAt"].is_null());
    }

    #[actix_web::test]
    async fn test_register_with_proof_sets_verified_at() {
        let state = test_state();
        let app = init_app!(state);
        let (signing_key, address) = evm_keypair();

        let message = "register agent proven-agent on agentmesh";
        let mut body = register_body("proven-agent", &address, "evm");
        body["message"] = serde_json::json!(message);
        body["signature"] = serde_json::json!(evm_sign(&signing_key, message));

        let req = test::TestRequest::post()
            .uri("/agents/register")
            .set_json(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["agent"]["verifiedAt"].is_i64());
    }

    #[actix_web::test]
    async fn test_register_with_invalid_proof_rejected_with_hint() {
        let state = test_state();
        let app = init_app!(state);
        let (_, public_key) = solana_keypair();

        let mut body = register_body("forged-agent", &public_key, "solana");
        body["message"] = serde_json::json!("register agent forged-agent");
        body["signature"] = serde_json::json!(bs58::encode([0u8; 64]).into_string());

        let req = test::TestRequest::post()
            .uri("/agents/register")
            .set_json(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("Identity proof"));
        assert!(body["hint"].is_string());

        // The failed registration left no record behind
        let req = test::TestRequest::get()
            .uri("/agents?capability=nutrition_planning")
            .to_request();
        let resp = test::call_service(&app, req).await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        let ids: Vec<&str> = body["agents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["id"].as_str().unwrap())
            .collect();
        assert!(!ids.contains(&"forged-agent"));
    }

    #[actix_web::test]
    async fn test_register_missing_endpoint_rejected() {
        let state = test_state();
        let app = init_app!(state);

        let req = test::TestRequest::post()
            .uri("/agents/register")
            .set_json(serde_json::json!({"profile": {"id": "incomplete"}}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("endpoint"));
    }

    #[actix_web::test]
    async fn test_list_agents_serves_core_set_and_echoes_filters() {
        let state = test_state();
        let app = init_app!(state);

        let req = test::TestRequest::get()
            .uri("/agents?capability=nutrition_planning&minReputation=80")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], body["agents"].as_array().unwrap().len());
        assert_eq!(body["filters"]["capability"], "nutrition_planning");
        assert_eq!(body["filters"]["minReputation"], 80);
        assert!(body["timestamp"].is_i64());

        // The pre-seeded core agent backs the capability with no registrations
        let ids: Vec<&str> = body["agents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["id"].as_str().unwrap())
            .collect();
        assert!(ids.contains(&"nutrition-core"));
    }

    #[actix_web::test]
    async fn test_list_agents_sorted_by_reputation() {
        let state = test_state();
        let app = init_app!(state);

        let req = test::TestRequest::get().uri("/agents").to_request();
        let resp = test::call_service(&app, req).await;
        let body: serde_json::Value = test::read_body_json(resp).await;

        let scores: Vec<i64> = body["agents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["reputationScore"].as_i64().unwrap())
            .collect();
        let mut sorted = scores.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(scores, sorted);
    }

    #[actix_web::test]
    async fn test_heartbeat_known_and_unknown_agent() {
        let state = test_state();
        let app = init_app!(state);
        let (_, address) = evm_keypair();

        let req = test::TestRequest::post()
            .uri("/agents/register")
            .set_json(register_body("hb-agent", &address, "evm"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);

        let req = test::TestRequest::post()
            .uri("/agents/heartbeat")
            .set_json(serde_json::json!({"id": "hb-agent"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["type"], "dynamic");

        let req = test::TestRequest::post()
            .uri("/agents/heartbeat")
            .set_json(serde_json::json!({"id": "ghost"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("ghost"));
    }

    #[actix_web::test]
    async fn test_availability_update_and_missing_tier() {
        let state = test_state();
        let app = init_app!(state);
        let (_, address) = evm_keypair();

        let req = test::TestRequest::post()
            .uri("/agents/register")
            .set_json(register_body("avail-agent", &address, "evm"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);

        let req = test::TestRequest::post()
            .uri("/agents/avail-agent/availability")
            .set_json(serde_json::json!({"tier": "basic", "slotsFilled": 2}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(
            body["agent"]["serviceAvailability"]["basic"]["slotsFilled"],
            2
        );

        // Premium was never configured and the update cannot construct it
        let req = test::TestRequest::post()
            .uri("/agents/avail-agent/availability")
            .set_json(serde_json::json!({"tier": "premium", "slotsFilled": 1}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        // Unknown agent
        let req = test::TestRequest::post()
            .uri("/agents/ghost/availability")
            .set_json(serde_json::json!({"tier": "basic", "slotsFilled": 1}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }
}
