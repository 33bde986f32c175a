use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::error::AppError;
use crate::models::{
    AgentProfile, AgentType, AvailabilityUpdateRequest, HeartbeatRequest, RegisterAgentRequest,
};
use crate::services::DiscoveryQuery;
use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListAgentsResponse {
    success: bool,
    count: usize,
    agents: Vec<AgentProfile>,
    filters: DiscoveryQuery,
    timestamp: i64,
}

#[derive(Serialize)]
struct AgentResponse {
    success: bool,
    agent: AgentProfile,
}

#[derive(Serialize)]
struct HeartbeatResponse {
    success: bool,
    #[serde(rename = "type")]
    agent_type: AgentType,
}

/// GET /agents?capability=&tier=&minReputation=&maxResponseTime=
///
/// Discover agents matching the query, ranked by reputation.
pub async fn list_agents(
    state: web::Data<AppState>,
    query: web::Query<DiscoveryQuery>,
) -> Result<HttpResponse, AppError> {
    let filters = query.into_inner();
    let agents = state.discovery.discover(&filters).await;

    Ok(HttpResponse::Ok().json(ListAgentsResponse {
        success: true,
        count: agents.len(),
        agents,
        filters,
        timestamp: chrono::Utc::now().timestamp_millis(),
    }))
}

/// POST /agents/register
///
/// Permissionless registration. A supplied identity proof must verify;
/// registrations without one stay distinguishable as unverified.
pub async fn register_agent(
    state: web::Data<AppState>,
    body: web::Json<RegisterAgentRequest>,
) -> Result<HttpResponse, AppError> {
    let agent = state.store.register(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(AgentResponse {
        success: true,
        agent,
    }))
}

/// POST /agents/heartbeat
pub async fn heartbeat(
    state: web::Data<AppState>,
    body: web::Json<HeartbeatRequest>,
) -> Result<HttpResponse, AppError> {
    let agent = state.store.update_heartbeat(&body.id).await?;
    Ok(HttpResponse::Ok().json(HeartbeatResponse {
        success: true,
        agent_type: agent.agent_type,
    }))
}

/// POST /agents/{agentId}/availability
pub async fn update_availability(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<AvailabilityUpdateRequest>,
) -> Result<HttpResponse, AppError> {
    let agent_id = path.into_inner();
    let agent = state
        .store
        .update_availability(&agent_id, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(AgentResponse {
        success: true,
        agent,
    }))
}

/// Configure agent registry routes
pub fn configure_agent_routes(cfg: &mut web::ServiceConfig) {
    // Static paths before parameterized ones so /agents/register never
    // resolves as an {agentId}
    cfg.route("/agents", web::get().to(list_agents))
        .route("/agents/register", web::post().to(register_agent))
        .route("/agents/heartbeat", web::post().to(heartbeat))
        .route(
            "/agents/{agentId}/availability",
            web::post().to(update_availability),
        );
}
