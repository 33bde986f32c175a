use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::models::{
    BookAgentRequest, Booking, BookingStatus, CompleteBookingRequest, PaymentState, PriceQuote,
    ServiceTier, SlaPerformance, SlaSnapshot,
};
use crate::services::{booking::resolve_price, PAYMENT_HEADER};
use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BookAgentResponse {
    success: bool,
    booking_id: String,
    agent: String,
    tier: ServiceTier,
    capability: String,
    pricing: PriceQuote,
    sla: SlaSnapshot,
    #[serde(rename = "expiryTime", with = "chrono::serde::ts_milliseconds")]
    expiry_time: DateTime<Utc>,
    request_data: serde_json::Value,
    status: BookingStatus,
    payment_state: PaymentState,
}

impl From<Booking> for BookAgentResponse {
    fn from(booking: Booking) -> Self {
        Self {
            success: true,
            booking_id: booking.booking_id,
            agent: booking.agent_id,
            tier: booking.tier,
            capability: booking.capability,
            pricing: booking.pricing,
            sla: booking.sla,
            expiry_time: booking.expires_at,
            request_data: booking.request_data,
            status: booking.status,
            payment_state: booking.payment_state,
        }
    }
}

#[derive(Serialize)]
struct BookingStatusResponse {
    success: bool,
    booking: Booking,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentSummary {
    id: String,
    reputation_score: u8,
    total_jobs: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteBookingResponse {
    success: bool,
    booking: Booking,
    agent: AgentSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    sla_report: Option<SlaPerformance>,
}

/// POST /agents/{agentId}/book
///
/// x402-gated slot reservation. Without a payment header the caller gets a
/// 402 challenge quoting the capability/tier price on every supported chain;
/// with one, the proof is verified before any booking logic runs.
pub async fn book_agent(
    state: web::Data<AppState>,
    path: web::Path<String>,
    http_request: HttpRequest,
    body: web::Json<BookAgentRequest>,
) -> Result<HttpResponse, AppError> {
    let agent_id = path.into_inner();
    let request = body.into_inner();

    let profile = state
        .store
        .get_by_id(&agent_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Agent not found: {agent_id}")))?;

    let quote = resolve_price(&profile, &request.capability, request.tier);

    match http_request.headers().get(PAYMENT_HEADER) {
        None => {
            let description = format!(
                "{} at the {} tier from agent {}",
                request.capability, request.tier, agent_id
            );
            return Err(AppError::PaymentRequired(
                state.payments.challenge(&quote.base_fee, &description),
            ));
        }
        Some(value) => {
            let header_value = value.to_str().map_err(|_| AppError::Verification {
                message: "Payment header is not valid UTF-8".to_string(),
                hint: Some("Payment proof failed the header check".to_string()),
            })?;
            state.payments.verify(header_value, &quote.base_fee)?;
        }
    }

    let booking = state.bookings.book(&agent_id, request).await?;
    Ok(HttpResponse::Created().json(BookAgentResponse::from(booking)))
}

/// GET /agents/{agentId}/booking/{bookingId}
pub async fn get_booking(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let (agent_id, booking_id) = path.into_inner();
    let booking = state.bookings.get_booking(&agent_id, &booking_id).await?;
    Ok(HttpResponse::Ok().json(BookingStatusResponse {
        success: true,
        booking,
    }))
}

/// POST /agents/{agentId}/booking/{bookingId}/complete
///
/// Out-of-band completion report: reputation feedback, slot release,
/// settlement bookkeeping and an SLA performance comparison.
pub async fn complete_booking(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<CompleteBookingRequest>,
) -> Result<HttpResponse, AppError> {
    let (agent_id, booking_id) = path.into_inner();
    let (booking, profile, sla_report) = state
        .bookings
        .complete(&agent_id, &booking_id, body.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(CompleteBookingResponse {
        success: true,
        booking,
        agent: AgentSummary {
            id: profile.id,
            reputation_score: profile.reputation_score,
            total_jobs: profile.total_jobs,
        },
        sla_report,
    }))
}

/// Configure booking routes
pub fn configure_booking_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/agents/{agentId}/book", web::post().to(book_agent))
        .route(
            "/agents/{agentId}/booking/{bookingId}",
            web::get().to(get_booking),
        )
        .route(
            "/agents/{agentId}/booking/{bookingId}/complete",
            web::post().to(complete_booking),
        );
}
