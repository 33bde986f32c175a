use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::agent::{PriceQuote, ServiceTier};
use crate::models::payment::PaymentState;

/// Booking lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Completed,
    Expired,
}

/// SLA promise snapshotted into a booking at reservation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaSnapshot {
    #[serde(rename = "responseSLA")]
    pub response_sla_ms: u64,
    pub uptime: f64,
}

/// Ephemeral slot reservation for one agent, tier and capability.
///
/// Pricing and SLA are snapshots: later changes to the agent's profile do not
/// alter an existing quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub booking_id: String,
    pub agent_id: String,
    pub tier: ServiceTier,
    pub capability: String,
    pub pricing: PriceQuote,
    pub sla: SlaSnapshot,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "expiryTime", with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    /// Opaque caller payload, not validated by the registry
    pub request_data: serde_json::Value,
    pub status: BookingStatus,
    pub payment_state: PaymentState,
    /// On-chain transaction hash reported out-of-band after settlement
    pub settlement_tx: Option<String>,
}

/// Request payload for POST /agents/{id}/book
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAgentRequest {
    pub tier: ServiceTier,
    pub capability: String,
    #[serde(default)]
    pub request_data: serde_json::Value,
}

/// Request payload for POST /agents/{id}/booking/{bookingId}/complete
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteBookingRequest {
    pub success: bool,
    /// Observed wall-clock response time in milliseconds
    pub actual_response_time: Option<u64>,
    pub transaction_hash: Option<String>,
}

/// Post-hoc SLA comparison for a completed booking
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaPerformance {
    pub tier: ServiceTier,
    pub expected_ms: u64,
    pub actual_ms: u64,
    #[serde(rename = "withinSLA")]
    pub within_sla: bool,
    pub message: String,
}
