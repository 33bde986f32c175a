//! Booking & Tier Manager
//!
//! Slot reservation, pricing resolution and SLA bookkeeping for paid service
//! calls. Reservations go through the store's atomic reserve path; expired
//! bookings release their slot both lazily (on the next booking attempt or
//! status read) and actively via the background sweep job.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::models::{
    AgentProfile, BookAgentRequest, Booking, BookingStatus, CompleteBookingRequest, PaymentState,
    PriceQuote, ServiceTier, SlaPerformance, SlaSnapshot,
};
use crate::services::registry::{AgentStore, RegistryError};

/// Fallback when neither tiered nor flat pricing covers a capability
pub fn default_price_quote() -> PriceQuote {
    PriceQuote {
        base_fee: "0.01".to_string(),
        asset: "USDC".to_string(),
        network: "base-sepolia".to_string(),
    }
}

/// Errors that can occur while booking
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent {agent_id} does not offer the {tier} tier")]
    TierNotOffered {
        agent_id: String,
        tier: ServiceTier,
    },

    #[error("No {tier} slots available for agent {agent_id}")]
    NoSlotsAvailable {
        agent_id: String,
        tier: ServiceTier,
        next_available: Option<DateTime<Utc>>,
    },

    #[error("Agent {agent_id} does not offer capability {capability}")]
    CapabilityNotOffered {
        agent_id: String,
        capability: String,
    },

    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Booking {0} has expired")]
    BookingExpired(String),

    #[error("Booking {0} is already completed")]
    AlreadyCompleted(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Booking manager over the shared agent store
#[derive(Clone)]
pub struct BookingService {
    store: AgentStore,
    bookings: Arc<RwLock<HashMap<String, Booking>>>,
    ttl: Duration,
}

impl BookingService {
    pub fn new(store: AgentStore, ttl: Duration) -> Self {
        Self {
            store,
            bookings: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Reserve a slot and produce a priced, SLA-stamped booking.
    ///
    /// Preconditions are checked in order, each with its own failure mode:
    /// unknown agent, tier not offered, capacity exhausted (with a
    /// `next_available` hint), capability not offered. A capability failure
    /// after the reservation releases the slot again, leaving the store in
    /// its pre-call state.
    pub async fn book(
        &self,
        agent_id: &str,
        request: BookAgentRequest,
    ) -> Result<Booking, BookingError> {
        let profile = self
            .store
            .get_by_id(agent_id)
            .await
            .ok_or_else(|| BookingError::AgentNotFound(agent_id.to_string()))?;

        if !profile.service_availability.contains_key(&request.tier) {
            return Err(BookingError::TierNotOffered {
                agent_id: agent_id.to_string(),
                tier: request.tier,
            });
        }

        // Reclaim any expired reservations before judging capacity
        self.sweep_expired().await;

        let tier_block = match self.store.reserve_slot(agent_id, request.tier).await {
            Ok(block) => block,
            Err(RegistryError::CapacityExhausted {
                agent_id,
                tier,
                next_available,
            }) => {
                let next_available = match next_available {
                    Some(at) => Some(at),
                    None => self.earliest_expiry(&agent_id, tier).await,
                };
                return Err(BookingError::NoSlotsAvailable {
                    agent_id,
                    tier,
                    next_available,
                });
            }
            Err(RegistryError::AgentNotFound(id)) => {
                return Err(BookingError::AgentNotFound(id))
            }
            Err(RegistryError::TierNotConfigured { agent_id, tier }) => {
                return Err(BookingError::TierNotOffered { agent_id, tier })
            }
            Err(e) => return Err(BookingError::Registry(e)),
        };

        if !profile.offers_capability(&request.capability) {
            self.store.release_slot(agent_id, request.tier).await;
            return Err(BookingError::CapabilityNotOffered {
                agent_id: agent_id.to_string(),
                capability: request.capability,
            });
        }

        let pricing = resolve_price(&profile, &request.capability, request.tier);
        let now = Utc::now();

        let booking = {
            let mut bookings = self.bookings.write().await;
            // Booking ids are time + random suffix; uniqueness is probabilistic
            // so collisions are checked rather than assumed.
            let booking_id = loop {
                let candidate = new_booking_id(now);
                if !bookings.contains_key(&candidate) {
                    break candidate;
                }
            };

            let booking = Booking {
                booking_id: booking_id.clone(),
                agent_id: agent_id.to_string(),
                tier: request.tier,
                capability: request.capability,
                pricing,
                sla: SlaSnapshot {
                    response_sla_ms: tier_block.response_sla_ms,
                    uptime: tier_block.uptime_pct,
                },
                created_at: now,
                expires_at: now + self.ttl,
                request_data: request.request_data,
                status: BookingStatus::Pending,
                // Bookings are only created once the payment proof for them
                // has been verified.
                payment_state: PaymentState::Verified,
                settlement_tx: None,
            };
            bookings.insert(booking_id, booking.clone());
            booking
        };

        info!(
            agent_id = %booking.agent_id,
            booking_id = %booking.booking_id,
            tier = %booking.tier,
            "Booked slot"
        );
        Ok(booking)
    }

    /// Current state of one booking; expiry is applied lazily on read
    pub async fn get_booking(
        &self,
        agent_id: &str,
        booking_id: &str,
    ) -> Result<Booking, BookingError> {
        let (booking, newly_expired) = {
            let mut bookings = self.bookings.write().await;
            let booking = bookings
                .get_mut(booking_id)
                .filter(|b| b.agent_id == agent_id)
                .ok_or_else(|| BookingError::BookingNotFound(booking_id.to_string()))?;

            if booking.status == BookingStatus::Pending && Utc::now() > booking.expires_at {
                booking.status = BookingStatus::Expired;
                (booking.clone(), true)
            } else {
                (booking.clone(), false)
            }
        };

        // Slot release happens outside the bookings lock
        if newly_expired {
            self.store.release_slot(agent_id, booking.tier).await;
        }
        Ok(booking)
    }

    /// Record the outcome of a completed booking: releases the slot, applies
    /// reputation feedback, records the settlement transaction and reports
    /// SLA performance when an observed response time is supplied.
    pub async fn complete(
        &self,
        agent_id: &str,
        booking_id: &str,
        request: CompleteBookingRequest,
    ) -> Result<(Booking, AgentProfile, Option<SlaPerformance>), BookingError> {
        let booking = {
            let mut bookings = self.bookings.write().await;
            let booking = bookings
                .get_mut(booking_id)
                .filter(|b| b.agent_id == agent_id)
                .ok_or_else(|| BookingError::BookingNotFound(booking_id.to_string()))?;

            match booking.status {
                BookingStatus::Expired => {
                    return Err(BookingError::BookingExpired(booking_id.to_string()))
                }
                BookingStatus::Completed => {
                    return Err(BookingError::AlreadyCompleted(booking_id.to_string()))
                }
                BookingStatus::Pending => {}
            }

            booking.status = BookingStatus::Completed;
            booking.settlement_tx = request.transaction_hash.clone();
            if booking.settlement_tx.is_some() {
                booking.payment_state = PaymentState::Settled;
            }
            booking.clone()
        };

        self.store.release_slot(agent_id, booking.tier).await;
        let profile = self
            .store
            .record_job_outcome(agent_id, request.success)
            .await?;

        let sla_report = request
            .actual_response_time
            .map(|actual| calculate_sla_performance(booking.tier, booking.sla.response_sla_ms, actual));

        Ok((booking, profile, sla_report))
    }

    /// Release slots held by expired pending bookings. Returns the number of
    /// bookings reclaimed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let reclaimed: Vec<(String, ServiceTier)> = {
            let mut bookings = self.bookings.write().await;
            bookings
                .values_mut()
                .filter(|b| b.status == BookingStatus::Pending && now > b.expires_at)
                .map(|b| {
                    b.status = BookingStatus::Expired;
                    (b.agent_id.clone(), b.tier)
                })
                .collect()
        };

        for (agent_id, tier) in &reclaimed {
            self.store.release_slot(agent_id, *tier).await;
        }

        if !reclaimed.is_empty() {
            info!("Reclaimed {} expired booking slot(s)", reclaimed.len());
        }
        reclaimed.len()
    }

    /// Earliest expiry among live bookings for an agent's tier, used as the
    /// `next_available` hint when capacity is exhausted
    async fn earliest_expiry(
        &self,
        agent_id: &str,
        tier: ServiceTier,
    ) -> Option<DateTime<Utc>> {
        let bookings = self.bookings.read().await;
        bookings
            .values()
            .filter(|b| {
                b.agent_id == agent_id && b.tier == tier && b.status == BookingStatus::Pending
            })
            .map(|b| b.expires_at)
            .min()
    }
}

/// Resolve the price for a capability at a tier: tiered pricing first, then
/// the flat capability price scaled by the tier multiplier, then the
/// hard-coded default.
pub fn resolve_price(profile: &AgentProfile, capability: &str, tier: ServiceTier) -> PriceQuote {
    if let Some(quote) = profile
        .tiered_pricing
        .get(capability)
        .and_then(|tiers| tiers.get(&tier))
    {
        return quote.clone();
    }

    let flat = profile
        .pricing
        .get(capability)
        .cloned()
        .unwrap_or_else(default_price_quote);
    apply_multiplier(flat, tier)
}

fn apply_multiplier(quote: PriceQuote, tier: ServiceTier) -> PriceQuote {
    match quote.base_fee.parse::<f64>() {
        Ok(fee) => PriceQuote {
            base_fee: format!("{}", fee * tier.multiplier()),
            ..quote
        },
        // An unparseable advertised fee passes through as quoted
        Err(_) => quote,
    }
}

/// Pure post-hoc comparison of an observed response time against the tier's
/// SLA promise; does not affect booking state.
pub fn calculate_sla_performance(
    tier: ServiceTier,
    expected_ms: u64,
    actual_ms: u64,
) -> SlaPerformance {
    let within_sla = actual_ms <= expected_ms;
    let message = if within_sla {
        format!("Response met the {tier} tier SLA of {expected_ms}ms")
    } else {
        format!(
            "Response exceeded the {tier} tier SLA of {expected_ms}ms by {}ms",
            actual_ms - expected_ms
        )
    };
    SlaPerformance {
        tier,
        expected_ms,
        actual_ms,
        within_sla,
        message,
    }
}

fn new_booking_id(now: DateTime<Utc>) -> String {
    let suffix: [u8; 6] = rand::thread_rng().gen();
    format!("bk_{}_{}", now.timestamp_millis(), hex::encode(suffix))
}
