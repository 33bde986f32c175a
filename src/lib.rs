//! AgentMesh Registry - Agent Registry & Discovery Service
//!
//! Marketplace registry for autonomous service agents: permissionless
//! registration with multi-chain identity proofs, capability discovery,
//! liveness tracking and pay-per-call slot booking behind an x402
//! challenge/response payment gate.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::AppError;

// Re-export specific items to avoid ambiguous glob re-exports
pub use models::{
    AgentProfile, AgentStatus, AgentType, Booking, BookingStatus, ChainId, PaymentChallenge,
    PaymentProof, PaymentState, PriceQuote, ServiceTier, TierAvailability,
};

pub use services::{
    AgentStore, BookingService, BookingSweepJob, DiscoveryQuery, DiscoveryService,
    LivenessMonitor, LivenessSweepJob, PaymentConfig, PaymentService, PersistenceGateway,
    SweepJobConfig,
};

/// Application state shared across handlers.
///
/// Constructed explicitly at startup and injected into every handler; the
/// store owns its lifecycle (core seeding, optional hydration) rather than
/// relying on import-time side effects.
pub struct AppState {
    pub config: Config,
    pub store: AgentStore,
    pub discovery: DiscoveryService,
    pub liveness: LivenessMonitor,
    pub bookings: BookingService,
    pub payments: PaymentService,
}

impl AppState {
    pub fn new(config: Config, gateway: Arc<dyn PersistenceGateway>) -> Self {
        let store = AgentStore::new(gateway);
        let discovery = DiscoveryService::new(store.clone());
        let liveness = LivenessMonitor::new(store.clone());
        let bookings = BookingService::new(
            store.clone(),
            chrono::Duration::seconds(config.booking_ttl_secs),
        );
        let payments = PaymentService::new(PaymentConfig::from_config(&config));

        Self {
            config,
            store,
            discovery,
            liveness,
            bookings,
            payments,
        }
    }
}
