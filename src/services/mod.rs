pub mod booking;
pub mod chain;
pub mod discovery;
pub mod jobs;
pub mod liveness;
pub mod payment;
pub mod persistence;
pub mod registry;

pub use booking::{
    calculate_sla_performance, default_price_quote, resolve_price, BookingError, BookingService,
};
pub use chain::{
    chain_for_network, verify_for, verify_signature, ChainError, ChainVerifier, EvmVerifier,
    SolanaVerifier, Verification,
};
pub use discovery::{DiscoveryQuery, DiscoveryService};
pub use jobs::{BookingSweepJob, LivenessSweepJob, SweepJobConfig};
pub use liveness::LivenessMonitor;
pub use payment::{PaymentConfig, PaymentError, PaymentService, PAYMENT_HEADER};
pub use persistence::{NullGateway, PersistenceError, PersistenceGateway, PostgresGateway};
pub use registry::{AgentStore, RegistryError};
