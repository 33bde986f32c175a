//! Background Jobs
//!
//! Periodic sweeps over in-memory state: expired-booking reclamation and
//! stale-agent deactivation. Each job runs until its shutdown sender flips.

use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::models::AgentStatus;
use crate::services::booking::BookingService;
use crate::services::liveness::LivenessMonitor;
use crate::services::registry::AgentStore;

/// Configuration shared by the sweep jobs
#[derive(Debug, Clone)]
pub struct SweepJobConfig {
    /// Interval between sweep runs (default: 1 minute)
    pub interval: Duration,
    /// Whether the job is enabled
    pub enabled: bool,
}

impl Default for SweepJobConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            enabled: true,
        }
    }
}

/// Reclaims slots held by expired bookings.
///
/// Expiry is also applied lazily on booking attempts and status reads; the
/// active sweep bounds how long a leaked slot can linger on idle agents.
pub struct BookingSweepJob {
    bookings: BookingService,
    config: SweepJobConfig,
}

impl BookingSweepJob {
    pub fn new(bookings: BookingService, config: SweepJobConfig) -> Self {
        Self { bookings, config }
    }

    /// Start the sweep; returns a shutdown sender that stops the job.
    pub fn start(self) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        if !self.config.enabled {
            info!("Booking expiry sweep is disabled");
            return shutdown_tx;
        }

        let bookings = self.bookings;
        let interval = self.config.interval;

        tokio::spawn(async move {
            info!("Starting booking expiry sweep with interval {:?}", interval);

            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        bookings.sweep_expired().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Booking expiry sweep shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

/// Deactivates dynamic agents whose heartbeat has gone stale.
///
/// The liveness monitor only classifies; the deactivation policy lives here.
/// A subsequent heartbeat reactivates the agent.
pub struct LivenessSweepJob {
    store: AgentStore,
    monitor: LivenessMonitor,
    threshold: chrono::Duration,
    config: SweepJobConfig,
}

impl LivenessSweepJob {
    pub fn new(
        store: AgentStore,
        monitor: LivenessMonitor,
        threshold: chrono::Duration,
        config: SweepJobConfig,
    ) -> Self {
        Self {
            store,
            monitor,
            threshold,
            config,
        }
    }

    /// Start the sweep; returns a shutdown sender that stops the job.
    pub fn start(self) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        if !self.config.enabled {
            info!("Liveness sweep is disabled");
            return shutdown_tx;
        }

        let store = self.store;
        let monitor = self.monitor;
        let threshold = self.threshold;
        let interval = self.config.interval;

        tokio::spawn(async move {
            info!("Starting liveness sweep with interval {:?}", interval);

            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.tick().await;

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let stale = monitor.find_stale_agents(threshold).await;
                        for id in stale {
                            info!(agent_id = %id, "Deactivating stale agent");
                            let _ = store.set_status(&id, AgentStatus::Inactive).await;
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Liveness sweep shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}
