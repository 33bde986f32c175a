//! Liveness Monitor
//!
//! Classifies dynamic agents as stale by heartbeat age. Classification only:
//! any deactivation policy belongs to the caller (see the background sweep in
//! `services::jobs`), never to the monitor itself.

use chrono::{Duration, Utc};

use crate::models::AgentType;
use crate::services::registry::AgentStore;

#[derive(Clone)]
pub struct LivenessMonitor {
    store: AgentStore,
}

impl LivenessMonitor {
    pub fn new(store: AgentStore) -> Self {
        Self { store }
    }

    /// Ids of dynamic agents whose last heartbeat is older than the
    /// threshold. Core agents are always-on infrastructure and are never
    /// reported stale regardless of heartbeat age.
    pub async fn find_stale_agents(&self, threshold: Duration) -> Vec<String> {
        let now = Utc::now();
        self.store
            .get_all()
            .await
            .into_iter()
            .filter(|agent| {
                agent.agent_type == AgentType::Dynamic
                    && now.signed_duration_since(agent.last_heartbeat) > threshold
            })
            .map(|agent| agent.id)
            .collect()
    }
}
