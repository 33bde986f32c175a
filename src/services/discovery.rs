//! Discovery Engine
//!
//! Read-only query layer over the agent store: capability, tier, reputation
//! and latency filtering with deterministic ranking. Core agents participate
//! like any other and act as the fallback result set, so a capability served
//! by a core agent never yields an empty result.

use serde::{Deserialize, Serialize};

use crate::models::{AgentProfile, AgentStatus, AgentType, ServiceTier};
use crate::services::registry::AgentStore;

/// Discovery filters; each is optional and independently applicable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<ServiceTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_reputation: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_time: Option<u64>,
}

/// Read-only discovery over a registry snapshot
#[derive(Clone)]
pub struct DiscoveryService {
    store: AgentStore,
}

impl DiscoveryService {
    pub fn new(store: AgentStore) -> Self {
        Self { store }
    }

    /// Filter and rank agents for a query.
    ///
    /// Ordering: reputation descending, ties broken by ascending SLA of the
    /// matched tier, then by id for determinism.
    pub async fn discover(&self, query: &DiscoveryQuery) -> Vec<AgentProfile> {
        let snapshot = self.store.get_all().await;

        let mut matches: Vec<AgentProfile> = snapshot
            .iter()
            .filter(|agent| Self::matches(agent, query))
            .cloned()
            .collect();

        // Core agents back every capability they offer: when the secondary
        // filters exclude everyone, the core set for the capability is the
        // answer rather than an empty result.
        if matches.is_empty() {
            if let Some(capability) = &query.capability {
                matches = snapshot
                    .iter()
                    .filter(|agent| {
                        agent.agent_type == AgentType::Core
                            && agent.offers_capability(capability)
                    })
                    .cloned()
                    .collect();
            }
        }

        let tier = query.tier;
        matches.sort_by(|a, b| {
            b.reputation_score
                .cmp(&a.reputation_score)
                .then_with(|| {
                    let a_sla = a.sla_for(tier).unwrap_or(u64::MAX);
                    let b_sla = b.sla_for(tier).unwrap_or(u64::MAX);
                    a_sla.cmp(&b_sla)
                })
                .then_with(|| a.id.cmp(&b.id))
        });
        matches
    }

    fn matches(agent: &AgentProfile, query: &DiscoveryQuery) -> bool {
        // Stale dynamic agents are deactivated by the liveness sweep and
        // drop out of discovery until they heartbeat again.
        if agent.status == AgentStatus::Inactive {
            return false;
        }

        if let Some(capability) = &query.capability {
            if !agent.offers_capability(capability) {
                return false;
            }
        }

        if let Some(min_reputation) = query.min_reputation {
            if agent.reputation_score < min_reputation {
                return false;
            }
        }

        if let Some(tier) = query.tier {
            match agent.service_availability.get(&tier) {
                Some(block) if block.slots_filled < block.slots => {}
                _ => return false,
            }
        }

        if let Some(max_response_time) = query.max_response_time {
            match agent.sla_for(query.tier) {
                Some(sla) if sla <= max_response_time => {}
                _ => return false,
            }
        }

        true
    }
}
