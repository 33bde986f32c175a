//! Agent Store
//!
//! Single authoritative in-memory view of all known agents: the pre-seeded
//! core set plus permissionlessly registered dynamic agents, lazily hydrated
//! from the persistence gateway. All writes to one agent are serialized
//! through a per-agent lock; reads proceed concurrently across agents.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::models::{
    tier_ordering_violation, AgentProfile, AgentStatus, AgentType, AvailabilityUpdateRequest,
    ChainId, PriceQuote, RegisterAgentRequest, ServiceTier, TierAvailability, DEFAULT_REPUTATION,
    MAX_REPUTATION, MIN_REPUTATION,
};
use crate::services::chain;
use crate::services::persistence::PersistenceGateway;

/// Reputation adjustment per completed booking, bounded to [0, 100]
const REPUTATION_SUCCESS_INCREASE: u8 = 1;
const REPUTATION_FAILURE_DECREASE: u8 = 2;

/// Errors that can occur during registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent {agent_id} has no {tier} availability configured")]
    TierNotConfigured {
        agent_id: String,
        tier: ServiceTier,
    },

    #[error("Tier SLA ordering violated: {0}")]
    TierOrdering(String),

    #[error("Identity proof rejected: {0}")]
    VerificationFailed(String),

    #[error("Re-registration of {0} requires a fresh identity proof")]
    ReregistrationProofRequired(String),

    #[error("Agent id {0} is already registered to a different signer")]
    SignerMismatch(String),

    #[error("No {tier} slots available for agent {agent_id}")]
    CapacityExhausted {
        agent_id: String,
        tier: ServiceTier,
        next_available: Option<DateTime<Utc>>,
    },
}

struct StoreInner {
    agents: RwLock<HashMap<String, Arc<RwLock<AgentProfile>>>>,
    gateway: Arc<dyn PersistenceGateway>,
}

/// Authoritative agent registry
#[derive(Clone)]
pub struct AgentStore {
    inner: Arc<StoreInner>,
}

impl AgentStore {
    /// Create a store seeded with the core agent set.
    ///
    /// Core agents are present regardless of persistence availability; call
    /// [`AgentStore::hydrate`] afterwards to overlay durable dynamic records.
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        let mut agents = HashMap::new();
        for profile in core_agents() {
            agents.insert(profile.id.clone(), Arc::new(RwLock::new(profile)));
        }

        Self {
            inner: Arc::new(StoreInner {
                agents: RwLock::new(agents),
                gateway,
            }),
        }
    }

    /// Overlay persisted dynamic agents onto the in-memory map.
    ///
    /// Failures degrade to in-memory-only operation; ids already present
    /// (core seeds, agents registered since boot) are left untouched.
    pub async fn hydrate(&self) {
        let persisted = match self.inner.gateway.scan().await {
            Ok(profiles) => profiles,
            Err(e) => {
                warn!("Persistence unavailable, serving in-memory set only: {e}");
                return;
            }
        };

        let mut restored = 0usize;
        let mut agents = self.inner.agents.write().await;
        for profile in persisted {
            if !agents.contains_key(&profile.id) {
                agents.insert(profile.id.clone(), Arc::new(RwLock::new(profile)));
                restored += 1;
            }
        }
        info!("Hydrated {restored} agent(s) from persistence");
    }

    /// Register a new agent or update an existing one.
    ///
    /// A supplied signature must verify — a present-but-invalid proof fails
    /// the whole registration rather than degrading to an unverified record.
    /// Re-registration of an existing id requires a fresh proof from the
    /// stored signer.
    pub async fn register(
        &self,
        request: RegisterAgentRequest,
    ) -> Result<AgentProfile, RegistryError> {
        let supplied = request.profile;

        let id = supplied.id.trim().to_string();
        if id.is_empty() {
            return Err(RegistryError::MissingField("id"));
        }

        let endpoint = supplied
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(RegistryError::MissingField("endpoint"))?
            .to_string();

        let signer = supplied
            .signer
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(RegistryError::MissingField("signer"))?
            .to_string();

        let chain_str = supplied
            .chain
            .as_deref()
            .ok_or(RegistryError::MissingField("chain"))?;
        let chain: ChainId = chain_str
            .parse()
            .map_err(|_| RegistryError::InvalidField {
                field: "chain",
                reason: format!("unsupported chain family: {chain_str}"),
            })?;

        if let Some(availability) = &supplied.service_availability {
            validate_availability(availability)?;
        }

        // Absence of a proof is permitted (dev mode); presence of an invalid
        // one is not.
        let mut verified = false;
        if let Some(signature) = request.signature.as_deref() {
            let message = request
                .message
                .as_deref()
                .ok_or(RegistryError::MissingField("message"))?;
            if !message.contains(&id) {
                return Err(RegistryError::InvalidField {
                    field: "message",
                    reason: "identity proof must reference the agent id".to_string(),
                });
            }
            let outcome = chain::verify_for(chain, &signer, message, signature);
            if !outcome.verified {
                return Err(RegistryError::VerificationFailed(
                    outcome
                        .reason
                        .unwrap_or_else(|| "signature did not verify".to_string()),
                ));
            }
            verified = true;
        }

        let now = Utc::now();

        let existing = {
            let agents = self.inner.agents.read().await;
            agents.get(&id).cloned()
        };

        if let Some(entry) = existing {
            let snapshot = {
                let mut current = entry.write().await;
                if !signer_matches(current.chain, &current.signer, &signer) {
                    return Err(RegistryError::SignerMismatch(id));
                }
                if !verified {
                    return Err(RegistryError::ReregistrationProofRequired(id));
                }

                if let Some(name) = supplied.name {
                    current.name = name;
                }
                current.endpoint = endpoint;
                current.capabilities = supplied.capabilities;
                current.pricing = supplied.pricing;
                current.tiered_pricing = supplied.tiered_pricing;
                if let Some(availability) = supplied.service_availability {
                    current.service_availability = availability;
                }
                current.status = AgentStatus::Active;
                current.verified_at = Some(now);
                current.clone()
            };
            self.persist(&snapshot).await;
            return Ok(snapshot);
        }

        let profile = AgentProfile {
            name: supplied.name.unwrap_or_else(|| id.clone()),
            id: id.clone(),
            endpoint,
            capabilities: supplied.capabilities,
            signer,
            chain,
            agent_type: AgentType::Dynamic,
            status: AgentStatus::Active,
            reputation_score: DEFAULT_REPUTATION,
            pricing: supplied.pricing,
            tiered_pricing: supplied.tiered_pricing,
            service_availability: supplied.service_availability.unwrap_or_default(),
            last_heartbeat: now,
            verified_at: verified.then_some(now),
            registered_at: now,
            total_jobs: 0,
        };

        {
            let mut agents = self.inner.agents.write().await;
            // A racing registration of the same new id resolves to whichever
            // insert lands first; the loser goes through the re-registration
            // path on retry.
            if agents.contains_key(&id) {
                return Err(RegistryError::SignerMismatch(id));
            }
            agents.insert(id, Arc::new(RwLock::new(profile.clone())));
        }

        self.persist(&profile).await;
        Ok(profile)
    }

    /// Snapshot of one agent
    pub async fn get_by_id(&self, id: &str) -> Option<AgentProfile> {
        let entry = self.entry(id).await?;
        let profile = entry.read().await;
        Some(profile.clone())
    }

    /// Snapshot of every agent, in registration order
    pub async fn get_all(&self) -> Vec<AgentProfile> {
        let entries: Vec<Arc<RwLock<AgentProfile>>> = {
            let agents = self.inner.agents.read().await;
            agents.values().cloned().collect()
        };

        let mut profiles = Vec::with_capacity(entries.len());
        for entry in entries {
            profiles.push(entry.read().await.clone());
        }
        profiles.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        profiles
    }

    /// Record a heartbeat. The stored timestamp never moves backwards, so
    /// concurrent heartbeats are commutative.
    pub async fn update_heartbeat(&self, id: &str) -> Result<AgentProfile, RegistryError> {
        let entry = self
            .entry(id)
            .await
            .ok_or_else(|| RegistryError::AgentNotFound(id.to_string()))?;

        let snapshot = {
            let mut profile = entry.write().await;
            let now = Utc::now();
            if now > profile.last_heartbeat {
                profile.last_heartbeat = now;
            }
            profile.status = AgentStatus::Active;
            profile.clone()
        };
        self.persist(&snapshot).await;
        Ok(snapshot)
    }

    /// Merge a partial availability update into one tier block.
    ///
    /// The merge is validated against the capacity and SLA-ordering
    /// invariants before anything is applied, so a rejected update leaves
    /// the profile untouched.
    pub async fn update_availability(
        &self,
        id: &str,
        update: AvailabilityUpdateRequest,
    ) -> Result<AgentProfile, RegistryError> {
        let entry = self
            .entry(id)
            .await
            .ok_or_else(|| RegistryError::AgentNotFound(id.to_string()))?;

        let snapshot = {
            let mut profile = entry.write().await;

            let mut availability = profile.service_availability.clone();
            match availability.get_mut(&update.tier) {
                Some(block) => {
                    if let Some(slots) = update.slots {
                        block.slots = slots;
                    }
                    if let Some(slots_filled) = update.slots_filled {
                        block.slots_filled = slots_filled;
                    }
                    if let Some(sla) = update.response_sla_ms {
                        block.response_sla_ms = sla;
                    }
                    if let Some(uptime) = update.uptime {
                        block.uptime_pct = uptime;
                    }
                    if update.next_available.is_some() {
                        block.next_available = update.next_available;
                    }
                }
                None => {
                    // Construct the block only when the update carries enough
                    // to define one.
                    let (slots, sla) = match (update.slots, update.response_sla_ms) {
                        (Some(slots), Some(sla)) => (slots, sla),
                        _ => {
                            return Err(RegistryError::TierNotConfigured {
                                agent_id: id.to_string(),
                                tier: update.tier,
                            })
                        }
                    };
                    availability.insert(
                        update.tier,
                        TierAvailability {
                            slots,
                            slots_filled: update.slots_filled.unwrap_or(0),
                            response_sla_ms: sla,
                            uptime_pct: update.uptime.unwrap_or(99.0),
                            next_available: update.next_available,
                        },
                    );
                }
            }

            validate_availability(&availability)?;
            profile.service_availability = availability;
            profile.clone()
        };

        self.persist(&snapshot).await;
        Ok(snapshot)
    }

    /// Atomically reserve one slot of the given tier.
    ///
    /// Check and increment happen inside a single per-agent critical section;
    /// this is the only mutation path for `slots_filled` during booking.
    pub async fn reserve_slot(
        &self,
        id: &str,
        tier: ServiceTier,
    ) -> Result<TierAvailability, RegistryError> {
        let entry = self
            .entry(id)
            .await
            .ok_or_else(|| RegistryError::AgentNotFound(id.to_string()))?;

        let snapshot = {
            let mut profile = entry.write().await;
            let block = profile.service_availability.get_mut(&tier).ok_or_else(|| {
                RegistryError::TierNotConfigured {
                    agent_id: id.to_string(),
                    tier,
                }
            })?;

            if block.slots_filled >= block.slots {
                return Err(RegistryError::CapacityExhausted {
                    agent_id: id.to_string(),
                    tier,
                    next_available: block.next_available,
                });
            }

            block.slots_filled += 1;
            let tier_snapshot = block.clone();
            (profile.clone(), tier_snapshot)
        };

        self.persist(&snapshot.0).await;
        Ok(snapshot.1)
    }

    /// Release one previously reserved slot
    pub async fn release_slot(&self, id: &str, tier: ServiceTier) {
        let Some(entry) = self.entry(id).await else {
            return;
        };

        let snapshot = {
            let mut profile = entry.write().await;
            match profile.service_availability.get_mut(&tier) {
                Some(block) => {
                    block.slots_filled = block.slots_filled.saturating_sub(1);
                    profile.clone()
                }
                None => return,
            }
        };
        self.persist(&snapshot).await;
    }

    /// Apply completed-booking feedback: bump the job counter and adjust
    /// reputation by a small bounded amount, clamped to [0, 100].
    pub async fn record_job_outcome(
        &self,
        id: &str,
        success: bool,
    ) -> Result<AgentProfile, RegistryError> {
        let entry = self
            .entry(id)
            .await
            .ok_or_else(|| RegistryError::AgentNotFound(id.to_string()))?;

        let snapshot = {
            let mut profile = entry.write().await;
            profile.total_jobs += 1;
            profile.reputation_score = if success {
                profile
                    .reputation_score
                    .saturating_add(REPUTATION_SUCCESS_INCREASE)
                    .min(MAX_REPUTATION)
            } else {
                profile
                    .reputation_score
                    .saturating_sub(REPUTATION_FAILURE_DECREASE)
                    .max(MIN_REPUTATION)
            };
            profile.clone()
        };

        self.persist(&snapshot).await;
        Ok(snapshot)
    }

    /// Flip an agent's status; used by the liveness sweep
    pub async fn set_status(&self, id: &str, status: AgentStatus) -> Result<(), RegistryError> {
        let entry = self
            .entry(id)
            .await
            .ok_or_else(|| RegistryError::AgentNotFound(id.to_string()))?;

        let snapshot = {
            let mut profile = entry.write().await;
            profile.status = status;
            profile.clone()
        };
        self.persist(&snapshot).await;
        Ok(())
    }

    async fn entry(&self, id: &str) -> Option<Arc<RwLock<AgentProfile>>> {
        let agents = self.inner.agents.read().await;
        agents.get(id).cloned()
    }

    /// Write-through to the gateway; failures are logged, never surfaced
    async fn persist(&self, profile: &AgentProfile) {
        if let Err(e) = self.inner.gateway.put(profile).await {
            warn!(agent_id = %profile.id, "Failed to persist agent record: {e}");
        }
    }
}

fn signer_matches(chain: ChainId, stored: &str, candidate: &str) -> bool {
    match chain {
        ChainId::Evm => {
            let stored = stored.strip_prefix("0x").unwrap_or(stored);
            let candidate = candidate.strip_prefix("0x").unwrap_or(candidate);
            stored.eq_ignore_ascii_case(candidate)
        }
        ChainId::Solana => stored == candidate,
    }
}

fn validate_availability(
    availability: &HashMap<ServiceTier, TierAvailability>,
) -> Result<(), RegistryError> {
    for (tier, block) in availability {
        if block.slots_filled > block.slots {
            return Err(RegistryError::InvalidField {
                field: "serviceAvailability",
                reason: format!(
                    "{tier} tier has slotsFilled {} above slots {}",
                    block.slots_filled, block.slots
                ),
            });
        }
    }
    if let Some(violation) = tier_ordering_violation(availability) {
        return Err(RegistryError::TierOrdering(violation));
    }
    Ok(())
}

/// Pre-seeded, always-on core agents.
///
/// These serve as the discovery fallback set and are exempt from staleness
/// classification.
fn core_agents() -> Vec<AgentProfile> {
    let now = Utc::now();

    let availability = |basic: u64, pro: u64, premium: u64| {
        let mut map = HashMap::new();
        map.insert(
            ServiceTier::Basic,
            TierAvailability {
                slots: 8,
                slots_filled: 0,
                response_sla_ms: basic,
                uptime_pct: 99.9,
                next_available: None,
            },
        );
        map.insert(
            ServiceTier::Pro,
            TierAvailability {
                slots: 4,
                slots_filled: 0,
                response_sla_ms: pro,
                uptime_pct: 99.9,
                next_available: None,
            },
        );
        map.insert(
            ServiceTier::Premium,
            TierAvailability {
                slots: 2,
                slots_filled: 0,
                response_sla_ms: premium,
                uptime_pct: 99.95,
                next_available: None,
            },
        );
        map
    };

    let flat_price = |fee: &str| PriceQuote {
        base_fee: fee.to_string(),
        asset: "USDC".to_string(),
        network: "base-sepolia".to_string(),
    };

    let core = |id: &str,
                name: &str,
                endpoint: &str,
                capabilities: &[&str],
                signer: &str,
                chain: ChainId,
                reputation: u8,
                pricing: HashMap<String, PriceQuote>| {
        AgentProfile {
            id: id.to_string(),
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            signer: signer.to_string(),
            chain,
            agent_type: AgentType::Core,
            status: AgentStatus::Active,
            reputation_score: reputation,
            pricing,
            tiered_pricing: HashMap::new(),
            service_availability: availability(30_000, 10_000, 3_000),
            last_heartbeat: now,
            verified_at: None,
            registered_at: now,
            total_jobs: 0,
        }
    };

    vec![
        core(
            "coach-core",
            "Coach Core",
            "https://coach.agentmesh.example/api",
            &["workout_planning", "form_analysis"],
            "0x4b26f2a1c9e85d307fa16c84be09d1ea23c5b8f0",
            ChainId::Evm,
            92,
            HashMap::from([
                ("workout_planning".to_string(), flat_price("0.01")),
                ("form_analysis".to_string(), flat_price("0.02")),
            ]),
        ),
        core(
            "nutrition-core",
            "Nutrition Core",
            "https://nutrition.agentmesh.example/api",
            &["nutrition_planning", "meal_tracking"],
            "9u4eVWRf8a7vMDCHsguakB6vxcnCuJssBVBbQAYrKdog",
            ChainId::Solana,
            90,
            HashMap::from([("nutrition_planning".to_string(), flat_price("0.01"))]),
        ),
        core(
            "recovery-core",
            "Recovery Core",
            "https://recovery.agentmesh.example/api",
            &["recovery_planning"],
            "0x91d4fc0e77a2b8356cd1a90b4ef3278d165c0ae4",
            ChainId::Evm,
            88,
            HashMap::from([("recovery_planning".to_string(), flat_price("0.015"))]),
        ),
    ]
}
