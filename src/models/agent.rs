use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reputation score bounds
pub const MIN_REPUTATION: u8 = 0;
pub const MAX_REPUTATION: u8 = 100;

/// Starting reputation for permissionlessly registered agents
pub const DEFAULT_REPUTATION: u8 = 50;

/// Chain family an agent's signer identity lives on.
///
/// Signature verification dispatches on this tag; adding a chain means adding
/// one verifier implementation, not touching callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    Evm,
    Solana,
}

impl ChainId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evm => "evm",
            Self::Solana => "solana",
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "evm" => Ok(Self::Evm),
            "solana" => Ok(Self::Solana),
            _ => Err(()),
        }
    }
}

/// Service tier levels, ordered slowest to fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceTier {
    Basic,
    Pro,
    Premium,
}

impl ServiceTier {
    /// Price multiplier applied when a capability only advertises a flat price
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Basic => 1.0,
            Self::Pro => 2.5,
            Self::Premium => 5.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Pro => "pro",
            Self::Premium => "premium",
        }
    }

    /// All tiers, slowest first
    pub fn all() -> [ServiceTier; 3] {
        [Self::Basic, Self::Pro, Self::Premium]
    }
}

impl fmt::Display for ServiceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core agents are pre-seeded infrastructure; dynamic agents self-register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Core,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Inactive,
}

/// Price quote for one capability at one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    /// Decimal string in the asset's display units (e.g. "0.03")
    pub base_fee: String,
    pub asset: String,
    pub network: String,
}

/// Capacity and service-level targets for one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierAvailability {
    pub slots: u32,
    #[serde(default)]
    pub slots_filled: u32,
    #[serde(rename = "responseSLA")]
    pub response_sla_ms: u64,
    #[serde(rename = "uptime", default = "default_uptime")]
    pub uptime_pct: f64,
    #[serde(
        rename = "nextAvailable",
        default,
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub next_available: Option<DateTime<Utc>>,
}

fn default_uptime() -> f64 {
    99.0
}

/// Registered agent profile — the authoritative registry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    /// URL the agent itself serves
    pub endpoint: String,
    pub capabilities: Vec<String>,
    /// Chain-native public identity: EVM address or Solana base58 public key
    pub signer: String,
    pub chain: ChainId,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub status: AgentStatus,
    pub reputation_score: u8,
    #[serde(default)]
    pub pricing: HashMap<String, PriceQuote>,
    #[serde(default)]
    pub tiered_pricing: HashMap<String, HashMap<ServiceTier, PriceQuote>>,
    #[serde(default)]
    pub service_availability: HashMap<ServiceTier, TierAvailability>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_heartbeat: DateTime<Utc>,
    /// Set if and only if a signature proof was checked and passed.
    /// Serialized as null for unverified registrations so the two stay
    /// distinguishable in every read path.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub total_jobs: u64,
}

impl AgentProfile {
    pub fn offers_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Response SLA of the fastest tier the agent offers
    pub fn fastest_sla(&self) -> Option<u64> {
        self.service_availability
            .values()
            .map(|a| a.response_sla_ms)
            .min()
    }

    /// SLA of the given tier, falling back to the fastest offered tier
    pub fn sla_for(&self, tier: Option<ServiceTier>) -> Option<u64> {
        match tier {
            Some(t) => self.service_availability.get(&t).map(|a| a.response_sla_ms),
            None => self.fastest_sla(),
        }
    }
}

/// Check the tier SLA ordering invariant: where an agent offers more than one
/// tier, each higher tier must promise a strictly faster response time.
/// Returns a description of the violation, if any.
pub fn tier_ordering_violation(
    availability: &HashMap<ServiceTier, TierAvailability>,
) -> Option<String> {
    let tiers = ServiceTier::all();
    for pair in tiers.windows(2) {
        let (slower, faster) = (pair[0], pair[1]);
        if let (Some(a), Some(b)) = (availability.get(&slower), availability.get(&faster)) {
            if a.response_sla_ms <= b.response_sla_ms {
                return Some(format!(
                    "{} tier ({}ms) must be slower than {} tier ({}ms)",
                    slower, a.response_sla_ms, faster, b.response_sla_ms
                ));
            }
        }
    }
    None
}

/// Request payload for POST /agents/register
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentRequest {
    pub profile: RegisterProfile,
    /// Message the signer signed as an identity proof; must reference the agent id
    pub message: Option<String>,
    /// Chain-native signature over `message`
    pub signature: Option<String>,
}

/// Caller-supplied portion of an agent profile.
///
/// Everything the server assigns (type, status, reputation, timestamps) is
/// absent here; chain is a free string so unsupported values reject with a
/// hint instead of a deserialization error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterProfile {
    #[serde(default)]
    pub id: String,
    pub name: Option<String>,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub signer: Option<String>,
    pub chain: Option<String>,
    #[serde(default)]
    pub pricing: HashMap<String, PriceQuote>,
    #[serde(default)]
    pub tiered_pricing: HashMap<String, HashMap<ServiceTier, PriceQuote>>,
    pub service_availability: Option<HashMap<ServiceTier, TierAvailability>>,
}

/// Request payload for POST /agents/heartbeat
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatRequest {
    pub id: String,
}

/// Partial update for one tier's availability block.
/// Only supplied fields are merged; a missing tier block can be constructed
/// when `slots` and `responseSLA` are both present.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityUpdateRequest {
    pub tier: ServiceTier,
    pub slots: Option<u32>,
    pub slots_filled: Option<u32>,
    #[serde(rename = "responseSLA")]
    pub response_sla_ms: Option<u64>,
    pub uptime: Option<f64>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub next_available: Option<DateTime<Utc>>,
}
