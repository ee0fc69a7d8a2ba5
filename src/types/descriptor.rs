//! Static provider metadata.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Capability;

/// How a provider bills, for display and rough estimates.
///
/// ```toml
/// cost = { type = "per_second", usd = 0.05 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CostModel {
    #[default]
    Unknown,
    Free,
    /// Flat price per generation.
    PerRequest { usd: f64 },
    /// Price per second of generated media.
    PerSecond { usd: f64 },
    /// Price per million tokens.
    PerMillionTokens { usd: f64 },
}

impl CostModel {
    /// Estimated price of one generation, if it can be known up front.
    ///
    /// Per-second pricing needs the requested duration; token pricing can
    /// never be estimated before the call.
    pub fn estimate(&self, duration: Option<Duration>) -> Option<f64> {
        match self {
            CostModel::Free => Some(0.0),
            CostModel::PerRequest { usd } => Some(*usd),
            CostModel::PerSecond { usd } => duration.map(|d| usd * d.as_secs_f64()),
            CostModel::Unknown | CostModel::PerMillionTokens { .. } => None,
        }
    }
}

impl std::fmt::Display for CostModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CostModel::Unknown => f.write_str("unknown"),
            CostModel::Free => f.write_str("free"),
            CostModel::PerRequest { usd } => write!(f, "${usd}/request"),
            CostModel::PerSecond { usd } => write!(f, "${usd}/s"),
            CostModel::PerMillionTokens { usd } => write!(f, "${usd}/Mtok"),
        }
    }
}

/// Per-provider metadata, fixed at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDescriptor {
    pub name: String,
    pub capabilities: Vec<Capability>,
    /// Rank within a capability; lower is tried first.
    pub priority: u32,
    pub enabled: bool,
    /// Longest media duration this provider accepts.
    pub max_duration: Option<Duration>,
    pub cost: CostModel,
}

impl ProviderDescriptor {
    /// Create an enabled descriptor with priority 100 and unknown cost.
    pub fn new(
        name: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            name: name.into(),
            capabilities: capabilities.into_iter().collect(),
            priority: 100,
            enabled: true,
            max_duration: None,
            cost: CostModel::Unknown,
        }
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn max_duration(mut self, max: Duration) -> Self {
        self.max_duration = Some(max);
        self
    }

    pub fn cost(mut self, cost: CostModel) -> Self {
        self.cost = cost;
        self
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Whether a request for `duration` fits this provider's limit.
    pub fn accepts_duration(&self, duration: Option<Duration>) -> bool {
        match (self.max_duration, duration) {
            (Some(max), Some(requested)) => requested <= max,
            _ => true,
        }
    }
}
