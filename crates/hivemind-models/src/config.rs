use std::collections::HashSet;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::Agent;
use crate::consensus::Decision;

/// Top-level configuration for the consensus engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HivemindConfig {
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default = "default_roster")]
    pub agents: Vec<Agent>,
    #[serde(default = "default_weight_overrides")]
    pub weight_overrides: Vec<WeightOverride>,
}

impl Default for HivemindConfig {
    fn default() -> Self {
        Self {
            consensus: ConsensusConfig::default(),
            dispatch: DispatchConfig::default(),
            retry: RetryConfig::default(),
            inference: InferenceConfig::default(),
            breaker: BreakerConfig::default(),
            store: StoreConfig::default(),
            agents: default_roster(),
            weight_overrides: default_weight_overrides(),
        }
    }
}

/// Largest accepted agent weight.
pub const MAX_WEIGHT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Largest accepted weight-override multiplier.
pub const MAX_MULTIPLIER: Decimal = Decimal::from_parts(1_000, 0, 0, false, 0);

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("no agents configured")]
    NoAgents,

    #[error("duplicate agent id: {0}")]
    DuplicateAgent(String),

    #[error("agent {0} must have a weight greater than zero")]
    NonPositiveWeight(String),

    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: Decimal },

    #[error("agent {0} weight exceeds the maximum of {max}", max = MAX_WEIGHT)]
    WeightTooLarge(String),

    #[error("min_quorum must be at least 1")]
    ZeroQuorum,

    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("weight override for role={role} tag={tag} must have a multiplier greater than zero")]
    NonPositiveMultiplier { role: String, tag: String },

    #[error(
        "weight override for role={role} tag={tag} exceeds the maximum multiplier of {max}",
        max = MAX_MULTIPLIER
    )]
    MultiplierTooLarge { role: String, tag: String },
}

impl HivemindConfig {
    /// Check invariants that serde cannot express. Called once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.is_empty() {
            return Err(ConfigError::NoAgents);
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.id.as_str()) {
                return Err(ConfigError::DuplicateAgent(agent.id.clone()));
            }
            if agent.weight <= Decimal::ZERO {
                return Err(ConfigError::NonPositiveWeight(agent.id.clone()));
            }
            if agent.weight > MAX_WEIGHT {
                return Err(ConfigError::WeightTooLarge(agent.id.clone()));
            }
        }

        if self.consensus.min_quorum == 0 {
            return Err(ConfigError::ZeroQuorum);
        }
        for (name, value) in [
            ("min_confidence", self.consensus.min_confidence),
            ("min_confluence", self.consensus.min_confluence),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }

        if self.dispatch.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        for o in &self.weight_overrides {
            if o.multiplier <= Decimal::ZERO {
                return Err(ConfigError::NonPositiveMultiplier {
                    role: o.role.clone(),
                    tag: o.tag.clone(),
                });
            }
            if o.multiplier > MAX_MULTIPLIER {
                return Err(ConfigError::MultiplierTooLarge {
                    role: o.role.clone(),
                    tag: o.tag.clone(),
                });
            }
        }

        Ok(())
    }
}

/// What a round reports when quorum existed but the vote was too weak or too contested.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BelowThresholdAction {
    #[default]
    Abstain,
    Hold,
}

impl From<BelowThresholdAction> for Decision {
    fn from(action: BelowThresholdAction) -> Self {
        match action {
            BelowThresholdAction::Abstain => Decision::Abstain,
            BelowThresholdAction::Hold => Decision::Hold,
        }
    }
}

/// Quorum and threshold gating applied by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Minimum number of successful responses before a decision can be rendered.
    pub min_quorum: usize,
    /// Minimum weighted score the leading action needs.
    pub min_confidence: Decimal,
    /// Minimum normalized margin over the runner-up. Zero disables the check.
    pub min_confluence: Decimal,
    pub below_threshold_action: BelowThresholdAction,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_quorum: 3,
            min_confidence: Decimal::new(85, 2),
            min_confluence: Decimal::ZERO,
            below_threshold_action: BelowThresholdAction::Abstain,
        }
    }
}

/// Fan-out limits for a single round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Wall-clock budget for the whole round, measured from dispatch start.
    pub round_deadline_ms: u64,
    /// Maximum number of agent calls in flight at once.
    pub max_concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            round_deadline_ms: 30_000,
            max_concurrency: 8,
        }
    }
}

impl DispatchConfig {
    pub fn round_deadline(&self) -> Duration {
        Duration::from_millis(self.round_deadline_ms)
    }
}

/// Per-agent retry and backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt. 0 disables retrying.
    pub max_retries_per_agent: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction of the delay applied as +/- random jitter.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries_per_agent: 3,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
            multiplier: 2.0,
            jitter_factor: 0.3,
        }
    }
}

/// How agents are called.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InferenceConfig {
    /// OpenAI-compatible chat-completions URL.
    pub endpoint: String,
    /// Per-call timeout. Each retry gets a fresh budget.
    pub request_timeout_ms: u64,
    pub max_tokens: u32,
    pub temperature: f64,
    /// System prompt template. `{role}` is replaced with the agent's role label.
    pub system_prompt: String,
    /// Answer-format instructions appended to every user prompt.
    pub instructions: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            request_timeout_ms: 10_000,
            max_tokens: 200,
            temperature: 0.7,
            system_prompt: "You are the {role} specialist on a panel of independent trading \
                            analysts. Provide concise, actionable analysis."
                .to_string(),
            instructions: "Should we BUY, SELL, or HOLD? Answer in the format: \
                           \"RECOMMENDATION: [BUY/SELL/HOLD], CONFIDENCE: [0-100]%, \
                           REASON: [brief explanation]\""
                .to_string(),
        }
    }
}

impl InferenceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Circuit breaker behaviour for agents disabled by auth failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct BreakerConfig {
    /// Re-enable a tripped agent after this many seconds. None keeps it disabled
    /// until credentials are refreshed.
    pub cooldown_seconds: Option<u64>,
}

/// Round journal and result reuse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub enabled: bool,
    pub sqlite_path: String,
    /// Maximum number of reports held in the in-memory hot cache.
    pub memory_max_capacity: u64,
    /// A stored report for the same scenario fingerprint younger than this is
    /// returned instead of dispatching a new round. 0 disables reuse.
    pub reuse_window_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sqlite_path: "data/hivemind_journal.db".to_string(),
            memory_max_capacity: 1_000,
            reuse_window_seconds: 0,
        }
    }
}

/// Scales the weight of every agent with `role` when the scenario carries `tag`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightOverride {
    pub role: String,
    pub tag: String,
    pub multiplier: Decimal,
}

fn default_roster() -> Vec<Agent> {
    let key = "OPENROUTER_API_KEY";
    vec![
        Agent::new("technical", "openai/gpt-4o", key, Decimal::new(20, 1), "technical"),
        Agent::new(
            "risk",
            "anthropic/claude-3.5-sonnet",
            key,
            Decimal::new(18, 1),
            "risk",
        ),
        Agent::new(
            "sentiment",
            "meta-llama/llama-3.3-70b-instruct",
            key,
            Decimal::new(15, 1),
            "sentiment",
        ),
        Agent::new(
            "macro",
            "google/gemini-pro-1.5",
            key,
            Decimal::new(12, 1),
            "macro",
        ),
        Agent::new(
            "flow",
            "qwen/qwen-2.5-72b-instruct",
            key,
            Decimal::new(10, 1),
            "flow",
        ),
    ]
}

fn default_weight_overrides() -> Vec<WeightOverride> {
    vec![WeightOverride {
        role: "risk".to_string(),
        tag: "high_volatility".to_string(),
        multiplier: Decimal::new(15, 1),
    }]
}
