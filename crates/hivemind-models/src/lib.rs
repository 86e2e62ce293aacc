pub mod agent;
pub mod agent_message;
pub mod config;
pub mod consensus;
pub mod journal_schema;
pub mod scenario;

pub use agent::Agent;
pub use agent_message::{Action, AgentResponse, Outcome};
pub use config::{
    BelowThresholdAction, BreakerConfig, ConfigError, ConsensusConfig, DispatchConfig,
    HivemindConfig, InferenceConfig, RetryConfig, StoreConfig, WeightOverride, MAX_MULTIPLIER,
    MAX_WEIGHT,
};
pub use consensus::{ConsensusResult, Decision, RoundReport, VoteBreakdown};
pub use journal_schema::{AgentStatsRow, RoundRow};
pub use scenario::Scenario;
