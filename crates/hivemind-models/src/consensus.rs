use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent_message::{Action, AgentResponse};

pub const OUTPUT_SCHEMA_VERSION: u32 = 1;

/// The round's decision. `Abstain` is an ordinary outcome, not an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Sell,
    Hold,
    Abstain,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Buy => "BUY",
            Decision::Sell => "SELL",
            Decision::Hold => "HOLD",
            Decision::Abstain => "ABSTAIN",
        }
    }
}

impl From<Action> for Decision {
    fn from(action: Action) -> Self {
        match action {
            Action::Buy => Decision::Buy,
            Action::Sell => Decision::Sell,
            Action::Hold => Decision::Hold,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized share of the weighted vote per action. Sums to 1 whenever
/// at least one agent answered successfully.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VoteBreakdown {
    #[serde(rename = "BUY")]
    pub buy: Decimal,
    #[serde(rename = "SELL")]
    pub sell: Decimal,
    #[serde(rename = "HOLD")]
    pub hold: Decimal,
}

impl VoteBreakdown {
    pub fn get(&self, action: Action) -> Decimal {
        match action {
            Action::Buy => self.buy,
            Action::Sell => self.sell,
            Action::Hold => self.hold,
        }
    }

    pub fn set(&mut self, action: Action, value: Decimal) {
        match action {
            Action::Buy => self.buy = value,
            Action::Sell => self.sell = value,
            Action::Hold => self.hold = value,
        }
    }

    pub fn total(&self) -> Decimal {
        self.buy + self.sell + self.hold
    }
}

/// Terminal artifact of the aggregation step. Created once per round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusResult {
    pub action: Decision,
    /// Weighted score of the leading action, in [0, 1].
    pub confidence: Decimal,
    /// Normalized margin between the top two scores, in [0, 1].
    pub confluence: Decimal,
    pub vote_breakdown: VoteBreakdown,
    /// Number of agents that answered successfully.
    pub participating_agents: u32,
    pub quorum_met: bool,
    pub timestamp: DateTime<Utc>,
}

impl ConsensusResult {
    /// True when the consumer should act (BUY or SELL).
    pub fn is_actionable(&self) -> bool {
        matches!(self.action, Decision::Buy | Decision::Sell)
    }
}

/// Everything a consumer gets back from one round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundReport {
    pub round_id: Uuid,
    pub schema_version: u32,
    pub scenario_id: Uuid,
    pub symbol: String,
    pub result: ConsensusResult,
    /// Exactly one entry per dispatched agent.
    pub responses: Vec<AgentResponse>,
    pub processing_time_ms: u64,
    /// True when the report was served from the round journal instead of a fresh dispatch.
    #[serde(default)]
    pub reused: bool,
}
