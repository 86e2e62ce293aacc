use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// SQLite schema for the round journal.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS rounds (
///     round_id              TEXT PRIMARY KEY,
///     scenario_id           TEXT NOT NULL,
///     symbol                TEXT NOT NULL,
///     fingerprint           TEXT NOT NULL,
///     action                TEXT NOT NULL,
///     confidence            TEXT NOT NULL,
///     confluence            TEXT NOT NULL,
///     quorum_met            INTEGER NOT NULL,
///     participating_agents  INTEGER NOT NULL,
///     report_json           TEXT NOT NULL,
///     decided_at            TEXT NOT NULL
/// );
///
/// CREATE TABLE IF NOT EXISTS agent_responses (
///     round_id     TEXT NOT NULL REFERENCES rounds(round_id) ON DELETE CASCADE,
///     agent_id     TEXT NOT NULL,
///     outcome      TEXT NOT NULL,
///     action       TEXT NOT NULL,
///     confidence   TEXT NOT NULL,
///     latency_ms   INTEGER NOT NULL,
///     attempts     INTEGER NOT NULL,
///     PRIMARY KEY (round_id, agent_id)
/// );
/// ```
///
/// Timestamps are RFC 3339 UTC strings so lexical order equals time order.
/// Decimals are stored as text to keep them exact.
pub const JOURNAL_DDL: &str = "\
CREATE TABLE IF NOT EXISTS rounds (
    round_id              TEXT PRIMARY KEY,
    scenario_id           TEXT NOT NULL,
    symbol                TEXT NOT NULL,
    fingerprint           TEXT NOT NULL,
    action                TEXT NOT NULL,
    confidence            TEXT NOT NULL,
    confluence            TEXT NOT NULL,
    quorum_met            INTEGER NOT NULL,
    participating_agents  INTEGER NOT NULL,
    report_json           TEXT NOT NULL,
    decided_at            TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rounds_fingerprint ON rounds(fingerprint, decided_at);
CREATE INDEX IF NOT EXISTS idx_rounds_decided ON rounds(decided_at);
CREATE TABLE IF NOT EXISTS agent_responses (
    round_id     TEXT NOT NULL REFERENCES rounds(round_id) ON DELETE CASCADE,
    agent_id     TEXT NOT NULL,
    outcome      TEXT NOT NULL,
    action       TEXT NOT NULL,
    confidence   TEXT NOT NULL,
    latency_ms   INTEGER NOT NULL,
    attempts     INTEGER NOT NULL,
    PRIMARY KEY (round_id, agent_id)
);
CREATE INDEX IF NOT EXISTS idx_responses_agent ON agent_responses(agent_id);
";

/// Summary row for a journaled round (the full report is kept as JSON).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundRow {
    pub round_id: String,
    pub scenario_id: String,
    pub symbol: String,
    pub fingerprint: String,
    pub action: String,
    pub confidence: String,
    pub confluence: String,
    pub quorum_met: bool,
    pub participating_agents: u32,
    pub report_json: String,
    pub decided_at: String,
}

/// Per-agent outcome counts across all journaled rounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AgentStatsRow {
    pub agent_id: String,
    pub rounds: u64,
    pub successes: u64,
    pub timeouts: u64,
    pub auth_errors: u64,
    pub rate_limited: u64,
    pub parse_errors: u64,
    pub network_errors: u64,
    /// Mean latency of successful responses, in milliseconds.
    pub mean_success_latency_ms: Option<f64>,
}

impl AgentStatsRow {
    /// Share of rounds in which the agent answered successfully.
    pub fn success_rate(&self) -> Decimal {
        if self.rounds == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.successes) / Decimal::from(self.rounds)
    }
}
