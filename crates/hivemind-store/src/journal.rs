use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use hivemind_models::journal_schema::{AgentStatsRow, RoundRow, JOURNAL_DDL};
use hivemind_models::RoundReport;
use rusqlite::Connection;

use crate::error::StoreError;

const ROUND_COLUMNS: &str = "round_id, scenario_id, symbol, fingerprint, action, confidence, \
                             confluence, quorum_met, participating_agents, report_json, decided_at";

/// Format used for every timestamp column. Fixed width so string order is time order.
pub fn journal_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite-backed record of completed rounds and per-agent outcomes.
///
/// File databases run in WAL mode so the CLI can read history while an
/// engine process is writing.
pub struct Journal {
    conn: Connection,
}

impl Journal {
    /// Open (or create) a journal file. Creates the schema and enables WAL.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(JOURNAL_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    /// Open an in-memory journal. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(JOURNAL_DDL)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    /// Write a round and all of its agent responses in one transaction.
    pub fn record(&mut self, fingerprint: &str, report: &RoundReport) -> Result<(), StoreError> {
        let report_json = serde_json::to_string(report)?;
        let result = &report.result;

        let tx = self.conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO rounds ({ROUND_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            rusqlite::params![
                report.round_id.to_string(),
                report.scenario_id.to_string(),
                report.symbol,
                fingerprint,
                result.action.as_str(),
                result.confidence.to_string(),
                result.confluence.to_string(),
                result.quorum_met,
                result.participating_agents,
                report_json,
                journal_timestamp(&result.timestamp),
            ],
        )?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO agent_responses \
                 (round_id, agent_id, outcome, action, confidence, latency_ms, attempts) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for response in &report.responses {
                stmt.execute(rusqlite::params![
                    report.round_id.to_string(),
                    response.agent_id,
                    response.outcome.as_str(),
                    response.parsed_action.as_str(),
                    response.parsed_confidence.to_string(),
                    response.latency_ms as i64,
                    response.attempts,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Fetch a single round by id.
    pub fn get(&self, round_id: &str) -> Result<Option<RoundRow>, StoreError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {ROUND_COLUMNS} FROM rounds WHERE round_id = ?1"
        ))?;

        match stmt.query_row(rusqlite::params![round_id], round_row) {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    /// Most recent round for a scenario fingerprint that met quorum and was
    /// decided at or after `since`.
    pub fn latest_for_fingerprint(
        &self,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<RoundRow>, StoreError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {ROUND_COLUMNS} FROM rounds \
             WHERE fingerprint = ?1 AND decided_at >= ?2 AND quorum_met = 1 \
             ORDER BY decided_at DESC LIMIT 1"
        ))?;

        match stmt.query_row(
            rusqlite::params![fingerprint, journal_timestamp(&since)],
            round_row,
        ) {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    /// Newest rounds first.
    pub fn recent(&self, limit: usize) -> Result<Vec<RoundRow>, StoreError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {ROUND_COLUMNS} FROM rounds ORDER BY decided_at DESC LIMIT ?1"
        ))?;

        let rows = stmt
            .query_map(rusqlite::params![limit as i64], round_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Outcome counts and mean success latency per agent, ordered by agent id.
    pub fn agent_stats(&self) -> Result<Vec<AgentStatsRow>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT agent_id, COUNT(*), \
                    SUM(CASE WHEN outcome = 'SUCCESS' THEN 1 ELSE 0 END), \
                    SUM(CASE WHEN outcome = 'TIMEOUT' THEN 1 ELSE 0 END), \
                    SUM(CASE WHEN outcome = 'AUTH_ERROR' THEN 1 ELSE 0 END), \
                    SUM(CASE WHEN outcome = 'RATE_LIMITED' THEN 1 ELSE 0 END), \
                    SUM(CASE WHEN outcome = 'PARSE_ERROR' THEN 1 ELSE 0 END), \
                    SUM(CASE WHEN outcome = 'NETWORK_ERROR' THEN 1 ELSE 0 END), \
                    AVG(CASE WHEN outcome = 'SUCCESS' THEN latency_ms END) \
             FROM agent_responses GROUP BY agent_id ORDER BY agent_id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(AgentStatsRow {
                    agent_id: row.get(0)?,
                    rounds: row.get::<_, i64>(1)? as u64,
                    successes: row.get::<_, i64>(2)? as u64,
                    timeouts: row.get::<_, i64>(3)? as u64,
                    auth_errors: row.get::<_, i64>(4)? as u64,
                    rate_limited: row.get::<_, i64>(5)? as u64,
                    parse_errors: row.get::<_, i64>(6)? as u64,
                    network_errors: row.get::<_, i64>(7)? as u64,
                    mean_success_latency_ms: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Delete rounds decided before `cutoff`. Returns the number of rounds removed.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff = journal_timestamp(&cutoff);
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM agent_responses WHERE round_id IN \
             (SELECT round_id FROM rounds WHERE decided_at < ?1)",
            rusqlite::params![cutoff],
        )?;
        let deleted = tx.execute(
            "DELETE FROM rounds WHERE decided_at < ?1",
            rusqlite::params![cutoff],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Count all journaled rounds.
    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM rounds", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn round_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoundRow> {
    Ok(RoundRow {
        round_id: row.get(0)?,
        scenario_id: row.get(1)?,
        symbol: row.get(2)?,
        fingerprint: row.get(3)?,
        action: row.get(4)?,
        confidence: row.get(5)?,
        confluence: row.get(6)?,
        quorum_met: row.get(7)?,
        participating_agents: row.get(8)?,
        report_json: row.get(9)?,
        decided_at: row.get(10)?,
    })
}
