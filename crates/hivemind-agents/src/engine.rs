use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use hivemind_models::consensus::OUTPUT_SCHEMA_VERSION;
use hivemind_models::{ConsensusConfig, ConsensusResult, RoundReport, Scenario};
use hivemind_store::RoundStore;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregator::aggregate;
use crate::dispatcher::RequestDispatcher;
use crate::registry::AgentRegistry;

/// Runs rounds end-to-end: registry snapshot, dispatch, aggregation, and the
/// optional journal.
pub struct Engine {
    registry: Arc<AgentRegistry>,
    dispatcher: RequestDispatcher,
    consensus: ConsensusConfig,
    round_deadline: Duration,
    store: Option<Arc<RoundStore>>,
}

impl Engine {
    pub fn new(
        registry: Arc<AgentRegistry>,
        dispatcher: RequestDispatcher,
        consensus: ConsensusConfig,
        round_deadline: Duration,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            consensus,
            round_deadline,
            store: None,
        }
    }

    /// Journal every round and serve reusable results from `store`. Rounds that
    /// missed quorum are journaled but never reused.
    pub fn with_store(mut self, store: Arc<RoundStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Run one round for `scenario`.
    ///
    /// Never fails: agent errors become outcomes, a weak or missing vote becomes
    /// ABSTAIN, and journal errors are logged and skipped.
    pub async fn evaluate(&self, scenario: &Scenario) -> RoundReport {
        let start = Instant::now();
        let fingerprint = scenario.fingerprint();

        if let Some(report) = self.reusable(&fingerprint).await {
            info!(
                symbol = %scenario.symbol,
                round_id = %report.round_id,
                action = %report.result.action,
                "Reusing journaled round"
            );
            return report;
        }

        let round_id = Uuid::new_v4();
        let agents = self.registry.get(scenario);
        info!(
            symbol = %scenario.symbol,
            scenario_id = %scenario.id,
            round_id = %round_id,
            agents = agents.len(),
            "Starting round"
        );

        let weights: HashMap<String, Decimal> = agents
            .iter()
            .map(|a| (a.agent.id.clone(), a.agent.weight))
            .collect();

        let responses = self
            .dispatcher
            .dispatch(scenario, &agents, self.round_deadline)
            .await;
        let result = aggregate(&responses, &weights, &self.consensus, Utc::now());

        info!(
            symbol = %scenario.symbol,
            round_id = %round_id,
            action = %result.action,
            confidence = %result.confidence,
            confluence = %result.confluence,
            participating = result.participating_agents,
            quorum_met = result.quorum_met,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Round complete"
        );

        let report = RoundReport {
            round_id,
            schema_version: OUTPUT_SCHEMA_VERSION,
            scenario_id: scenario.id,
            symbol: scenario.symbol.clone(),
            result,
            responses,
            processing_time_ms: start.elapsed().as_millis() as u64,
            reused: false,
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.record(&fingerprint, &report).await {
                warn!(round_id = %round_id, error = %e, "Failed to journal round");
            }
        }

        report
    }

    /// Run one round and return only the consensus.
    pub async fn decide(&self, scenario: &Scenario) -> ConsensusResult {
        self.evaluate(scenario).await.result
    }

    async fn reusable(&self, fingerprint: &str) -> Option<RoundReport> {
        let store = self.store.as_ref()?;
        match store.lookup(fingerprint, Utc::now()).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Journal lookup failed, dispatching a fresh round");
                None
            }
        }
    }
}
