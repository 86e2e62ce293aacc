use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use hivemind_models::{Agent, HivemindConfig, Scenario, WeightOverride};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::AgentError;

/// Resolves an agent's `credential_ref` into the secret sent as a bearer token.
pub trait CredentialProvider: Send + Sync {
    fn resolve(&self, credential_ref: &str) -> Option<String>;
}

/// Reads credentials from environment variables named by `credential_ref`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn resolve(&self, credential_ref: &str) -> Option<String> {
        std::env::var(credential_ref)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }
}

/// A resolved secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// An agent as it takes part in one round: effective weight applied, credential resolved.
#[derive(Debug, Clone)]
pub struct RoundAgent {
    pub agent: Agent,
    pub credential: Credential,
}

/// Registry view of one agent, safe to print.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentStatus {
    pub id: String,
    pub model: String,
    pub role: String,
    pub weight: Decimal,
    /// Enabled in configuration.
    pub configured: bool,
    pub credential_resolved: bool,
    pub breaker_open: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaker_reason: Option<String>,
}

#[derive(Debug, Default)]
struct Breaker {
    opened_at: Option<Instant>,
    reason: Option<String>,
    /// Credential the endpoint refused when the breaker was tripped.
    rejected: Option<Credential>,
}

impl Breaker {
    fn is_open(&self) -> bool {
        self.opened_at.is_some()
    }

    fn open(&mut self, reason: String) {
        self.opened_at = Some(Instant::now());
        self.reason = Some(reason);
    }

    fn close(&mut self) {
        self.opened_at = None;
        self.reason = None;
        self.rejected = None;
    }
}

#[derive(Debug)]
struct AgentSlot {
    credential: Option<Credential>,
    breaker: Breaker,
}

/// The configured agents plus the only state that outlives a round: each
/// agent's circuit breaker.
///
/// Configuration is fixed after construction. Breakers are opened by auth
/// failures and closed by `refresh_credentials` or, when a cooldown is set,
/// once the cooldown has elapsed.
pub struct AgentRegistry {
    agents: Vec<Agent>,
    overrides: Vec<WeightOverride>,
    credentials: Arc<dyn CredentialProvider>,
    cooldown: Option<Duration>,
    slots: Mutex<HashMap<String, AgentSlot>>,
}

impl AgentRegistry {
    pub fn new(
        agents: Vec<Agent>,
        overrides: Vec<WeightOverride>,
        credentials: Arc<dyn CredentialProvider>,
        cooldown: Option<Duration>,
    ) -> Self {
        let slots = agents
            .iter()
            .map(|agent| {
                let credential = credentials.resolve(&agent.credential_ref).map(Credential);
                let mut breaker = Breaker::default();
                if credential.is_none() && agent.enabled {
                    warn!(
                        agent = %agent.id,
                        credential_ref = %agent.credential_ref,
                        "Credential not available, agent disabled"
                    );
                    breaker.open(format!("credential {} not available", agent.credential_ref));
                }
                (agent.id.clone(), AgentSlot { credential, breaker })
            })
            .collect();

        Self {
            agents,
            overrides,
            credentials,
            cooldown,
            slots: Mutex::new(slots),
        }
    }

    /// Validate the configuration and build the registry from it.
    pub fn from_config(
        config: &HivemindConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        Ok(Self::new(
            config.agents.clone(),
            config.weight_overrides.clone(),
            credentials,
            config.breaker.cooldown_seconds.map(Duration::from_secs),
        ))
    }

    /// Agents taking part in a round for `scenario`: enabled in configuration,
    /// breaker closed, with weight overrides for the scenario's tags applied.
    pub fn get(&self, scenario: &Scenario) -> Vec<RoundAgent> {
        let mut slots = self.lock();

        self.agents
            .iter()
            .filter(|agent| agent.enabled)
            .filter_map(|agent| {
                let slot = slots.get_mut(&agent.id)?;
                self.maybe_cool_down(agent, slot);
                if slot.breaker.is_open() {
                    return None;
                }
                let credential = slot.credential.clone()?;

                let mut agent = agent.clone();
                agent.weight = self.effective_weight(&agent, scenario);
                Some(RoundAgent { agent, credential })
            })
            .collect()
    }

    /// Base weight scaled by every override whose role matches and whose tag the scenario carries.
    pub fn effective_weight(&self, agent: &Agent, scenario: &Scenario) -> Decimal {
        self.overrides
            .iter()
            .filter(|o| o.role == agent.role && scenario.has_tag(&o.tag))
            .fold(agent.weight, |weight, o| weight.saturating_mul(o.multiplier))
    }

    /// Open an agent's breaker. It is excluded from rounds until re-enabled.
    pub fn trip(&self, agent_id: &str, reason: &str) {
        let mut slots = self.lock();
        if let Some(slot) = slots.get_mut(agent_id) {
            if !slot.breaker.is_open() {
                warn!(agent = %agent_id, reason = %reason, "Circuit breaker opened");
            }
            slot.breaker.open(reason.to_string());
            slot.breaker.rejected = slot.credential.clone();
        }
    }

    /// Re-resolve every credential and close the breakers of agents whose
    /// credential is now available. An agent tripped by a rejected credential
    /// stays out until the credential changes. Returns the number of agents
    /// re-enabled.
    pub fn refresh_credentials(&self) -> usize {
        let mut slots = self.lock();
        let mut reenabled = 0;

        for agent in &self.agents {
            let Some(slot) = slots.get_mut(&agent.id) else {
                continue;
            };
            slot.credential = self
                .credentials
                .resolve(&agent.credential_ref)
                .map(Credential);

            let changed = slot.credential.is_some()
                && slot.credential != slot.breaker.rejected;
            if slot.breaker.is_open() && changed {
                info!(agent = %agent.id, "Credentials refreshed, circuit breaker closed");
                slot.breaker.close();
                reenabled += 1;
            }
        }

        reenabled
    }

    /// True when the agent would be dispatched in the next round.
    pub fn is_available(&self, agent_id: &str) -> bool {
        let Some(agent) = self.agents.iter().find(|a| a.id == agent_id) else {
            return false;
        };
        let mut slots = self.lock();
        match slots.get_mut(agent_id) {
            Some(slot) => {
                self.maybe_cool_down(agent, slot);
                agent.enabled && !slot.breaker.is_open() && slot.credential.is_some()
            }
            None => false,
        }
    }

    pub fn statuses(&self) -> Vec<AgentStatus> {
        let slots = self.lock();
        self.agents
            .iter()
            .map(|agent| {
                let slot = slots.get(&agent.id);
                AgentStatus {
                    id: agent.id.clone(),
                    model: agent.model.clone(),
                    role: agent.role.clone(),
                    weight: agent.weight,
                    configured: agent.enabled,
                    credential_resolved: slot.is_some_and(|s| s.credential.is_some()),
                    breaker_open: slot.is_some_and(|s| s.breaker.is_open()),
                    breaker_reason: slot.and_then(|s| s.breaker.reason.clone()),
                }
            })
            .collect()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    fn maybe_cool_down(&self, agent: &Agent, slot: &mut AgentSlot) {
        let (Some(cooldown), Some(opened_at)) = (self.cooldown, slot.breaker.opened_at) else {
            return;
        };
        if opened_at.elapsed() < cooldown {
            return;
        }
        if slot.credential.is_none() {
            slot.credential = self
                .credentials
                .resolve(&agent.credential_ref)
                .map(Credential);
        }
        if slot.credential.is_some() {
            info!(agent = %agent.id, "Cooldown elapsed, circuit breaker closed");
            slot.breaker.close();
        } else {
            // Still no credential; wait another cooldown period.
            slot.breaker.opened_at = Some(Instant::now());
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, AgentSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
