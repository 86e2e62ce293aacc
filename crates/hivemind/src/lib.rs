//! Hivemind - weighted multi-agent consensus engine
//!
//! Sends one decision scenario to a panel of independently configured
//! language-model agents, parses each free-text reply into a vote, and
//! combines the votes into a single BUY / SELL / HOLD / ABSTAIN decision with
//! a confidence and a confluence margin.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hivemind::agents::EnvCredentials;
//! use hivemind::models::Scenario;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = hivemind::load_config("config/hivemind.toml")?;
//! let engine = hivemind::build_engine(&config, Arc::new(EnvCredentials))?;
//! let report = hivemind::evaluate(&engine, &Scenario::new("BTC/USDT", serde_json::json!({"price": 67000}))).await;
//! println!("{}", report.result.action);
//! # Ok(())
//! # }
//! ```

pub use hivemind_agents as agents;
pub use hivemind_models as models;
pub use hivemind_store as store;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use hivemind_agents::{
    AgentRegistry, CredentialProvider, Engine, HttpInferenceClient, InferenceClient,
    RequestDispatcher, RetryPolicy,
};
use hivemind_models::{HivemindConfig, RoundReport, Scenario};
use hivemind_store::RoundStore;
use tracing::info;

/// Read and validate a TOML configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<HivemindConfig, anyhow::Error> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: HivemindConfig =
        toml::from_str(&raw).with_context(|| format!("Failed to parse config: {}", path.display()))?;
    config.validate().context("Invalid config")?;
    Ok(config)
}

/// Open the round journal if the config enables it.
pub fn open_store(config: &HivemindConfig) -> Result<Option<Arc<RoundStore>>, anyhow::Error> {
    if !config.store.enabled {
        return Ok(None);
    }
    let store = RoundStore::open(&config.store)
        .with_context(|| format!("Failed to open journal: {}", config.store.sqlite_path))?;
    Ok(Some(Arc::new(store)))
}

/// Build an Engine that calls agents over HTTP.
pub fn build_engine(
    config: &HivemindConfig,
    credentials: Arc<dyn CredentialProvider>,
) -> Result<Engine, anyhow::Error> {
    let client = HttpInferenceClient::new(
        config.inference.request_timeout(),
        std::time::Duration::from_millis(config.retry.max_delay_ms),
    )
    .context("Failed to build inference client")?;
    build_engine_with_client(config, credentials, Arc::new(client))
}

/// Build an Engine around any inference client.
pub fn build_engine_with_client(
    config: &HivemindConfig,
    credentials: Arc<dyn CredentialProvider>,
    client: Arc<dyn InferenceClient>,
) -> Result<Engine, anyhow::Error> {
    let registry = Arc::new(
        AgentRegistry::from_config(config, credentials).context("Failed to build agent registry")?,
    );

    let dispatcher = RequestDispatcher::new(
        client,
        Arc::clone(&registry),
        RetryPolicy::new(config.retry.clone()),
        config.inference.clone(),
        config.dispatch.max_concurrency,
    );

    let mut engine = Engine::new(
        registry,
        dispatcher,
        config.consensus.clone(),
        config.dispatch.round_deadline(),
    );
    if let Some(store) = open_store(config)? {
        engine = engine.with_store(store);
    }

    info!(
        agents = config.agents.len(),
        min_quorum = config.consensus.min_quorum,
        journal = config.store.enabled,
        "Engine ready"
    );
    Ok(engine)
}

/// Run one round for `scenario` using the given engine.
pub async fn evaluate(engine: &Engine, scenario: &Scenario) -> RoundReport {
    engine.evaluate(scenario).await
}
