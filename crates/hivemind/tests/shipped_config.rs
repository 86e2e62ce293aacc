//! The configuration file shipped in `config/` loads, validates, and drives a round.

use std::sync::Arc;

use hivemind::agents::test_support::{ScriptedClient, StaticCredentials};
use hivemind::models::{BelowThresholdAction, Decision, Scenario};
use rust_decimal_macros::dec;

const CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/hivemind.toml");

#[test]
fn shipped_config_is_valid() {
    let config = hivemind::load_config(CONFIG).unwrap();
    assert_eq!(config.agents.len(), 5);
    assert_eq!(config.consensus.min_quorum, 3);
    assert_eq!(config.consensus.min_confidence, dec!(0.85));
    assert_eq!(
        config.consensus.below_threshold_action,
        BelowThresholdAction::Abstain
    );
    assert_eq!(config.breaker.cooldown_seconds, Some(600));
    assert_eq!(config.weight_overrides.len(), 1);
}

#[tokio::test]
async fn shipped_roster_reaches_consensus() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = hivemind::load_config(CONFIG).unwrap();
    config.store.sqlite_path = dir.path().join("journal.db").to_string_lossy().to_string();

    let client = ScriptedClient::new()
        .always("openai/gpt-4o", "RECOMMENDATION: BUY, CONFIDENCE: 90%")
        .always("anthropic/claude-3.5-sonnet", "RECOMMENDATION: BUY, CONFIDENCE: 88%")
        .always("meta-llama/llama-3.3-70b-instruct", "RECOMMENDATION: BUY, CONFIDENCE: 92%")
        .always("google/gemini-pro-1.5", "RECOMMENDATION: BUY, CONFIDENCE: 86%")
        .always("qwen/qwen-2.5-72b-instruct", "RECOMMENDATION: BUY, CONFIDENCE: 90%");

    let engine = hivemind::build_engine_with_client(
        &config,
        Arc::new(StaticCredentials::new().with("OPENROUTER_API_KEY", "sk-or-test")),
        Arc::new(client),
    )
    .unwrap();

    let scenario = Scenario::new("BTC/USDT", serde_json::json!({"price": 67250.5, "rsi": 31}));
    let report = hivemind::evaluate(&engine, &scenario).await;
    assert_eq!(report.result.action, Decision::Buy);
    assert_eq!(report.result.participating_agents, 5);
    assert!(report.result.quorum_met);

    // Same content within the 60 s reuse window is served from the journal
    let again = Scenario::new("BTC/USDT", serde_json::json!({"price": 67250.5, "rsi": 31}));
    let reused = hivemind::evaluate(&engine, &again).await;
    assert!(reused.reused);
    assert_eq!(reused.round_id, report.round_id);
}
