use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Decision context for one round, produced outside the engine.
///
/// The engine never interprets `payload`; it is rendered into the prompt verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub symbol: String,
    /// Labels such as "high_volatility" that select weight overrides.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Arbitrary structured context: price, indicator snapshot, etc.
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default = "Utc::now")]
    pub produced_at: DateTime<Utc>,
}

impl Scenario {
    pub fn new(symbol: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            tags: Vec::new(),
            payload,
            produced_at: Utc::now(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Canonical JSON of the decision-relevant content (symbol, tags, payload).
    ///
    /// Two scenarios with the same content share a fingerprint regardless of
    /// id or production time. Object keys are emitted sorted.
    pub fn fingerprint(&self) -> String {
        let mut tags = self.tags.clone();
        tags.sort();
        tags.dedup();
        serde_json::json!({
            "symbol": self.symbol,
            "tags": tags,
            "payload": self.payload,
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_scenario_json_fills_defaults() {
        let scenario: Scenario = serde_json::from_str(r#"{"symbol": "BTC/USDT"}"#).unwrap();
        assert_eq!(scenario.symbol, "BTC/USDT");
        assert!(scenario.tags.is_empty());
        assert!(scenario.payload.is_null());
    }

    #[test]
    fn fingerprint_ignores_identity_and_key_order() {
        let a: Scenario = serde_json::from_str(
            r#"{"symbol": "ETH/USDT", "tags": ["b", "a"], "payload": {"rsi": 35, "price": 3100.5}}"#,
        )
        .unwrap();
        let b: Scenario = serde_json::from_str(
            r#"{"symbol": "ETH/USDT", "tags": ["a", "b"], "payload": {"price": 3100.5, "rsi": 35}}"#,
        )
        .unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_differs_on_payload() {
        let a = Scenario::new("BTC/USDT", serde_json::json!({"rsi": 35}));
        let b = Scenario::new("BTC/USDT", serde_json::json!({"rsi": 36}));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn tags() {
        let scenario = Scenario::new("SOL/USDT", serde_json::Value::Null).with_tag("high_volatility");
        assert!(scenario.has_tag("high_volatility"));
        assert!(!scenario.has_tag("calm"));
    }
}
