use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single agent's vote.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    /// Every action, in token-priority order (BUY before SELL before HOLD).
    pub const ALL: [Action; 3] = [Action::Buy, Action::Sell, Action::Hold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Action::Buy),
            "SELL" => Ok(Action::Sell),
            "HOLD" => Ok(Action::Hold),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// How a single agent's participation in a round ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Timeout,
    AuthError,
    RateLimited,
    ParseError,
    NetworkError,
}

impl Outcome {
    pub const ALL: [Outcome; 6] = [
        Outcome::Success,
        Outcome::Timeout,
        Outcome::AuthError,
        Outcome::RateLimited,
        Outcome::ParseError,
        Outcome::NetworkError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Timeout => "TIMEOUT",
            Outcome::AuthError => "AUTH_ERROR",
            Outcome::RateLimited => "RATE_LIMITED",
            Outcome::ParseError => "PARSE_ERROR",
            Outcome::NetworkError => "NETWORK_ERROR",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Outcome::ALL
            .into_iter()
            .find(|o| o.as_str() == s)
            .ok_or_else(|| format!("unknown outcome: {s}"))
    }
}

/// One agent's contribution to a round. Written once by the agent's task,
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResponse {
    pub agent_id: String,
    /// Free text returned by the model. None when no reply arrived.
    pub raw_text: Option<String>,
    pub parsed_action: Action,
    /// Always within [0, 1].
    pub parsed_confidence: Decimal,
    pub latency_ms: u64,
    pub outcome: Outcome,
    /// Number of inference attempts made (0 when the agent never got a slot).
    #[serde(default)]
    pub attempts: u32,
    /// Last error message for non-successful outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResponse {
    pub fn success(
        agent_id: impl Into<String>,
        raw_text: String,
        action: Action,
        confidence: Decimal,
        latency_ms: u64,
        attempts: u32,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            raw_text: Some(raw_text),
            parsed_action: action,
            parsed_confidence: confidence,
            latency_ms,
            outcome: Outcome::Success,
            attempts,
            error: None,
        }
    }

    /// A response that carries no vote. Recorded as HOLD at zero confidence.
    pub fn failure(
        agent_id: impl Into<String>,
        outcome: Outcome,
        latency_ms: u64,
        attempts: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            raw_text: None,
            parsed_action: Action::Hold,
            parsed_confidence: Decimal::ZERO,
            latency_ms,
            outcome,
            attempts,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn action_wire_format_is_uppercase() {
        assert_eq!(serde_json::to_string(&Action::Buy).unwrap(), "\"BUY\"");
        assert_eq!(serde_json::to_string(&Action::Hold).unwrap(), "\"HOLD\"");
        let parsed: Action = serde_json::from_str("\"SELL\"").unwrap();
        assert_eq!(parsed, Action::Sell);
    }

    #[test]
    fn outcome_wire_format() {
        assert_eq!(
            serde_json::to_string(&Outcome::RateLimited).unwrap(),
            "\"RATE_LIMITED\""
        );
        assert_eq!(
            serde_json::to_string(&Outcome::AuthError).unwrap(),
            "\"AUTH_ERROR\""
        );
    }

    #[test]
    fn outcome_from_str_matches_as_str() {
        for outcome in Outcome::ALL {
            assert_eq!(outcome.as_str().parse::<Outcome>().unwrap(), outcome);
        }
        assert!("BOGUS".parse::<Outcome>().is_err());
    }

    #[test]
    fn action_from_str_is_case_insensitive() {
        assert_eq!(" buy ".parse::<Action>().unwrap(), Action::Buy);
        assert!("long".parse::<Action>().is_err());
    }

    #[test]
    fn failure_response_carries_no_vote() {
        let response = AgentResponse::failure("risk", Outcome::Timeout, 30_000, 1, "deadline");
        assert!(!response.is_success());
        assert_eq!(response.parsed_action, Action::Hold);
        assert_eq!(response.parsed_confidence, Decimal::ZERO);
        assert!(response.raw_text.is_none());
    }

    #[test]
    fn roundtrip_success_response() {
        let response = AgentResponse::success(
            "technical",
            "RECOMMENDATION: BUY, CONFIDENCE: 80%".to_string(),
            Action::Buy,
            dec!(0.80),
            1250,
            1,
        );
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("\"error\""));
        let deserialized: AgentResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(response, deserialized);
    }
}
