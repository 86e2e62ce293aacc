use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One configured voter: a model endpoint, a credential reference, and an importance weight.
///
/// The credential itself never lives here. `credential_ref` names an entry that a
/// credential provider resolves at startup (by default, an environment variable).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: String,
    /// Model identifier sent in the `model` field of the inference request.
    pub model: String,
    pub credential_ref: String,
    /// Strictly positive. Fixed for the duration of a round.
    pub weight: Decimal,
    /// Role label used in the system prompt and for weight overrides (e.g. "risk").
    pub role: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Override for `InferenceConfig::endpoint`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Override for `InferenceConfig::max_tokens`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        credential_ref: impl Into<String>,
        weight: Decimal,
        role: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            credential_ref: credential_ref.into(),
            weight,
            role: role.into(),
            enabled: true,
            endpoint: None,
            max_tokens: None,
        }
    }
}

fn default_true() -> bool {
    true
}
