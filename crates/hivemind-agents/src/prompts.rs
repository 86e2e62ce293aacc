use hivemind_models::Scenario;

/// Fill the `{role}` placeholder of the configured system prompt.
pub fn system_prompt(template: &str, role: &str) -> String {
    template.replace("{role}", role)
}

/// Render a scenario into the user message every agent receives.
///
/// The payload is opaque to the engine and is embedded as pretty-printed JSON,
/// followed by the answer-format instructions.
pub fn user_prompt(scenario: &Scenario, instructions: &str) -> String {
    let mut prompt = format!("Symbol: {}\n", scenario.symbol);

    if !scenario.tags.is_empty() {
        prompt.push_str(&format!("Conditions: {}\n", scenario.tags.join(", ")));
    }

    if !scenario.payload.is_null() {
        let context = serde_json::to_string_pretty(&scenario.payload).unwrap_or_default();
        prompt.push_str(&format!("\nMarket context:\n{context}\n"));
    }

    prompt.push('\n');
    prompt.push_str(instructions);
    prompt
}
