use std::time::Duration;

use async_trait::async_trait;
use hivemind_models::{Agent, InferenceConfig};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AgentError;
use crate::registry::Credential;

/// Everything needed for one chat-completion call to one agent.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub agent_id: String,
    pub endpoint: String,
    pub model: String,
    pub credential: Credential,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl InferenceRequest {
    /// Build the request for `agent`, falling back to the shared inference settings
    /// where the agent has no override.
    pub fn for_agent(
        agent: &Agent,
        credential: Credential,
        config: &InferenceConfig,
        system_prompt: String,
        user_prompt: String,
    ) -> Self {
        Self {
            agent_id: agent.id.clone(),
            endpoint: agent
                .endpoint
                .clone()
                .unwrap_or_else(|| config.endpoint.clone()),
            model: agent.model.clone(),
            credential,
            system_prompt,
            user_prompt,
            max_tokens: agent.max_tokens.unwrap_or(config.max_tokens),
            temperature: config.temperature,
        }
    }
}

/// A single model call. Mockable for testing.
///
/// Implementations return the reply text or a classified `AgentError`; they never retry.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, AgentError>;
}

/// OpenAI-compatible chat-completions client (OpenRouter by default).
#[derive(Clone)]
pub struct HttpInferenceClient {
    http: reqwest::Client,
    timeout: Duration,
    max_retry_after: Duration,
}

impl HttpInferenceClient {
    pub fn new(timeout: Duration, max_retry_after: Duration) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AgentError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(http, timeout, max_retry_after))
    }

    pub fn with_client(http: reqwest::Client, timeout: Duration, max_retry_after: Duration) -> Self {
        Self {
            http,
            timeout,
            max_retry_after,
        }
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, AgentError> {
        debug!(agent = %request.agent_id, model = %request.model, "Sending inference request");

        let body = ChatCompletionRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let resp = self
            .http
            .post(&request.endpoint)
            .timeout(self.timeout)
            .bearer_auth(request.credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs).min(self.max_retry_after));
        let text = resp.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(classify_status(status, retry_after, &text));
        }

        extract_content(&text)
    }
}

impl HttpInferenceClient {
    fn transport_error(&self, e: reqwest::Error) -> AgentError {
        if e.is_timeout() {
            AgentError::Timeout(self.timeout.as_millis() as u64)
        } else {
            AgentError::Network(e.to_string())
        }
    }
}

/// Map a non-2xx status to the error taxonomy.
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> AgentError {
    let snippet: String = body.chars().take(400).collect();
    match status.as_u16() {
        401 | 403 => AgentError::Auth(status.as_u16()),
        429 => AgentError::RateLimited { retry_after },
        s if status.is_server_error() => AgentError::Server {
            status: s,
            body: snippet,
        },
        s => AgentError::Rejected {
            status: s,
            body: snippet,
        },
    }
}

/// Pull `choices[0].message.content` out of a chat-completions body.
pub fn extract_content(body: &str) -> Result<String, AgentError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| AgentError::Parse(format!("invalid completion body: {e}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| AgentError::Parse("completion has no content".to_string()))
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageOut>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, None, ""),
            AgentError::Auth(401)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, None, ""),
            AgentError::Auth(403)
        ));
        assert!(matches!(
            classify_status(
                StatusCode::TOO_MANY_REQUESTS,
                Some(Duration::from_secs(3)),
                ""
            ),
            AgentError::RateLimited {
                retry_after: Some(d)
            } if d == Duration::from_secs(3)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None, "upstream"),
            AgentError::Server { status: 502, .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, None, "unknown model"),
            AgentError::Rejected { status: 400, .. }
        ));
    }

    #[test]
    fn extract_content_from_completion() {
        let body = r#"{"id":"gen-1","choices":[{"message":{"role":"assistant","content":"RECOMMENDATION: BUY, CONFIDENCE: 80%"}}]}"#;
        assert_eq!(
            extract_content(body).unwrap(),
            "RECOMMENDATION: BUY, CONFIDENCE: 80%"
        );
    }

    #[test]
    fn missing_or_empty_content_is_parse_error() {
        for body in [
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{"choices":[{"message":{"content":"  "}}]}"#,
            "not json",
        ] {
            assert!(matches!(extract_content(body), Err(AgentError::Parse(_))), "{body}");
        }
    }

    #[test]
    fn request_uses_agent_overrides() {
        let config = InferenceConfig::default();
        let mut agent = Agent::new("risk", "anthropic/claude-3-opus", "KEY", dec!(1.8), "risk");
        agent.endpoint = Some("http://localhost:9000/v1/chat/completions".to_string());
        agent.max_tokens = Some(64);

        let request = InferenceRequest::for_agent(
            &agent,
            Credential::new("sk"),
            &config,
            "sys".to_string(),
            "user".to_string(),
        );
        assert_eq!(request.endpoint, "http://localhost:9000/v1/chat/completions");
        assert_eq!(request.max_tokens, 64);

        let plain = Agent::new("flow", "qwen", "KEY", dec!(1.0), "flow");
        let request = InferenceRequest::for_agent(
            &plain,
            Credential::new("sk"),
            &config,
            "sys".to_string(),
            "user".to_string(),
        );
        assert_eq!(request.endpoint, config.endpoint);
        assert_eq!(request.max_tokens, config.max_tokens);
    }

    #[test]
    fn request_body_shape() {
        let body = ChatCompletionRequest {
            model: "openai/gpt-4o",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "s",
                },
                ChatMessage {
                    role: "user",
                    content: "u",
                },
            ],
            max_tokens: 200,
            temperature: 0.7,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "openai/gpt-4o");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["max_tokens"], 200);
    }
}
