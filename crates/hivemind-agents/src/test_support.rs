//! Scripted collaborators for exercising the engine without a network.
//!
//! `ScriptedClient` answers each model from a per-model script of replies,
//! errors, and delays. `StaticCredentials` is an in-memory credential provider
//! whose contents tests can change to simulate a credential refresh.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::inference::{InferenceClient, InferenceRequest};
use crate::registry::CredentialProvider;

/// One scripted step for a model.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(String),
    Fail(ScriptedError),
    /// Wait, then perform the inner step.
    Delayed(Duration, Box<Step>),
    /// Never answer.
    Hang,
    /// Panic inside the agent task.
    Panic,
}

impl Step {
    pub fn reply(text: impl Into<String>) -> Self {
        Step::Reply(text.into())
    }

    pub fn after(self, delay: Duration) -> Self {
        Step::Delayed(delay, Box::new(self))
    }
}

/// Errors a script can produce, mirroring the HTTP classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedError {
    Auth,
    RateLimited,
    Server,
    Rejected,
    Timeout,
    Network,
    EmptyContent,
}

impl ScriptedError {
    fn to_error(self) -> AgentError {
        match self {
            ScriptedError::Auth => AgentError::Auth(401),
            ScriptedError::RateLimited => AgentError::RateLimited { retry_after: None },
            ScriptedError::Server => AgentError::Server {
                status: 503,
                body: "service unavailable".to_string(),
            },
            ScriptedError::Rejected => AgentError::Rejected {
                status: 400,
                body: "unknown model".to_string(),
            },
            ScriptedError::Timeout => AgentError::Timeout(10_000),
            ScriptedError::Network => AgentError::Network("connection reset".to_string()),
            ScriptedError::EmptyContent => {
                AgentError::Parse("completion has no content".to_string())
            }
        }
    }
}

/// Inference client that plays back scripts keyed by model identifier.
///
/// Steps are consumed in order; the last step of a script repeats forever.
/// A model with no script replies with an empty string.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a model. Replaces any existing script for it.
    pub fn script(self, model: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model.to_string(), steps.into());
        self
    }

    /// Shorthand for a model that always answers `text`.
    pub fn always(self, model: &str, text: &str) -> Self {
        self.script(model, vec![Step::reply(text)])
    }

    /// Number of calls made to `model`.
    pub fn calls(&self, model: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of calls observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, model: &str) -> Step {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(model.to_string())
            .or_insert(0) += 1;

        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        match scripts.get_mut(model) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap_or(Step::Hang),
            Some(steps) => steps.front().cloned().unwrap_or(Step::Hang),
            None => Step::Reply(String::new()),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl InferenceClient for ScriptedClient {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, AgentError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let mut step = self.next_step(&request.model);
        loop {
            match step {
                Step::Reply(text) => return Ok(text),
                Step::Fail(e) => return Err(e.to_error()),
                Step::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    step = *inner;
                }
                Step::Hang => std::future::pending::<()>().await,
                Step::Panic => panic!("scripted panic for {}", request.model),
            }
        }
    }
}

/// In-memory credential provider.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    entries: Mutex<HashMap<String, String>>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, credential_ref: &str, secret: &str) -> Self {
        self.set(credential_ref, secret);
        self
    }

    pub fn set(&self, credential_ref: &str, secret: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(credential_ref.to_string(), secret.to_string());
    }

    pub fn remove(&self, credential_ref: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(credential_ref);
    }
}

impl CredentialProvider for StaticCredentials {
    fn resolve(&self, credential_ref: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(credential_ref)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Credential;

    fn request(model: &str) -> InferenceRequest {
        InferenceRequest {
            agent_id: model.to_string(),
            endpoint: "http://unused".to_string(),
            model: model.to_string(),
            credential: Credential::new("sk"),
            system_prompt: String::new(),
            user_prompt: String::new(),
            max_tokens: 10,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn script_plays_in_order_and_repeats_last() {
        let client = ScriptedClient::new().script(
            "m",
            vec![Step::Fail(ScriptedError::Server), Step::reply("BUY 70%")],
        );

        assert!(client.complete(&request("m")).await.is_err());
        assert_eq!(client.complete(&request("m")).await.unwrap(), "BUY 70%");
        assert_eq!(client.complete(&request("m")).await.unwrap(), "BUY 70%");
        assert_eq!(client.calls("m"), 3);
    }

    #[tokio::test]
    async fn unscripted_model_replies_empty() {
        let client = ScriptedClient::new();
        assert_eq!(client.complete(&request("x")).await.unwrap(), "");
    }

    #[test]
    fn static_credentials() {
        let creds = StaticCredentials::new().with("A", "1");
        assert_eq!(creds.resolve("A").as_deref(), Some("1"));
        creds.remove("A");
        assert!(creds.resolve("A").is_none());
    }
}
