use std::sync::Arc;
use std::time::{Duration, Instant};

use hivemind_models::{AgentResponse, InferenceConfig, Outcome, Scenario};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::inference::{InferenceClient, InferenceRequest};
use crate::parser::parse_response;
use crate::prompts;
use crate::registry::{AgentRegistry, RoundAgent};
use crate::retry::RetryPolicy;

/// Fans a scenario out to a round's agents and collects exactly one response per agent.
///
/// Calls run concurrently, at most `max_concurrency` at a time. When the round
/// deadline fires every task still running is cancelled and recorded as
/// `TIMEOUT`; responses that arrived earlier are kept. Per-agent errors never
/// escape: each becomes the `outcome` of that agent's response.
pub struct RequestDispatcher {
    client: Arc<dyn InferenceClient>,
    registry: Arc<AgentRegistry>,
    retry: RetryPolicy,
    inference: InferenceConfig,
    max_concurrency: usize,
}

impl RequestDispatcher {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        registry: Arc<AgentRegistry>,
        retry: RetryPolicy,
        inference: InferenceConfig,
        max_concurrency: usize,
    ) -> Self {
        Self {
            client,
            registry,
            retry,
            inference,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Run one round of calls. Returns responses in the order of `agents`.
    pub async fn dispatch(
        &self,
        scenario: &Scenario,
        agents: &[RoundAgent],
        round_deadline: Duration,
    ) -> Vec<AgentResponse> {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + round_deadline;
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<(usize, AgentResponse)>(agents.len().max(1));
        let user_prompt = prompts::user_prompt(scenario, &self.inference.instructions);

        let mut tasks = JoinSet::new();
        for (idx, round_agent) in agents.iter().enumerate() {
            let request = InferenceRequest::for_agent(
                &round_agent.agent,
                round_agent.credential.clone(),
                &self.inference,
                prompts::system_prompt(&self.inference.system_prompt, &round_agent.agent.role),
                user_prompt.clone(),
            );
            let delivery = Delivery {
                idx,
                agent_id: round_agent.agent.id.clone(),
                tx: tx.clone(),
                cancel: cancel.clone(),
                started: Instant::now(),
                delivered: false,
            };
            let client = Arc::clone(&self.client);
            let registry = Arc::clone(&self.registry);
            let retry = self.retry.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return,
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };
                let response = call_agent(client.as_ref(), &registry, &retry, &request).await;
                delivery.deliver(response);
            });
        }
        drop(tx);

        let mut slots: Vec<Option<AgentResponse>> = vec![None; agents.len()];
        let mut deadline_hit = false;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((idx, response))) => {
                    log_outcome(&response);
                    slots[idx] = Some(response);
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    break;
                }
            }
        }

        cancel.cancel();
        tasks.abort_all();

        // Keep anything that completed while the deadline fired.
        while let Ok((idx, response)) = rx.try_recv() {
            if slots[idx].is_none() {
                log_outcome(&response);
                slots[idx] = Some(response);
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let missing = if deadline_hit {
            (Outcome::Timeout, "round deadline elapsed before the agent answered")
        } else {
            (Outcome::NetworkError, "agent task ended without a response")
        };

        slots
            .into_iter()
            .zip(agents)
            .map(|(slot, round_agent)| {
                slot.unwrap_or_else(|| {
                    let response = AgentResponse::failure(
                        round_agent.agent.id.clone(),
                        missing.0,
                        elapsed_ms,
                        0,
                        missing.1,
                    );
                    log_outcome(&response);
                    response
                })
            })
            .collect()
    }
}

/// One agent's full call: retries, breaker trip on auth failure, parsing.
async fn call_agent(
    client: &dyn InferenceClient,
    registry: &AgentRegistry,
    retry: &RetryPolicy,
    request: &InferenceRequest,
) -> AgentResponse {
    let started = Instant::now();
    let outcome = retry
        .run(&request.agent_id, || client.complete(request))
        .await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match outcome.result {
        Ok(text) if text.trim().is_empty() => AgentResponse::failure(
            request.agent_id.clone(),
            Outcome::ParseError,
            latency_ms,
            outcome.attempts,
            "empty reply",
        ),
        Ok(text) => {
            let (action, confidence) = parse_response(Some(&text));
            AgentResponse::success(
                request.agent_id.clone(),
                text,
                action,
                confidence,
                latency_ms,
                outcome.attempts,
            )
        }
        Err(e) => {
            if e.trips_breaker() {
                registry.trip(&request.agent_id, &e.to_string());
            }
            AgentResponse::failure(
                request.agent_id.clone(),
                e.outcome(),
                latency_ms,
                outcome.attempts,
                e.to_string(),
            )
        }
    }
}

fn log_outcome(response: &AgentResponse) {
    if response.is_success() {
        info!(
            agent = %response.agent_id,
            action = %response.parsed_action,
            confidence = %response.parsed_confidence,
            latency_ms = response.latency_ms,
            attempts = response.attempts,
            "Agent succeeded"
        );
    } else {
        warn!(
            agent = %response.agent_id,
            outcome = %response.outcome,
            error = response.error.as_deref().unwrap_or(""),
            latency_ms = response.latency_ms,
            attempts = response.attempts,
            "Agent failed"
        );
    }
}

/// Delivers an agent task's response exactly once.
///
/// If the task ends without delivering (a panic) before the round is cancelled,
/// dropping this sends a `NETWORK_ERROR` response in its place.
struct Delivery {
    idx: usize,
    agent_id: String,
    tx: mpsc::Sender<(usize, AgentResponse)>,
    cancel: CancellationToken,
    started: Instant,
    delivered: bool,
}

impl Delivery {
    fn deliver(mut self, response: AgentResponse) {
        self.delivered = true;
        let _ = self.tx.try_send((self.idx, response));
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.delivered || self.cancel.is_cancelled() {
            return;
        }
        let response = AgentResponse::failure(
            self.agent_id.clone(),
            Outcome::NetworkError,
            self.started.elapsed().as_millis() as u64,
            0,
            "agent task ended without a response",
        );
        let _ = self.tx.try_send((self.idx, response));
    }
}
