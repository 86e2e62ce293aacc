use std::future::Future;
use std::time::Duration;

use hivemind_models::RetryConfig;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::AgentError;

/// Per-agent call lifecycle within a round.
///
/// `Pending -> InFlight -> {Success | Retryable -> (backoff) -> Pending | TerminalFailure}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Pending,
    InFlight,
    Success,
    Retryable,
    TerminalFailure,
}

/// Exponential backoff with +/- jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay before the next retry. Advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let unit = rand::thread_rng().gen_range(-1.0..=1.0);
        let delay = self.delay_for(self.attempt, unit);
        self.attempt += 1;
        delay
    }

    /// Delay for retry number `attempt` (0-based) with jitter position `unit` in [-1, 1].
    pub fn delay_for(&self, attempt: u32, unit: f64) -> Duration {
        let base = self.config.base_delay_ms as f64;
        let max = self.config.max_delay_ms as f64;
        let exp = attempt.min(i32::MAX as u32) as i32;

        let capped = (base * self.config.multiplier.powi(exp)).min(max);
        let jitter = unit.clamp(-1.0, 1.0) * capped * self.config.jitter_factor;
        let final_ms = (capped + jitter).clamp(0.0, max.max(base));

        Duration::from_millis(final_ms as u64)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.config.max_delay_ms)
    }
}

/// Result of running one agent's call through the retry policy.
#[derive(Debug)]
pub struct CallOutcome {
    pub result: Result<String, AgentError>,
    /// Number of attempts made, including the first.
    pub attempts: u32,
}

/// Retries transient failures with backoff up to `max_retries_per_agent`.
///
/// Each agent runs its own policy, so one agent's backoff never delays another.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries_per_agent
    }

    pub async fn run<F, Fut>(&self, agent_id: &str, mut call: F) -> CallOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, AgentError>>,
    {
        let mut backoff = Backoff::new(self.config.clone());
        let mut attempts = 0u32;
        let mut state = CallState::Pending;

        loop {
            transition(agent_id, &mut state, CallState::InFlight, attempts + 1);
            attempts += 1;

            let err = match call().await {
                Ok(text) => {
                    transition(agent_id, &mut state, CallState::Success, attempts);
                    return CallOutcome {
                        result: Ok(text),
                        attempts,
                    };
                }
                Err(e) => e,
            };

            if !err.is_retryable() || attempts > self.config.max_retries_per_agent {
                transition(agent_id, &mut state, CallState::TerminalFailure, attempts);
                return CallOutcome {
                    result: Err(err),
                    attempts,
                };
            }

            transition(agent_id, &mut state, CallState::Retryable, attempts);
            let mut delay = backoff.next_delay();
            if let Some(requested) = err.retry_after() {
                delay = delay.max(requested.min(backoff.max_delay()));
            }
            warn!(
                agent = %agent_id,
                attempt = attempts,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Retrying agent call"
            );
            tokio::time::sleep(delay).await;
            transition(agent_id, &mut state, CallState::Pending, attempts);
        }
    }
}

fn transition(agent_id: &str, state: &mut CallState, next: CallState, attempt: u32) {
    debug!(agent = %agent_id, from = ?state, to = ?next, attempt, "Call state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries_per_agent: max_retries,
            base_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let backoff = Backoff::new(RetryConfig {
            max_retries_per_agent: 5,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
            multiplier: 2.0,
            jitter_factor: 0.3,
        });

        assert_eq!(backoff.delay_for(0, 0.0), Duration::from_millis(250));
        assert_eq!(backoff.delay_for(1, 0.0), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(2, 0.0), Duration::from_millis(1_000));
        assert_eq!(backoff.delay_for(10, 0.0), Duration::from_millis(4_000));

        // +/- 30% jitter, never above the cap
        assert_eq!(backoff.delay_for(1, 1.0), Duration::from_millis(650));
        assert_eq!(backoff.delay_for(1, -1.0), Duration::from_millis(350));
        assert_eq!(backoff.delay_for(10, 1.0), Duration::from_millis(4_000));
    }

    #[test]
    fn next_delay_stays_in_jitter_band() {
        let mut backoff = Backoff::new(RetryConfig::default());
        for _ in 0..20 {
            let d = backoff.next_delay();
            assert!(d <= Duration::from_millis(4_000));
        }
        assert_eq!(backoff.attempt(), 20);
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let policy = RetryPolicy::new(fast_config(3));
        let outcome = policy
            .run("a", || async { Ok("BUY 80%".to_string()) })
            .await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result.unwrap(), "BUY 80%");
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(fast_config(3));
        let outcome = policy
            .run("a", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AgentError::Server {
                            status: 503,
                            body: String::new(),
                        })
                    } else {
                        Ok("SELL".to_string())
                    }
                }
            })
            .await;
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.result.is_ok());
    }

    #[tokio::test]
    async fn exhausts_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(fast_config(2));
        let outcome = policy
            .run("a", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AgentError::RateLimited { retry_after: None }) }
            })
            .await;
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            outcome.result,
            Err(AgentError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn auth_error_is_never_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(fast_config(3));
        let outcome = policy
            .run("a", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AgentError::Auth(401)) }
            })
            .await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(outcome.result, Err(AgentError::Auth(401))));
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let policy = RetryPolicy::new(fast_config(0));
        let outcome = policy
            .run("a", || async { Err(AgentError::Timeout(10)) })
            .await;
        assert_eq!(outcome.attempts, 1);
    }
}
