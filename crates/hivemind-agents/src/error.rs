use std::time::Duration;

use hivemind_models::{ConfigError, Outcome};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("authentication rejected (HTTP {0})")]
    Auth(u16),

    #[error("rate limited by inference endpoint")]
    RateLimited { retry_after: Option<Duration> },

    #[error("inference endpoint error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    #[error("request rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("inference call timed out after {0} ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] hivemind_store::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// The outcome recorded on an AgentResponse when a call ends with this error.
    pub fn outcome(&self) -> Outcome {
        match self {
            AgentError::Auth(_) => Outcome::AuthError,
            AgentError::RateLimited { .. } => Outcome::RateLimited,
            AgentError::Timeout(_) => Outcome::Timeout,
            AgentError::Parse(_) | AgentError::Json(_) => Outcome::ParseError,
            AgentError::Server { .. }
            | AgentError::Rejected { .. }
            | AgentError::Network(_)
            | AgentError::Config(_)
            | AgentError::Store(_) => Outcome::NetworkError,
        }
    }

    /// Transient failures worth another attempt after backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::RateLimited { .. }
                | AgentError::Server { .. }
                | AgentError::Timeout(_)
                | AgentError::Network(_)
        )
    }

    /// Auth failures open the agent's circuit breaker.
    pub fn trips_breaker(&self) -> bool {
        matches!(self, AgentError::Auth(_))
    }

    /// Server-requested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AgentError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(AgentError::Auth(401).outcome(), Outcome::AuthError);
        assert!(!AgentError::Auth(403).is_retryable());
        assert!(AgentError::Auth(403).trips_breaker());

        let limited = AgentError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(limited.outcome(), Outcome::RateLimited);
        assert!(limited.is_retryable());
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(2)));

        let server = AgentError::Server {
            status: 503,
            body: String::new(),
        };
        assert_eq!(server.outcome(), Outcome::NetworkError);
        assert!(server.is_retryable());

        let rejected = AgentError::Rejected {
            status: 400,
            body: "bad model".to_string(),
        };
        assert_eq!(rejected.outcome(), Outcome::NetworkError);
        assert!(!rejected.is_retryable());

        assert_eq!(AgentError::Timeout(10_000).outcome(), Outcome::Timeout);
        assert!(AgentError::Network("reset".into()).is_retryable());
        assert_eq!(AgentError::Parse("empty".into()).outcome(), Outcome::ParseError);
        assert!(!AgentError::Parse("empty".into()).is_retryable());
    }
}
