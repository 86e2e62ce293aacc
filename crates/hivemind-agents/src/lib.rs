pub mod aggregator;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod inference;
pub mod parser;
pub mod prompts;
pub mod registry;
pub mod retry;

pub mod test_support;

pub use aggregator::aggregate;
pub use dispatcher::RequestDispatcher;
pub use engine::Engine;
pub use error::AgentError;
pub use inference::{HttpInferenceClient, InferenceClient, InferenceRequest};
pub use parser::parse_response;
pub use registry::{AgentRegistry, AgentStatus, Credential, CredentialProvider, EnvCredentials, RoundAgent};
pub use retry::{Backoff, CallState, RetryPolicy};
