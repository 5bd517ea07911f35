use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::url::DEFAULT_COHERE_BASE_URL;

/// Default chat model.
pub const DEFAULT_COHERE_MODEL: &str = "command-a-03-2025";

/// Transport configuration for Cohere chat requests.
#[derive(Debug, Clone)]
pub struct CohereApiConfig {
    /// Bearer token passed to `Authorization`.
    pub api_key: String,
    /// Base URL; normalized to the `/v2/chat` endpoint.
    pub base_url: String,
    /// Value of the `X-Client-Name` header.
    pub client_name: String,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Optional whole-request timeout.
    pub timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for CohereApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_COHERE_BASE_URL.to_string(),
            client_name: "workspace-agent".to_string(),
            user_agent: None,
            timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl CohereApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
