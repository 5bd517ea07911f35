use std::sync::Arc;

use model_transport::ModelTransport;
use model_transport_cohere::{CohereTransport, CohereTransportConfig};
use model_transport_mock::MockTransport;

use crate::config::{AgentConfig, FatalStartupError, ProviderKind};

/// Builds the transport selected by `config.provider`.
pub fn transport_from_config(
    config: &AgentConfig,
) -> Result<Arc<dyn ModelTransport>, FatalStartupError> {
    match config.provider {
        ProviderKind::Mock => Ok(Arc::new(MockTransport::default())),
        ProviderKind::Cohere => {
            let api_key = config
                .api_key
                .clone()
                .ok_or(FatalStartupError::MissingCredential("COHERE_API_KEY"))?;
            let mut cohere = CohereTransportConfig::new(api_key);
            if let Some(model) = &config.model {
                cohere = cohere.with_model(model.clone());
            }
            if let Some(base_url) = &config.base_url {
                cohere = cohere.with_base_url(base_url.clone());
            }
            if let Some(timeout) = config.request_timeout {
                cohere = cohere.with_timeout(timeout);
            }
            let transport =
                CohereTransport::new(cohere).map_err(|error| FatalStartupError::Transport {
                    transport: ProviderKind::Cohere.as_str().to_string(),
                    message: error.message().to_string(),
                })?;
            Ok(Arc::new(transport))
        }
    }
}
