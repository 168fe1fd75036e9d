//! Chat-client factory: map a model configuration to a concrete client.

use std::sync::Arc;

use fabric_types::{Backend, Feature, FeatureSet, ModelConfig};

use crate::client::ChatClient;
use crate::error::{ProviderError, Result};
use crate::fallback::{FallbackChatClient, FallbackPolicy};
use crate::lenient::LenientChatClient;
use crate::openai_compat::GenericChatClient;

/// Build the chat client for a model profile.
///
/// Dispatch is on `model_config.backend`:
///
/// - `lenient` (default) -- [`LenientChatClient`] with the local-server
///   workarounds (tools-unsupported detection, minimal-payload 400 retry).
/// - `generic` -- bare [`GenericChatClient`] for faithful servers and
///   cloud endpoints.
/// - `inprocess` -- gated behind [`Feature::Inprocess`]; the runtime ships
///   no bundled inference engine, so selection fails with a structured
///   error either way (feature disabled, or engine not bundled).
///
/// When the profile carries a `cloud` block the resulting client is wrapped
/// in a [`FallbackChatClient`] (requires [`Feature::Cloud`]).
pub fn build_chat_client(
    model_config: &ModelConfig,
    features: &FeatureSet,
) -> Result<Arc<dyn ChatClient>> {
    let base: Arc<dyn ChatClient> = match model_config.backend {
        Backend::Lenient => Arc::new(LenientChatClient::new(
            &model_config.base_url,
            &model_config.api_key,
            model_config.timeout_s,
        )),
        Backend::Generic => Arc::new(GenericChatClient::new(
            &model_config.base_url,
            &model_config.api_key,
            model_config.timeout_s,
        )),
        Backend::Inprocess => {
            features.require(
                Feature::Inprocess,
                "Enable 'inprocess' in config features (requires a local inference engine).",
            )?;
            return Err(ProviderError::NotConfigured(
                "the in-process inference engine is not bundled with this build; \
                 configure a 'lenient' or 'generic' backend instead"
                    .into(),
            ));
        }
    };

    let cloud = match &model_config.cloud {
        None => return Ok(base),
        Some(cloud) => cloud,
    };

    features.require(
        Feature::Cloud,
        "Enable 'cloud' in config features to use the cloud fallback.",
    )?;

    let cloud_client: Arc<dyn ChatClient> = Arc::new(GenericChatClient::new(
        &cloud.base_url,
        &cloud.api_key,
        cloud.timeout_s,
    ));
    Ok(Arc::new(FallbackChatClient::new(
        base,
        cloud_client,
        cloud.model.clone(),
        FallbackPolicy::new(&cloud.policy),
    )))
}
