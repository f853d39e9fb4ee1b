use std::sync::Arc;

mod provider;
mod rig_adapter;

pub use provider::{
    ApiKey, FragmentStream, GenerationCapability, ProviderConfig, ProviderError, ProviderResult,
};
pub use rig_adapter::{
    DEFAULT_OPENAI_ENDPOINT, DEFAULT_OPENAI_MODEL, RIG_OPENAI_PROVIDER_ID, RigGenerator,
};

pub fn create_generator(
    mut config: ProviderConfig,
) -> ProviderResult<Arc<dyn GenerationCapability>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = RIG_OPENAI_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "openai" | "rig-openai" => {
            config.provider_id = RIG_OPENAI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigGenerator::new(config)))
        }
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-generator",
            provider_id: config.provider_id,
        }),
    }
}
