use futures::{StreamExt, TryStreamExt, future, stream};
use rig::completion::{CompletionError, CompletionModel, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::openai;
use rig::streaming::StreamedAssistantContent;
use snafu::ResultExt;

use super::provider::{
    ApiKey, CompletionsFailedSnafu, FragmentStream, GenerationCapability, HttpClientSnafu,
    ProviderConfig, ProviderError, ProviderResult,
};

pub const RIG_OPENAI_PROVIDER_ID: &str = "openai";
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

type RigStreamingResponse = rig::streaming::StreamingCompletionResponse<
    rig::providers::openai::responses_api::streaming::StreamingCompletionResponse,
>;

/// Generation capability backed by Rig's OpenAI client.
///
/// A client is built per call so the credential is always the one read at
/// submit time.
pub struct RigGenerator {
    config: ProviderConfig,
}

impl RigGenerator {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    fn build_client(config: &ProviderConfig, api_key: &ApiKey) -> ProviderResult<openai::Client> {
        let mut builder = openai::Client::builder().api_key(api_key.expose());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }

    async fn open_stream(
        config: &ProviderConfig,
        api_key: &ApiKey,
        prompt: String,
    ) -> ProviderResult<RigStreamingResponse> {
        let client = Self::build_client(config, api_key)?;
        let model = client.completion_model(config.model_id.clone());

        tracing::debug!(
            provider_id = %config.provider_id,
            model_id = %config.model_id,
            prompt_len = prompt.len(),
            "opening provider stream"
        );

        let mut builder = model.completion_request(RigMessage::user(prompt));

        if let Some(preamble) = &config.preamble {
            builder = builder.preamble(preamble.clone());
        }

        if let Some(temperature) = config.temperature {
            builder = builder.temperature(temperature);
        }

        if let Some(max_tokens) = config.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        builder.stream().await.context(CompletionsFailedSnafu {
            stage: "open-stream",
        })
    }

    fn map_stream_item<R>(
        item: Result<StreamedAssistantContent<R>, CompletionError>,
    ) -> Option<ProviderResult<String>>
    where
        R: Clone + Unpin,
    {
        match item {
            Ok(StreamedAssistantContent::Text(text)) => {
                if text.text.is_empty() {
                    return None;
                }
                Some(Ok(text.text))
            }
            // Only visible answer text becomes a fragment.
            Ok(StreamedAssistantContent::Reasoning(_))
            | Ok(StreamedAssistantContent::ReasoningDelta { .. })
            | Ok(StreamedAssistantContent::ToolCall { .. })
            | Ok(StreamedAssistantContent::ToolCallDelta { .. })
            | Ok(StreamedAssistantContent::Final(_)) => None,
            Err(source) => {
                tracing::warn!(error = %source, "provider stream emitted an error chunk");
                Some(Err(ProviderError::CompletionsFailed {
                    stage: "stream-chunk",
                    source,
                }))
            }
        }
    }
}

impl GenerationCapability for RigGenerator {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn stream_generate(&self, prompt: &str, api_key: &ApiKey) -> FragmentStream {
        let config = self.config.clone();
        let api_key = api_key.clone();
        let prompt = prompt.to_string();

        stream::once(async move { Self::open_stream(&config, &api_key, prompt).await })
            .map_ok(|response| response.filter_map(|item| future::ready(Self::map_stream_item(item))))
            .try_flatten()
            .boxed()
    }
}
