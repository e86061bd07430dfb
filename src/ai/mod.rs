pub mod prompt;
pub mod seo;

use std::fmt::{Display, Formatter};
use std::time::Duration;

use async_openai::Client;
use async_openai::config::{Config, OpenAIConfig};
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use clap::ValueEnum;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, trace};

use crate::{AppError, AppResult};

/// OpenAI-compatible backends with known defaults.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Provider {
    /// Mistral AI's hosted API
    #[default]
    Mistral,
    /// OpenAI's hosted API
    #[value(name = "openai")]
    OpenAi,
    /// A local LM Studio server
    LmStudio,
}

impl Provider {
    pub fn api_base(&self) -> &'static str {
        match self {
            Provider::Mistral => "https://api.mistral.ai/v1",
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::LmStudio => "http://localhost:1234/v1",
        }
    }

    pub fn chat_model(&self) -> &'static str {
        match self {
            Provider::Mistral => "mistral-large-latest",
            Provider::OpenAi => "gpt-4-turbo-preview",
            Provider::LmStudio => "openai/gpt-oss-20b",
        }
    }

    pub fn embedding_model(&self) -> &'static str {
        match self {
            Provider::Mistral => "mistral-embed",
            Provider::OpenAi => "text-embedding-3-small",
            Provider::LmStudio => "text-embedding-nomic-embed-text-v1.5",
        }
    }

    /// Environment variable holding the provider's API key, if it needs one.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::Mistral => Some("MISTRAL_API_KEY"),
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::LmStudio => None,
        }
    }
}

impl Display for Provider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Provider::Mistral => "mistral",
            Provider::OpenAi => "openai",
            Provider::LmStudio => "lm-studio",
        };
        write!(f, "{s}")
    }
}

/// Build an async-openai client for any OpenAI-compatible server.
#[tracing::instrument(name = "Connecting to the LLM API", level = "debug", skip(api_key))]
pub fn build_client(api_base: &str, api_key: Option<&str>) -> Client<Box<dyn Config>> {
    // An explicit empty key keeps OPENAI_API_KEY from leaking to other providers.
    let config = OpenAIConfig::default()
        .with_api_base(api_base)
        .with_api_key(api_key.unwrap_or_default());
    Client::with_config(Box::new(config) as Box<dyn Config>)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

/// One role-tagged message of a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    fn to_request(&self) -> AppResult<ChatCompletionRequestMessage> {
        Ok(match self.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(self.content.as_str())
                .build()?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(self.content.as_str())
                .build()?
                .into(),
        })
    }
}

/// Anything that answers a chat conversation with text.
pub trait ChatModel: Send + Sync {
    fn complete<'a>(&'a self, messages: &'a [ChatMessage]) -> BoxFuture<'a, AppResult<String>>;
}

/// Chat completions against an OpenAI-compatible `/chat/completions` endpoint.
pub struct LlmClient {
    client: Client<Box<dyn Config>>,
    model: String,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(client: Client<Box<dyn Config>>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl ChatModel for LlmClient {
    fn complete<'a>(&'a self, messages: &'a [ChatMessage]) -> BoxFuture<'a, AppResult<String>> {
        async move {
            let request = CreateChatCompletionRequestArgs::default()
                .model(&self.model)
                .messages(
                    messages
                        .iter()
                        .map(ChatMessage::to_request)
                        .collect::<AppResult<Vec<_>>>()?,
                )
                .build()?;

            debug!("Sending {} messages to {}", messages.len(), self.model);
            let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
                .await
                .map_err(|_| AppError::Timeout(self.timeout))??;
            trace!("AI Response: {:?}", response);

            response
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .filter(|content| !content.trim().is_empty())
                .ok_or(AppError::EmptyResponse)
        }
        .boxed()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every conversation and answers with a canned reply, or fails when the
    /// conversation mentions `fail_on`.
    #[derive(Default)]
    pub(crate) struct RecordingModel {
        pub(crate) fail_on: Option<String>,
        pub(crate) seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ChatModel for RecordingModel {
        fn complete<'a>(&'a self, messages: &'a [ChatMessage]) -> BoxFuture<'a, AppResult<String>> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let fail = self
                .fail_on
                .as_deref()
                .is_some_and(|needle| messages.iter().any(|m| m.content.contains(needle)));
            async move {
                if fail {
                    Err(AppError::EmptyResponse)
                } else {
                    Ok(format!("reply #{}", messages.len()))
                }
            }
            .boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_presets() {
        assert_eq!(Provider::default(), Provider::Mistral);
        assert_eq!(Provider::Mistral.embedding_model(), "mistral-embed");
        assert_eq!(Provider::OpenAi.api_key_env(), Some("OPENAI_API_KEY"));
        assert_eq!(Provider::LmStudio.api_key_env(), None);
        assert!(Provider::LmStudio.api_base().starts_with("http://localhost"));
    }

    #[test]
    fn provider_names_round_trip_through_clap() {
        for provider in Provider::value_variants() {
            let parsed = Provider::from_str(&provider.to_string(), false).unwrap();
            assert_eq!(&parsed, provider);
        }
    }

    #[test]
    fn messages_convert_to_request_roles() {
        let system = ChatMessage::system("be brief").to_request().unwrap();
        let user = ChatMessage::user("hi").to_request().unwrap();
        assert!(matches!(system, ChatCompletionRequestMessage::System(_)));
        assert!(matches!(user, ChatCompletionRequestMessage::User(_)));
    }
}
