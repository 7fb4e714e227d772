//! Completion relay.
//!
//! Assembles the prompt from the caller's history and forwards it to an
//! OpenAI-compatible chat completions endpoint. Without a configured provider
//! the relay answers locally by echoing the last user message, so the browser
//! client can be developed without credentials.
//!
//! The mode is fixed when the relay is built and never re-derived per request.

use async_trait::async_trait;
use huzi_core::chat::{build_prompt, sanitize_history};
use huzi_core::config::ProviderConfig;
use huzi_core::{ChatMessage, ChatReply, ChatRole, IncomingMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reply used when the provider answers with an empty choice.
pub const NO_CONTENT_REPLY: &str = "(no content)";

/// Echo-mode reply for `text`.
pub fn echo_reply(text: &str) -> String {
    format!("I heard you: \"{text}\". This is a simulated reply for local development.")
}

/// Assistant-styled message for a failed upstream call.
pub fn upstream_busy_reply(detail: &str) -> String {
    format!("(upstream busy: {detail})")
}

/// Failure talking to the completion provider.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {detail}")]
    Upstream { status: u16, detail: String },

    /// The provider did not answer within the configured timeout.
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The request never produced a response (connect, TLS, decode).
    #[error("{0}")]
    Transport(String),
}

impl RelayError {
    /// Detail embedded in the assistant-styled error reply.
    pub fn detail(&self) -> String {
        match self {
            Self::Upstream { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }
}

/// Wire body of a chat completions request.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub stream: bool,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<CompletionMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Value,
}

impl CompletionResponse {
    /// Text of the first choice, if it carries any.
    fn first_content(&self) -> Option<String> {
        let content = &self.choices.first()?.message.as_ref()?.content;
        let text = match content {
            Value::Null | Value::Bool(false) => return None,
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        (!text.is_empty()).then_some(text)
    }
}

/// A remote service that turns a prompt into assistant text.
#[async_trait]
pub trait CompletionProvider: Send + Sync + 'static {
    /// Run one completion. `Ok(None)` means the provider returned no content.
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, RelayError>;

    /// Name used in logs.
    fn provider_name(&self) -> &'static str;
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(endpoint: String, api_key: String, timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, RelayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("upstream error")
                    .to_string()
            } else {
                body
            };
            return Err(RelayError::Upstream {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        match serde_json::from_slice::<CompletionResponse>(&body) {
            Ok(parsed) => Ok(parsed.first_content()),
            Err(e) => {
                tracing::warn!(error = %e, "Completion response was not valid JSON");
                Ok(None)
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

impl OpenAiProvider {
    fn classify(&self, err: reqwest::Error) -> RelayError {
        if err.is_timeout() {
            RelayError::Timeout(self.timeout)
        } else {
            RelayError::Transport(err.to_string())
        }
    }
}

/// How the relay answers, decided once at startup.
#[derive(Clone)]
pub enum ProviderMode {
    /// Forward to a remote provider with a default model.
    Remote {
        provider: Arc<dyn CompletionProvider>,
        model: String,
    },
    /// Answer locally by echoing the last user message.
    Echo,
}

impl std::fmt::Debug for ProviderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote { provider, model } => f
                .debug_struct("Remote")
                .field("provider", &provider.provider_name())
                .field("model", model)
                .finish(),
            Self::Echo => f.write_str("Echo"),
        }
    }
}

/// Caller-supplied knobs for one completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionOptions<'a> {
    pub system_prompt: Option<&'a str>,
    pub model: Option<&'a str>,
    pub temperature: Option<f64>,
}

/// Result of a successful relay call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub reply: ChatReply,
    /// Whether the reply came from the remote provider.
    pub remote: bool,
}

/// Prompt assembly plus provider dispatch.
#[derive(Clone, Debug)]
pub struct CompletionRelay {
    mode: ProviderMode,
    system_prompt: Option<String>,
    default_temperature: f64,
}

impl CompletionRelay {
    pub fn new(mode: ProviderMode, system_prompt: Option<String>, default_temperature: f64) -> Self {
        Self {
            mode,
            system_prompt: system_prompt.filter(|s| !s.trim().is_empty()),
            default_temperature,
        }
    }

    /// Build the relay from configuration.
    ///
    /// Remote mode requires both a credential and a default model; anything
    /// less falls back to echo mode.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, RelayError> {
        let mode = match (&config.api_key, &config.model) {
            (Some(key), Some(model)) if config.is_configured() => {
                let provider =
                    OpenAiProvider::new(config.endpoint(), key.trim().to_string(), config.timeout())?;
                ProviderMode::Remote {
                    provider: Arc::new(provider),
                    model: model.trim().to_string(),
                }
            }
            _ => ProviderMode::Echo,
        };
        Ok(Self::new(
            mode,
            config.system_prompt.clone(),
            config.default_temperature,
        ))
    }

    pub fn mode(&self) -> &ProviderMode {
        &self.mode
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.mode, ProviderMode::Remote { .. })
    }

    /// Answer the conversation `messages`.
    ///
    /// Ephemeral and content-less messages are dropped and roles normalised
    /// before anything is forwarded.
    pub async fn complete(
        &self,
        messages: &[IncomingMessage],
        options: CompletionOptions<'_>,
    ) -> Result<Completion, RelayError> {
        let history = sanitize_history(messages);

        let (provider, default_model) = match &self.mode {
            ProviderMode::Echo => {
                let last_user = history
                    .iter()
                    .rev()
                    .find(|m| m.role == ChatRole::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                return Ok(Completion {
                    reply: ChatReply::assistant(echo_reply(last_user)),
                    remote: false,
                });
            }
            ProviderMode::Remote { provider, model } => (provider, model),
        };

        let system_prompt = options.system_prompt.or(self.system_prompt.as_deref());
        let request = CompletionRequest {
            model: options.model.unwrap_or(default_model).to_string(),
            messages: build_prompt(system_prompt, &history),
            temperature: options.temperature.unwrap_or(self.default_temperature),
            stream: false,
        };

        let started = Instant::now();
        let result = provider.complete(&request).await;
        crate::metrics::UPSTREAM_COMPLETION_DURATION.observe(started.elapsed().as_secs_f64());

        let content = result?;
        Ok(Completion {
            reply: ChatReply::assistant(content.unwrap_or_else(|| NO_CONTENT_REPLY.to_string())),
            remote: true,
        })
    }
}
