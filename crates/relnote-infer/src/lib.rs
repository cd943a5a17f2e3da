use std::collections::VecDeque;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use relnote_config::{InferenceConfig, InferenceProviderKind};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

mod payload;

pub use payload::{Payload, extract_payload, strip_code_fence, text_field};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_API_KEY_HEADER: &str = "x-goog-api-key";
const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";
const OPENAI_COMPATIBLE_DEFAULT_MODEL: &str = "qwen-plus";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// What the caller expects back from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Json,
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
    pub shape: ResponseShape,
}

impl GenerationRequest {
    pub fn user(content: impl Into<String>, shape: ResponseShape) -> Self {
        Self {
            messages: vec![Message {
                role: Role::User,
                content: content.into(),
            }],
            shape,
        }
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderOverrides {
    pub provider: Option<InferenceProviderKind>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
}

pub struct LoadedGenerator {
    pub generator: Arc<dyn TextGenerator>,
    pub provider_name: String,
    pub model_name: String,
}

#[derive(Debug, Error)]
pub enum InferError {
    #[error("missing API key in {0}")]
    MissingApiKey(String),
    #[error("openai_compatible provider requires an endpoint")]
    MissingEndpoint,
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("response decoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
    #[error("scripted generator has no response left for request #{0}")]
    ScriptExhausted(usize),
    #[error("failed to lock shared resource: {0}")]
    LockPoisoned(String),
}

impl From<reqwest::Error> for InferError {
    /// Request URLs may carry credentials, so they never reach error text.
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.without_url())
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, InferError>;
}

/// Offline generator: canned JSON for structured requests, echo for markdown.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockGenerator;

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, InferError> {
        match request.shape {
            ResponseShape::Json => Ok(json!({
                "highlight": "Mock highlight",
                "value": "Mock value",
                "category": "feature",
                "score": 50,
                "usage_background": "Mock background",
                "feature_details": "Mock details",
                "usage_guide": "Mock usage guide",
                "value_proposition": "Mock value proposition"
            })
            .to_string()),
            ResponseShape::Markdown => Ok(request.last_user_message().unwrap_or_default().to_owned()),
        }
    }
}

/// Replays queued responses in order and records every request it receives.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String, InferError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let generator = Self::new();
        for response in responses {
            generator.push_ok(response);
        }
        generator
    }

    pub fn push_ok(&self, response: impl Into<String>) {
        self.queue().push_back(Ok(response.into()));
    }

    pub fn push_err(&self, error: InferError) {
        self.queue().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, InferError>>> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, InferError> {
        let index = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|err| InferError::LockPoisoned(err.to_string()))?;
            requests.push(request.clone());
            requests.len()
        };

        self.responses
            .lock()
            .map_err(|err| InferError::LockPoisoned(err.to_string()))?
            .pop_front()
            .unwrap_or(Err(InferError::ScriptExhausted(index)))
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAiCompatibleGenerator {
    pub fn new(
        endpoint: String,
        model: String,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, InferError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            model,
            api_key,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, InferError> {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": 0.0
        });
        if request.shape == ResponseShape::Json {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let response_value: Value = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        extract_completion_text(&response_value)
    }
}

#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl GeminiGenerator {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, InferError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key,
            model,
            api_base: GEMINI_API_BASE.to_owned(),
        })
    }

    /// Points the generator at another API root, such as a proxy.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_owned();
        self
    }

    fn endpoint_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, InferError> {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::Assistant => "model",
                    Role::System | Role::User => "user",
                };
                json!({ "role": role, "parts": [{ "text": message.content }] })
            })
            .collect();
        let mime_type = match request.shape {
            ResponseShape::Json => "application/json",
            ResponseShape::Markdown => "text/plain",
        };
        let body = json!({
            "contents": contents,
            "generationConfig": {
                "responseMimeType": mime_type,
                "temperature": 0.0
            }
        });

        let response_value: Value = self
            .client
            .post(self.endpoint_url())
            .header(GEMINI_API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        extract_gemini_text_part(&response_value).map(|text| text.to_owned())
    }
}

/// Picks the generator for a run from config, with CLI overrides taking precedence.
///
/// `auto` resolves to openai_compatible when a key and an endpoint are both
/// present, to gemini when only the key is present, and to mock otherwise.
pub fn load_generator(
    config: &InferenceConfig,
    overrides: ProviderOverrides,
) -> Result<LoadedGenerator, InferError> {
    let selected_provider = overrides.provider.unwrap_or(config.provider);
    let selected_model = first_non_empty(overrides.model, config.model.clone());
    let selected_endpoint = first_non_empty(overrides.endpoint, config.endpoint.clone());
    let selected_api_key_env =
        first_non_empty(overrides.api_key_env, Some(config.api_key_env.clone()))
            .unwrap_or_else(|| relnote_config::DEFAULT_API_KEY_ENV.to_owned());
    let timeout = Duration::from_secs(config.timeout_secs.max(1));

    let resolved = match selected_provider {
        InferenceProviderKind::Auto => {
            match (
                read_env_non_empty(&selected_api_key_env),
                selected_endpoint.is_some(),
            ) {
                (Some(_), true) => InferenceProviderKind::OpenaiCompatible,
                (Some(_), false) => InferenceProviderKind::Gemini,
                (None, _) => InferenceProviderKind::Mock,
            }
        }
        explicit => explicit,
    };
    tracing::debug!(
        requested = selected_provider.as_str(),
        resolved = resolved.as_str(),
        "selected text generator"
    );

    match resolved {
        InferenceProviderKind::Auto | InferenceProviderKind::Mock => Ok(LoadedGenerator {
            generator: Arc::new(MockGenerator),
            provider_name: InferenceProviderKind::Mock.as_str().to_owned(),
            model_name: "mock".to_owned(),
        }),
        InferenceProviderKind::OpenaiCompatible => {
            let endpoint = selected_endpoint.ok_or(InferError::MissingEndpoint)?;
            let api_key = read_env_non_empty(&selected_api_key_env)
                .ok_or_else(|| InferError::MissingApiKey(selected_api_key_env.clone()))?;
            let model =
                selected_model.unwrap_or_else(|| OPENAI_COMPATIBLE_DEFAULT_MODEL.to_owned());
            let generator =
                OpenAiCompatibleGenerator::new(endpoint, model.clone(), api_key, timeout)?;
            Ok(LoadedGenerator {
                generator: Arc::new(generator),
                provider_name: InferenceProviderKind::OpenaiCompatible.as_str().to_owned(),
                model_name: model,
            })
        }
        InferenceProviderKind::Gemini => {
            let api_key = read_env_non_empty(&selected_api_key_env)
                .ok_or_else(|| InferError::MissingApiKey(selected_api_key_env.clone()))?;
            let model = selected_model.unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_owned());
            let generator = GeminiGenerator::new(api_key, model.clone(), timeout)?;
            Ok(LoadedGenerator {
                generator: Arc::new(generator),
                provider_name: InferenceProviderKind::Gemini.as_str().to_owned(),
                model_name: model,
            })
        }
    }
}

fn extract_gemini_text_part(response: &Value) -> Result<&str, InferError> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .and_then(|parts| parts.first())
        .and_then(|part| part.get("text"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            InferError::InvalidResponse("missing candidates[0].content.parts[0].text".to_owned())
        })
}

fn extract_completion_text(response: &Value) -> Result<String, InferError> {
    let candidate_paths = [
        "/choices/0/message/content",
        "/choices/0/text",
        "/output/text",
    ];

    for path in candidate_paths {
        if let Some(text) = response.pointer(path).and_then(Value::as_str) {
            return Ok(text.to_owned());
        }
    }

    Err(InferError::InvalidResponse(
        "missing choices[0].message.content in completion response".to_owned(),
    ))
}

fn first_non_empty(left: Option<String>, right: Option<String>) -> Option<String> {
    normalize_optional(left).or_else(|| normalize_optional(right))
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn read_env_non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
