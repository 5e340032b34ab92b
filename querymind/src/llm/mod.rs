use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::LlmSettings;

pub mod parser;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

// ---------- provider routing ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAiCompatible,
    GroqCompatible,
}

/// Model-name prefixes served by a provider other than the fallback.
const MODEL_ROUTES: &[(&str, Provider)] = &[
    ("gpt-", Provider::OpenAiCompatible),
    ("chatgpt-", Provider::OpenAiCompatible),
    ("o1", Provider::OpenAiCompatible),
    ("o3", Provider::OpenAiCompatible),
    ("o4", Provider::OpenAiCompatible),
    ("text-embedding-", Provider::OpenAiCompatible),
];

const FALLBACK_PROVIDER: Provider = Provider::GroqCompatible;

impl Provider {
    pub fn for_model(model: &str) -> Self {
        MODEL_ROUTES
            .iter()
            .find(|(prefix, _)| model.starts_with(prefix))
            .map(|(_, provider)| *provider)
            .unwrap_or(FALLBACK_PROVIDER)
    }

    /// Environment variable holding this provider's API key.
    pub fn credential_env(&self) -> &'static str {
        match self {
            Provider::OpenAiCompatible => "OPENAI_API_KEY",
            Provider::GroqCompatible => "GROQ_API_KEY",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAiCompatible => "openai",
            Provider::GroqCompatible => "groq",
        }
    }
}

// ---------- errors ----------

#[derive(Debug)]
pub enum GatewayError {
    /// No API key configured for the selected provider. No request was made.
    CredentialMissing(Provider),
    /// Transport failure: connect, timeout, TLS.
    Request(String),
    /// The provider answered with a non-2xx status.
    Status { status: u16, body: String },
    /// 2xx answer that does not carry the expected content.
    MalformedResponse(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::CredentialMissing(p) => {
                write!(f, "credential missing: set {}", p.credential_env())
            }
            GatewayError::Request(msg) => write!(f, "LLM request failed: {msg}"),
            GatewayError::Status { status, body } => {
                write!(f, "LLM provider returned HTTP {status}: {body}")
            }
            GatewayError::MalformedResponse(msg) => write!(f, "Malformed LLM response: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Request(e.to_string())
    }
}

// ---------- request ----------

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    /// A request using the configured default model parameters.
    pub fn new(prompt: impl Into<String>, settings: &LlmSettings) -> Self {
        Self {
            prompt: prompt.into(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

/// Anything that turns a prompt into text.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GatewayError>;
}

// ---------- HTTP gateway ----------

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Longest provider error body kept in a `GatewayError::Status`.
const MAX_ERROR_BODY: usize = 512;

/// Chat-completions client for OpenAI-compatible endpoints. Never retries.
#[derive(Clone)]
pub struct LlmGateway {
    client: reqwest::Client,
    settings: LlmSettings,
}

impl LlmGateway {
    pub fn new(settings: LlmSettings) -> Result<Self, GatewayError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            settings,
        })
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Base URL and API key for a provider. The key is `None` when unset.
    pub(crate) fn endpoint(&self, provider: Provider) -> (String, Option<&str>) {
        let (base, key) = match provider {
            Provider::OpenAiCompatible => (
                self.settings.openai_base_url.as_deref().unwrap_or(OPENAI_BASE_URL),
                self.settings.openai_api_key.as_deref(),
            ),
            Provider::GroqCompatible => (
                self.settings.groq_base_url.as_deref().unwrap_or(GROQ_BASE_URL),
                self.settings.groq_api_key.as_deref(),
            ),
        };
        (base.trim_end_matches('/').to_string(), key)
    }
}

#[async_trait::async_trait]
impl LanguageModel for LlmGateway {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GatewayError> {
        let provider = Provider::for_model(&request.model);
        let (base, key) = self.endpoint(provider);
        let key = key.ok_or(GatewayError::CredentialMissing(provider))?;

        tracing::debug!(
            provider = provider.as_str(),
            model = %request.model,
            prompt_chars = request.prompt.len(),
            "calling language model"
        );

        let body = ChatRequest {
            model: &request.model,
            messages: [ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{base}/chat/completions"))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| text.is_char_boundary(*i))
                    .unwrap_or(0);
                text.truncate(cut);
            }
            tracing::warn!(
                provider = provider.as_str(),
                status = status.as_u16(),
                "language model call rejected"
            );
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::MalformedResponse("no message content in first choice".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use axum::{Json, Router, extract::State, http::HeaderMap, http::StatusCode, routing::post};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<(Option<String>, Value)>>>);

    async fn completions(
        State(captured): State<Captured>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        captured.0.lock().unwrap().push((auth, body));
        Json(json!({"choices": [{"message": {"role": "assistant", "content": "SELECT 1"}}]}))
    }

    async fn spawn_completions() -> (String, Captured) {
        let captured = Captured::default();
        let router = Router::new()
            .route("/chat/completions", post(completions))
            .with_state(captured.clone());
        (testing::spawn_http(router).await, captured)
    }

    fn settings(model: &str) -> LlmSettings {
        LlmSettings {
            model: model.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_model_routes() {
        assert_eq!(Provider::for_model("gpt-4o-mini"), Provider::OpenAiCompatible);
        assert_eq!(Provider::for_model("o3-mini"), Provider::OpenAiCompatible);
        assert_eq!(Provider::for_model("llama-3.1-70b-versatile"), Provider::GroqCompatible);
        assert_eq!(Provider::for_model("mixtral-8x7b"), Provider::GroqCompatible);
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_request() {
        let (base, captured) = spawn_completions().await;
        let gateway = LlmGateway::new(LlmSettings {
            openai_base_url: Some(base.clone()),
            groq_base_url: Some(base),
            ..settings("gpt-4o-mini")
        })
        .unwrap();

        let request = GenerationRequest::new("hi", gateway.settings());
        let err = gateway.generate(&request).await.unwrap_err();
        assert!(matches!(err, GatewayError::CredentialMissing(Provider::OpenAiCompatible)));
        assert!(err.to_string().starts_with("credential missing"));
        assert!(captured.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generate_sends_chat_body() {
        let (base, captured) = spawn_completions().await;
        let gateway = LlmGateway::new(LlmSettings {
            openai_api_key: Some("sk-test".to_string()),
            openai_base_url: Some(format!("{base}/")),
            ..settings("gpt-4o-mini")
        })
        .unwrap();

        let request = GenerationRequest::new("count orders", gateway.settings());
        assert_eq!(gateway.generate(&request).await.unwrap(), "SELECT 1");

        let calls = captured.0.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (auth, body) = &calls[0];
        assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"], json!([{"role": "user", "content": "count orders"}]));
        assert_eq!(body["max_tokens"], 1000);
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_unmatched_models_use_groq_endpoint() {
        let (base, captured) = spawn_completions().await;
        let gateway = LlmGateway::new(LlmSettings {
            openai_api_key: Some("sk-openai".to_string()),
            groq_api_key: Some("gsk-groq".to_string()),
            groq_base_url: Some(base),
            ..settings("llama-3.1-8b-instant")
        })
        .unwrap();

        let request = GenerationRequest::new("hi", gateway.settings());
        gateway.generate(&request).await.unwrap();
        let calls = captured.0.lock().unwrap();
        assert_eq!(calls[0].0.as_deref(), Some("Bearer gsk-groq"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = testing::spawn_http(router).await;
        let gateway = LlmGateway::new(LlmSettings {
            openai_api_key: Some("sk-test".to_string()),
            openai_base_url: Some(base),
            ..settings("gpt-4o-mini")
        })
        .unwrap();

        let err = gateway
            .generate(&GenerationRequest::new("hi", gateway.settings()))
            .await
            .unwrap_err();
        match err {
            GatewayError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_and_unreachable_responses() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { Json(json!({"choices": []})) }),
        );
        let base = testing::spawn_http(router).await;
        let gateway = LlmGateway::new(LlmSettings {
            openai_api_key: Some("sk-test".to_string()),
            openai_base_url: Some(base),
            ..settings("gpt-4o-mini")
        })
        .unwrap();
        let err = gateway
            .generate(&GenerationRequest::new("hi", gateway.settings()))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));

        let unreachable = LlmGateway::new(LlmSettings {
            openai_api_key: Some("sk-test".to_string()),
            openai_base_url: Some("http://127.0.0.1:1".to_string()),
            ..settings("gpt-4o-mini")
        })
        .unwrap();
        let err = unreachable
            .generate(&GenerationRequest::new("hi", unreachable.settings()))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Request(_)));
    }
}
