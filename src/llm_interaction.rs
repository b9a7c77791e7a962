use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::constants;
use crate::conversation::{ChatMessage, Role};
use crate::pricing::PricingModel;

// Structures matching the OpenAI-compatible /chat/completions endpoint
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<UsageReport>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct UsageReport {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl CompletionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CompletionError::Network(_) => FailureKind::Network,
            CompletionError::Timeout(_) => FailureKind::Timeout,
            CompletionError::Api { .. } => FailureKind::Api,
            CompletionError::MalformedResponse(_) => FailureKind::MalformedResponse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Timeout,
    Api,
    MalformedResponse,
}

/// Structured diagnostic for a failed completion. Rendering is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl CompletionFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl From<CompletionError> for CompletionFailure {
    fn from(err: CompletionError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Result of one gateway call. Exactly one of these is produced per user turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Reply {
        text: String,
        usage: TokenUsage,
        cost: f64,
    },
    Failed(CompletionFailure),
}

impl TurnOutcome {
    /// Cost to record for the turn; failures always cost zero.
    pub fn cost(&self) -> f64 {
        match self {
            TurnOutcome::Reply { cost, .. } => *cost,
            TurnOutcome::Failed(_) => 0.0,
        }
    }
}

/// The hosted completion API, behind a seam so sessions can run against a stand-in.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError>;
}

pub struct OpenAiCompletionService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompletionService {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn from_env(api_key: impl Into<String>) -> Self {
        Self::new(constants::OPENAI_BASE_URL.as_str(), api_key)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionService {
    #[instrument(skip(self, request), fields(model = %request.model, messages = request.messages.len()))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        let url = self.endpoint();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %error_body, "Chat completion request failed");
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body: error_body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;
        parse_completion(&body)
    }
}

fn parse_completion(body: &str) -> Result<CompletionResponse, CompletionError> {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::MalformedResponse("no choices in response".to_string()))?;

    let usage = parsed.usage.unwrap_or_default();
    if usage.prompt_tokens.is_none() || usage.completion_tokens.is_none() {
        debug!(?usage, "Usage report incomplete, missing counters count as zero");
    }

    Ok(CompletionResponse {
        text: choice.message.content.unwrap_or_default(),
        usage: TokenUsage {
            input_tokens: usage.prompt_tokens.unwrap_or(0),
            output_tokens: usage.completion_tokens.unwrap_or(0),
        },
    })
}

/// Builds the persona-prefixed request for a window and prices the reply.
#[derive(Clone)]
pub struct CompletionGateway {
    service: Arc<dyn CompletionService>,
    persona: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    pricing: PricingModel,
}

impl CompletionGateway {
    pub fn new(service: Arc<dyn CompletionService>, persona: impl Into<String>) -> Self {
        Self {
            service,
            persona: persona.into(),
            model: constants::MENTOR_CHAT_MODEL.clone(),
            max_tokens: constants::MAX_OUTPUT_TOKENS,
            timeout: Duration::from_secs(*constants::REQUEST_TIMEOUT_SECS),
            pricing: PricingModel::from_env(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingModel) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn pricing(&self) -> PricingModel {
        self.pricing
    }

    /// System persona first, then the window in its original order.
    pub fn build_request(&self, window: &[ChatMessage]) -> CompletionRequest {
        let mut messages = Vec::with_capacity(window.len() + 1);
        messages.push(ChatMessage::new(Role::System, self.persona.clone()));
        messages.extend(window.iter().cloned());
        CompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
        }
    }

    /// One call, no retry. Every failure, including the timeout, comes back as
    /// [`TurnOutcome::Failed`].
    pub async fn send(&self, window: &[ChatMessage]) -> TurnOutcome {
        let request = self.build_request(window);
        debug!(messages = request.messages.len(), "Sending completion request");

        let result = match tokio::time::timeout(self.timeout, self.service.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(self.timeout)),
        };

        match result {
            Ok(response) => {
                let cost = self
                    .pricing
                    .estimate_cost(response.usage.input_tokens, response.usage.output_tokens);
                info!(
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    cost,
                    "Completion received"
                );
                TurnOutcome::Reply {
                    text: response.text,
                    usage: response.usage,
                    cost,
                }
            }
            Err(e) => {
                warn!(error = %e, "Completion failed");
                TurnOutcome::Failed(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedService(TokenUsage);

    #[async_trait]
    impl CompletionService for FixedService {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
            Ok(CompletionResponse {
                text: format!("{} messages", request.messages.len()),
                usage: self.0,
            })
        }
    }

    struct StalledService;

    #[async_trait]
    impl CompletionService for StalledService {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(CompletionError::Network("unreachable".to_string()))
        }
    }

    fn gateway(service: impl CompletionService + 'static) -> CompletionGateway {
        CompletionGateway::new(Arc::new(service), "be helpful")
            .with_model("test-model")
            .with_pricing(PricingModel::default())
    }

    #[test]
    fn test_build_request_prepends_persona() {
        let gateway = gateway(FixedService(TokenUsage::default()));
        let window = vec![
            ChatMessage::new(Role::Assistant, "hi"),
            ChatMessage::new(Role::User, "hello"),
        ];
        let request = gateway.build_request(&window);

        assert_eq!(request.model, "test-model");
        assert_eq!(request.max_tokens, 600);
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0], ChatMessage::new(Role::System, "be helpful"));
        assert_eq!(&request.messages[1..], &window[..]);
    }

    #[test]
    fn test_request_serializes_to_wire_shape() {
        let gateway = gateway(FixedService(TokenUsage::default()));
        let request = gateway.build_request(&[ChatMessage::new(Role::User, "yo")]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "model": "test-model",
                "messages": [
                    {"role": "system", "content": "be helpful"},
                    {"role": "user", "content": "yo"}
                ],
                "max_tokens": 600
            })
        );
    }

    #[test]
    fn test_parse_completion_reads_first_choice_and_usage() {
        let body = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "Step 1: HTML..."}},
                {"message": {"role": "assistant", "content": "ignored"}}
            ],
            "usage": {"prompt_tokens": 50, "completion_tokens": 120, "total_tokens": 170}
        }"#;
        let response = parse_completion(body).unwrap();
        assert_eq!(response.text, "Step 1: HTML...");
        assert_eq!(response.usage, TokenUsage { input_tokens: 50, output_tokens: 120 });
    }

    #[test]
    fn test_parse_completion_missing_usage_defaults_to_zero() {
        let body = r#"{"choices": [{"message": {"content": "ok"}}]}"#;
        let response = parse_completion(body).unwrap();
        assert_eq!(response.usage, TokenUsage::default());

        let body = r#"{"choices": [{"message": {"content": "ok"}}], "usage": {"prompt_tokens": 9}}"#;
        let response = parse_completion(body).unwrap();
        assert_eq!(response.usage, TokenUsage { input_tokens: 9, output_tokens: 0 });
    }

    #[test]
    fn test_parse_completion_null_content_is_empty_text() {
        let body = r#"{"choices": [{"message": {"content": null}}]}"#;
        assert_eq!(parse_completion(body).unwrap().text, "");
    }

    #[test]
    fn test_parse_completion_rejects_malformed() {
        let err = parse_completion(r#"{"choices": []}"#).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedResponse);

        let err = parse_completion("<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedResponse);
    }

    #[test]
    fn test_failure_from_error_keeps_detail() {
        let failure: CompletionFailure = CompletionError::Api {
            status: 429,
            body: "quota exceeded".to_string(),
        }
        .into();
        assert_eq!(failure.kind, FailureKind::Api);
        assert_eq!(failure.detail, "HTTP 429: quota exceeded");
    }

    #[tokio::test]
    async fn test_send_prices_reply() {
        let gateway = gateway(FixedService(TokenUsage { input_tokens: 1_000_000, output_tokens: 0 }));
        let outcome = gateway.send(&[ChatMessage::new(Role::User, "hello")]).await;
        match outcome {
            TurnOutcome::Reply { text, cost, .. } => {
                assert_eq!(text, "2 messages");
                assert_eq!(cost, 0.40);
            }
            other => panic!("expected reply, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_times_out() {
        let gateway = gateway(StalledService).with_timeout(Duration::from_secs(5));
        let outcome = gateway.send(&[ChatMessage::new(Role::User, "hello")]).await;
        match outcome {
            TurnOutcome::Failed(failure) => {
                assert_eq!(failure.kind, FailureKind::Timeout);
                assert!(failure.detail.contains("timed out"));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(gateway.send(&[]).await.cost(), 0.0);
    }
}
