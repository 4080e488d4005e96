use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};

use super::error::AnthropicError;
use super::types::{Message, MessagesRequest, MessagesResponse};
use crate::collaborators::{CollaboratorError, TextGenerator};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Espera sugerida quando um 429 chega sem `retry-after` legível.
const DEFAULT_RETRY_AFTER_MS: u64 = 1000;

/// Qualquer coisa capaz de responder a uma requisição da Messages API.
/// Substituído por mocks nos testes.
pub trait MessageSender: Send + Sync {
    fn send_message(
        &self,
        req: &MessagesRequest,
    ) -> impl Future<Output = Result<MessagesResponse, AnthropicError>> + Send;
}

/// Cliente HTTP da Messages API.
pub struct AnthropicClient {
    api_key: String,
    endpoint: String,
    http: Client,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Result<Self, AnthropicError> {
        Self::with_base_url(api_key, API_URL.to_string())
    }

    /// Aponta para outro endpoint (proxy ou servidor de teste).
    pub fn with_base_url(api_key: String, endpoint: String) -> Result<Self, AnthropicError> {
        let http = Client::builder()
            .user_agent(concat!("floorforge/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            api_key,
            endpoint,
            http,
        })
    }
}

impl MessageSender for AnthropicClient {
    async fn send_message(&self, req: &MessagesRequest) -> Result<MessagesResponse, AnthropicError> {
        tracing::debug!(model = %req.model, max_tokens = req.max_tokens, "calling Messages API");
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(req)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json::<MessagesResponse>().await?)
    }
}

/// Converte uma resposta não-2xx no erro correspondente.
async fn rejection(response: Response) -> AnthropicError {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return AnthropicError::RateLimited {
            retry_after_ms: retry_after_ms(response.headers()),
        };
    }
    let body = response.text().await.unwrap_or_default();
    AnthropicError::ApiError {
        status: status.as_u16(),
        message: if body.trim().is_empty() {
            status.to_string()
        } else {
            body
        },
    }
}

fn retry_after_ms(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(DEFAULT_RETRY_AFTER_MS, |secs| secs.saturating_mul(1000))
}

/// [`TextGenerator`] backed by a single-turn Messages API call.
pub struct AnthropicTextGenerator<S = AnthropicClient> {
    sender: S,
    model: String,
    max_tokens: u32,
}

impl<S: MessageSender> AnthropicTextGenerator<S> {
    pub fn new(sender: S, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            sender,
            model: model.into(),
            max_tokens,
        }
    }
}

#[async_trait]
impl<S: MessageSender> TextGenerator for AnthropicTextGenerator<S> {
    async fn generate_text(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let req = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: None,
            messages: vec![Message::user(prompt)],
        };
        let response = self.sender.send_message(&req).await?;
        tracing::debug!(
            id = %response.id,
            model = %response.model,
            stop_reason = ?response.stop_reason,
            "Messages API answered"
        );
        let text = response.text();
        if text.trim().is_empty() {
            return Err(AnthropicError::EmptyResponse.into());
        }
        Ok(text)
    }
}
