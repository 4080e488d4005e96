//! Tipos de erro para o cliente da API Anthropic.
//!
//! Define [`AnthropicError`] com variantes para rate limiting, erros da API
//! e erros de rede. O adaptador de texto converte essas falhas em
//! [`CollaboratorError`](crate::collaborators::CollaboratorError) para que o
//! interpretador de chat possa recorrer às regras determinísticas.

use thiserror::Error;

use crate::collaborators::CollaboratorError;

/// Erros que podem ocorrer ao interagir com a API da Anthropic.
#[derive(Debug, Error)]
pub enum AnthropicError {
    /// O servidor retornou HTTP 429 (rate limit).
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Erro retornado pela API (ex.: 401 chave inválida, 500 erro interno).
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// A resposta não trouxe nenhum bloco de texto.
    #[error("response contained no text")]
    EmptyResponse,

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl From<AnthropicError> for CollaboratorError {
    fn from(err: AnthropicError) -> Self {
        match err {
            AnthropicError::RateLimited { .. } => CollaboratorError::Unavailable(err.to_string()),
            AnthropicError::ApiError { status, message } => CollaboratorError::Remote { status, message },
            AnthropicError::EmptyResponse => CollaboratorError::Malformed(err.to_string()),
            AnthropicError::NetworkError(e) => CollaboratorError::Request(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display() {
        let err = AnthropicError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(err.to_string(), "rate limited, retry after 5000ms");
    }

    #[test]
    fn api_error_maps_to_remote() {
        let err: CollaboratorError = AnthropicError::ApiError {
            status: 401,
            message: "Invalid API key".into(),
        }
        .into();
        assert!(matches!(err, CollaboratorError::Remote { status: 401, .. }));
    }

    #[test]
    fn rate_limit_maps_to_unavailable() {
        let err: CollaboratorError = AnthropicError::RateLimited { retry_after_ms: 1 }.into();
        assert!(matches!(err, CollaboratorError::Unavailable(_)));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AnthropicError>();
    }
}
