//! LLM error types.

use thiserror::Error;

use super::provider::Provider;

/// Turn a non-2xx response into `LLMError::Api`, consuming the body as the message.
pub(crate) async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, LLMError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(LLMError::Api { status, message })
}

/// Errors that can occur when making LLM API calls.
#[derive(Debug, Error)]
pub enum LLMError {
    /// Provider identifier is not one we can talk to.
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// No API key could be resolved for a provider that needs one.
    #[error("no api key configured for {0}")]
    MissingCredential(Provider),

    /// HTTP request failed
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned an error response
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_carries_status_and_body() {
        let err = LLMError::Api {
            status: 401,
            message: "invalid api key".to_string(),
        };
        assert_eq!(err.to_string(), "api error (status 401): invalid api key");
    }

    #[test]
    fn missing_credential_names_provider() {
        let err = LLMError::MissingCredential(Provider::DeepSeek);
        assert_eq!(err.to_string(), "no api key configured for deepseek");
    }
}
