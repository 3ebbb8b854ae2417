//! Request-count provider client (Gemini-style API), one instance per key

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::core::errors::{RelayError, Result};
use crate::core::models::TranslationRequest;
use crate::providers::TranslationBackend;

/// Client for the per-request-billed generative API
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        endpoint: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            model,
            api_key,
        })
    }

    fn build_prompt(request: &TranslationRequest) -> String {
        let mut prompt = format!(
            "Translate the following text from {} to {}. Reply with the translation only.",
            request.source_lang, request.target_lang
        );

        if let Some(style) = request.style {
            prompt.push(' ');
            prompt.push_str(style.instruction());
        }

        prompt.push_str("\n\n");
        prompt.push_str(&request.text);
        prompt
    }
}

#[async_trait]
impl TranslationBackend for GeminiClient {
    async fn translate(&self, request: &TranslationRequest) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        );

        let body = serde_json::json!({
            "contents": [{
                "parts": [{ "text": Self::build_prompt(request) }]
            }]
        });

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status.is_success() {
            let json: serde_json::Value = response.json().await?;

            let translation = json["candidates"]
                .get(0)
                .and_then(|c| c["content"]["parts"].get(0))
                .and_then(|p| p["text"].as_str())
                .ok_or_else(|| RelayError::Provider {
                    status: None,
                    message: "no candidate in response".to_string(),
                })?
                .trim()
                .to_string();

            debug!(model = %self.model, "count provider call succeeded");
            Ok(translation)
        } else {
            let status_code = status.as_u16();
            let error_text = response.text().await.unwrap_or_default();

            if status_code == 429
                || error_text.contains("RESOURCE_EXHAUSTED")
                || error_text.contains("quota")
            {
                return Err(RelayError::RemoteRateLimited { retry_after: None });
            }

            Err(RelayError::Provider {
                status: Some(status_code),
                message: error_text,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::CaptionStyle;

    #[test]
    fn test_prompt_carries_style_instruction() {
        let request = TranslationRequest::new("こんにちは", "Japanese", "English")
            .with_style(CaptionStyle::Cute);
        let prompt = GeminiClient::build_prompt(&request);

        assert!(prompt.contains("from Japanese to English"));
        assert!(prompt.contains(CaptionStyle::Cute.instruction()));
        assert!(prompt.ends_with("こんにちは"));
    }

    #[test]
    fn test_prompt_without_style() {
        let request = TranslationRequest::new("hello", "English", "Japanese");
        let prompt = GeminiClient::build_prompt(&request);

        assert!(!prompt.contains(CaptionStyle::Casual.instruction()));
    }
}
