//! Volume-billed provider client (DeepL-style API)

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::core::errors::{RelayError, Result};
use crate::core::models::TranslationRequest;
use crate::providers::TranslationBackend;

/// Client for the character-billed translation API
#[derive(Debug, Clone)]
pub struct DeepLClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl DeepLClient {
    pub fn new(api_key: String, endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl TranslationBackend for DeepLClient {
    async fn translate(&self, request: &TranslationRequest) -> Result<String> {
        let body = serde_json::json!({
            "text": [request.text],
            "source_lang": request.source_lang,
            "target_lang": request.target_lang,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status.is_success() {
            let json: serde_json::Value = response.json().await?;

            let translation = json["translations"]
                .get(0)
                .and_then(|t| t["text"].as_str())
                .ok_or_else(|| RelayError::Provider {
                    status: None,
                    message: "no translation in response".to_string(),
                })?
                .to_string();

            debug!(chars = request.unit_count(), "volume provider call succeeded");
            Ok(translation)
        } else {
            let status_code = status.as_u16();
            let error_text = response.text().await.unwrap_or_default();

            // 456 is the provider's "character quota exhausted" status
            if status_code == 429 || status_code == 456 || error_text.contains("quota") {
                return Err(RelayError::RemoteRateLimited { retry_after: None });
            }

            Err(RelayError::Provider {
                status: Some(status_code),
                message: error_text,
            })
        }
    }
}
