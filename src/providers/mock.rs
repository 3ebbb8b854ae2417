//! Deterministic stub translator for mock mode and offline runs

use async_trait::async_trait;

use crate::core::errors::Result;
use crate::core::models::TranslationRequest;
use crate::providers::TranslationBackend;

/// Echoes the input tagged with its language pair; no network, no quota
#[derive(Debug, Clone, Default)]
pub struct MockTranslator;

impl MockTranslator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TranslationBackend for MockTranslator {
    async fn translate(&self, request: &TranslationRequest) -> Result<String> {
        Ok(format!(
            "[{}->{}] {}",
            request.source_lang, request.target_lang, request.text
        ))
    }
}
