//! Translation provider clients

use std::fmt;

use async_trait::async_trait;

use crate::core::errors::Result;
use crate::core::models::TranslationRequest;

pub mod deepl;
pub mod gemini;
pub mod mock;

pub use deepl::DeepLClient;
pub use gemini::GeminiClient;
pub use mock::MockTranslator;

/// One provider call: text plus language pair (plus style hint) in,
/// translated text out, or a typed failure
#[async_trait]
pub trait TranslationBackend: Send + Sync + fmt::Debug {
    async fn translate(&self, request: &TranslationRequest) -> Result<String>;
}
