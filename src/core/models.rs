//! Core data models for the relay

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::errors::RelayError;

/// Closed set of caption style variants
///
/// Each variant maps to a fixed instruction suffix for the styled provider's
/// prompt. Unknown style tags fall back to no-style (`from_tag` returns
/// `None`) rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptionStyle {
    /// Relaxed conversational phrasing
    Casual,
    /// Polite, businesslike phrasing
    Formal,
    /// Playful streamer-persona phrasing
    Cute,
}

impl CaptionStyle {
    /// Parse a style tag from the wire; unknown tags map to no-style
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "casual" => Some(CaptionStyle::Casual),
            "formal" => Some(CaptionStyle::Formal),
            "cute" => Some(CaptionStyle::Cute),
            _ => None,
        }
    }

    /// Canonical tag, also used as the cache-key component
    pub fn tag(&self) -> &'static str {
        match self {
            CaptionStyle::Casual => "casual",
            CaptionStyle::Formal => "formal",
            CaptionStyle::Cute => "cute",
        }
    }

    /// Instruction suffix appended to the styled provider's prompt
    pub fn instruction(&self) -> &'static str {
        match self {
            CaptionStyle::Casual => "Use relaxed, conversational wording.",
            CaptionStyle::Formal => "Use polite, formal wording.",
            CaptionStyle::Cute => "Use playful, cute wording with light interjections.",
        }
    }
}

impl fmt::Display for CaptionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One unit of work for the admission scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub style: Option<CaptionStyle>,
}

impl TranslationRequest {
    pub fn new(
        text: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            style: None,
        }
    }

    pub fn with_style(mut self, style: CaptionStyle) -> Self {
        self.style = Some(style);
        self
    }

    /// Character count used for volume-billed quota accounting
    pub fn unit_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Terminal outcome delivered to a caller, exactly one per processed request
#[derive(Debug)]
pub enum TranslationOutcome {
    /// Successful translation (possibly served from cache)
    Translated {
        text: String,
    },
    /// Typed failure; the transport layer decides how to render it
    Failed(RelayError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_from_tag() {
        assert_eq!(CaptionStyle::from_tag("casual"), Some(CaptionStyle::Casual));
        assert_eq!(CaptionStyle::from_tag(" Formal "), Some(CaptionStyle::Formal));
        assert_eq!(CaptionStyle::from_tag("CUTE"), Some(CaptionStyle::Cute));
    }

    #[test]
    fn test_unknown_style_falls_back_to_none() {
        assert_eq!(CaptionStyle::from_tag("pirate"), None);
        assert_eq!(CaptionStyle::from_tag(""), None);
    }

    #[test]
    fn test_unit_count_is_chars_not_bytes() {
        let request = TranslationRequest::new("こんにちは", "Japanese", "English");
        assert_eq!(request.unit_count(), 5);
        assert!(request.text.len() > 5);
    }
}
