/// Detects the language of a piece of text
pub trait LanguageDetector: Send + Sync {
    /// ISO 639-1 code, or `None` when undetermined
    fn detect(&self, text: &str) -> Option<String>;
}

/// Detector that never commits to a language; stored as the text sentinel
#[derive(Debug, Clone, Copy, Default)]
pub struct UndeterminedLanguage;

impl LanguageDetector for UndeterminedLanguage {
    fn detect(&self, _text: &str) -> Option<String> {
        None
    }
}
