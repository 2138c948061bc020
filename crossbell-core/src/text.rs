use serde::{Deserialize, Serialize};

/// One translatable string: the original text and its translation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextItem {
    pub text: String,
    #[serde(default)]
    pub translation: String,
}

impl TextItem {
    pub fn new(text: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            translation: translation.into(),
        }
    }

    /// The translation when one exists, otherwise the source text.
    pub fn best_text(&self) -> &str {
        if self.translation.is_empty() {
            &self.text
        } else {
            &self.translation
        }
    }
}
