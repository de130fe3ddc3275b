//! Translation records produced by the upstream translation service.

use serde::{Deserialize, Serialize};

/// One translation hop of a run.
///
/// Identity is [`index`](Self::index): it is assigned by the producer, unique
/// and increasing within a run. Every other field is immutable payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TranslationRecord {
    pub index: u64,
    pub input_text: String,
    pub output_language: String,
    pub output_translation: String,
    pub back_translation: String,
}

impl TranslationRecord {
    pub fn new(
        index: u64,
        input_text: impl Into<String>,
        output_language: impl Into<String>,
        output_translation: impl Into<String>,
        back_translation: impl Into<String>,
    ) -> Self {
        Self {
            index,
            input_text: input_text.into(),
            output_language: output_language.into(),
            output_translation: output_translation.into(),
            back_translation: back_translation.into(),
        }
    }

    /// Length of the translated text in UTF-16 code units, the unit browser
    /// surfaces measure text in. Characters outside the BMP count twice.
    #[must_use]
    pub fn output_len(&self) -> usize {
        self.output_translation.encode_utf16().count()
    }
}
