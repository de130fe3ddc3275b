//! Upstream translation-service frames and their mapping onto a window.
//!
//! The translation service streams JSON frames tagged by `type`. Only
//! `translation` and `error` change window state; the rest are informational.
//! Unknown frame types decode to [`ProducerFrame::Unknown`] and are logged.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, ProtocolError, Result};
use crate::record::TranslationRecord;
use crate::window::WindowHandle;

/// Payload of a `translation` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationPayload {
    #[serde(default, alias = "input_text")]
    pub original_text: String,
    #[serde(default)]
    pub target_language_name: String,
    #[serde(default)]
    pub translated_text: String,
    #[serde(default)]
    pub back_translation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
}

/// One frame from the translation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProducerFrame {
    Status {
        #[serde(default)]
        message: String,
    },
    Detection {
        #[serde(default)]
        success: bool,
        #[serde(default)]
        language: String,
        #[serde(default)]
        language_name: String,
    },
    Progress {
        #[serde(default)]
        message: String,
    },
    Translation {
        index: u64,
        translation: TranslationPayload,
    },
    TranslationFailed {
        #[serde(default)]
        language: String,
        #[serde(default)]
        language_name: String,
    },
    Complete {
        #[serde(default)]
        successful_translations: u64,
        #[serde(default)]
        failed_translations: u64,
        #[serde(default)]
        duration: f64,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

impl ProducerFrame {
    /// Build a `translation` frame from a record.
    #[must_use]
    pub fn translation(record: &TranslationRecord) -> Self {
        Self::Translation {
            index: record.index,
            translation: TranslationPayload {
                original_text: record.input_text.clone(),
                target_language_name: record.output_language.clone(),
                translated_text: record.output_translation.clone(),
                back_translation: record.back_translation.clone(),
                source_language: None,
                target_language: None,
            },
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Detection { .. } => "detection",
            Self::Progress { .. } => "progress",
            Self::Translation { .. } => "translation",
            Self::TranslationFailed { .. } => "translation_failed",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }
}

/// What a frame does to the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerAction {
    AddTranslation(TranslationRecord),
    EndRun,
    Nothing,
}

/// Map a frame onto a window operation.
#[must_use]
pub fn action_for(frame: &ProducerFrame) -> ProducerAction {
    match frame {
        ProducerFrame::Translation { index, translation } => {
            ProducerAction::AddTranslation(TranslationRecord::new(
                *index,
                translation.original_text.clone(),
                translation.target_language_name.clone(),
                translation.translated_text.clone(),
                translation.back_translation.clone(),
            ))
        }
        ProducerFrame::Error { .. } => ProducerAction::EndRun,
        _ => ProducerAction::Nothing,
    }
}

/// Feeds producer frames into one window.
#[derive(Debug)]
pub struct ProducerFeed<'a> {
    window: &'a WindowHandle,
    added: u64,
}

impl<'a> ProducerFeed<'a> {
    #[must_use]
    pub fn new(window: &'a WindowHandle) -> Self {
        Self { window, added: 0 }
    }

    /// Records handed to the window so far.
    #[must_use]
    pub fn added(&self) -> u64 {
        self.added
    }

    /// Start a run: activate, then clear this window and every sibling.
    pub async fn begin_run(&mut self) -> Result<()> {
        self.added = 0;
        self.window.set_active(true).await?;
        self.window.reset_translations().await
    }

    pub async fn apply(&mut self, frame: &ProducerFrame) -> Result<ProducerAction> {
        log_frame(frame);
        let action = action_for(frame);
        match &action {
            ProducerAction::AddTranslation(record) => {
                self.window.add_translation(record.clone()).await?;
                self.added += 1;
            }
            ProducerAction::EndRun => self.window.set_active(false).await?,
            ProducerAction::Nothing => {}
        }
        Ok(action)
    }
}

fn log_frame(frame: &ProducerFrame) {
    match frame {
        ProducerFrame::Status { message } => info!(status = %message, "producer status"),
        ProducerFrame::Detection {
            success,
            language,
            language_name,
        } => info!(success, language = %language, language_name = %language_name, "language detected"),
        ProducerFrame::Progress { message } => debug!(progress = %message, "producer progress"),
        ProducerFrame::Translation { index, .. } => debug!(record_index = index, "translation frame"),
        ProducerFrame::TranslationFailed { language, .. } => {
            warn!(language = %language, "translation hop failed");
        }
        ProducerFrame::Complete {
            successful_translations,
            failed_translations,
            duration,
        } => info!(
            successful_translations,
            failed_translations,
            duration_s = duration,
            "producer completed"
        ),
        ProducerFrame::Error { message } => warn!(error = %message, "producer error; ending run"),
        ProducerFrame::Unknown => debug!("unhandled producer frame"),
    }
}

// =============================================================================
// Replay scripts
// =============================================================================

/// One line of a replay script: a producer frame, optionally timestamped.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLine {
    /// Offset from replay start. Untimed lines run right after the previous one.
    pub at_ms: Option<u64>,
    pub frame: ProducerFrame,
}

impl ScriptLine {
    pub fn parse(line: &str) -> std::result::Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        let at_ms = value.get("at_ms").and_then(serde_json::Value::as_u64);
        let frame = ProducerFrame::deserialize(value)?;
        Ok(Self { at_ms, frame })
    }
}

/// Parse a JSON-lines replay script. Blank lines and `#` comments are skipped.
pub fn parse_script(text: &str) -> Result<Vec<ScriptLine>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(n, line)| {
            ScriptLine::parse(line)
                .map_err(|err| Error::from(ProtocolError::Malformed(format!("line {}: {err}", n + 1))))
        })
        .collect()
}
