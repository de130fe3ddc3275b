//! Inter-window wire messages.
//!
//! Every message is a JSON object tagged by `type`, with an optional
//! `payload`:
//!
//! ```text
//! { "type": "ADD_TRANSLATION",    "payload": TranslationRecord }
//! { "type": "RENDER_TRANSLATION", "payload": TranslationRecord }
//! { "type": "RESET_TRANSLATIONS" }
//! { "type": "SYNC_REQUEST" }
//! { "type": "SYNC_RESPONSE",      "payload": [TranslationRecord] }
//! ```
//!
//! There is no version field. Windows running an older build ignore message
//! types they do not know, so new variants must be safe to drop.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::record::TranslationRecord;

/// Message types understood by this build.
pub const KNOWN_TYPES: [&str; 5] = [
    "ADD_TRANSLATION",
    "RENDER_TRANSLATION",
    "RESET_TRANSLATIONS",
    "SYNC_REQUEST",
    "SYNC_RESPONSE",
];

/// A message exchanged between windows on the broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMessage {
    /// A producer appended a record to its raw sequence.
    AddTranslation(TranslationRecord),
    /// A window revealed a record; siblings adopt it instead of re-timing.
    RenderTranslation(TranslationRecord),
    /// Both sequences were cleared.
    ResetTranslations,
    /// A freshly opened window asks for already-revealed records.
    SyncRequest,
    /// Reply to [`SyncMessage::SyncRequest`] with the sender's rendered sequence.
    SyncResponse(Vec<TranslationRecord>),
}

impl SyncMessage {
    /// Wire tag of this message.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AddTranslation(_) => "ADD_TRANSLATION",
            Self::RenderTranslation(_) => "RENDER_TRANSLATION",
            Self::ResetTranslations => "RESET_TRANSLATIONS",
            Self::SyncRequest => "SYNC_REQUEST",
            Self::SyncResponse(_) => "SYNC_RESPONSE",
        }
    }

    /// Serialize to the JSON wire form.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a wire body.
    ///
    /// Unknown `type` tags are reported as [`ProtocolError::UnknownType`] so
    /// callers can drop them quietly; anything else that fails to parse is
    /// [`ProtocolError::Malformed`].
    pub fn decode(body: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let Some(kind) = value.get("type").and_then(serde_json::Value::as_str) else {
            return Err(ProtocolError::Malformed("missing string `type` tag".to_string()));
        };

        if !KNOWN_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_string()));
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}
