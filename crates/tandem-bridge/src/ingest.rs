//! Bridge frame ingestion.

use serde::Deserialize;
use serde_json::Value;
use tandem_common::{RelayError, RelayResult};

/// What a text frame from the collaborator turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeFrame {
    /// Broadcast to every client as `translation`, unchanged.
    Translation(Value),
    /// `{"type":"ping"}`; nothing to forward.
    Keepalive,
}

/// Parse one frame. Anything that is not a JSON object is malformed.
pub fn ingest(text: &str) -> RelayResult<BridgeFrame> {
    let value: Value = serde_json::from_str(text)?;

    let Value::Object(fields) = &value else {
        return Err(RelayError::MalformedPayload {
            reason: format!("expected a JSON object, got {}", kind(&value)),
        });
    };

    if fields.get("type").and_then(Value::as_str) == Some("ping") {
        return Ok(BridgeFrame::Keepalive);
    }
    Ok(BridgeFrame::Translation(value))
}

/// The fields of a translation payload worth logging. All optional; a
/// payload that does not fit still gets forwarded.
#[derive(Debug, Default, Deserialize)]
pub struct TranslationSummary {
    pub text: Option<String>,
    pub audio_b64: Option<String>,
    pub src: Option<String>,
    pub tgt: Option<String>,
}

impl TranslationSummary {
    pub fn of(payload: &Value) -> Self {
        Self::deserialize(payload).unwrap_or_default()
    }

    pub fn text_chars(&self) -> usize {
        self.text.as_deref().map_or(0, |t| t.chars().count())
    }

    pub fn audio_len(&self) -> usize {
        self.audio_b64.as_deref().map_or(0, str::len)
    }
}

/// Close codes outside 1000–1015 and 3000–4999 are reported as 1000.
pub fn normalize_close_code(code: u16) -> u16 {
    match code {
        1000..=1015 | 3000..=4999 => code,
        _ => 1000,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
