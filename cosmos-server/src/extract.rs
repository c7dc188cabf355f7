//! Answer extraction from raw pipeline output.
//!
//! Chat pipelines return `[{"generated_text": [<turns>..., {"role": "assistant", "content": "..."}]}]`,
//! but the exact shape drifts between model revisions and library versions.
//! Extraction decodes the expected shape and otherwise falls back to the
//! stringified output so a request always gets an answer.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// One generated sequence.
#[derive(Debug, Deserialize)]
struct Generation {
    generated_text: Vec<Turn>,
}

/// A chat turn. Earlier turns echo the input, whose content is a block list,
/// so content stays untyped here.
#[derive(Debug, Deserialize)]
struct Turn {
    content: Value,
}

/// Result of decoding raw output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Content of the last generated turn
    Answer(String),
    /// Output did not have the expected shape; holds its string form
    Fallback(String),
}

impl Extraction {
    pub fn into_text(self) -> String {
        match self {
            Extraction::Answer(text) | Extraction::Fallback(text) => text,
        }
    }
}

/// Decode `result`, choosing between the answer path and the fallback.
pub fn decode(result: &Value) -> Extraction {
    let answer = Vec::<Generation>::deserialize(result)
        .ok()
        .and_then(|generations| generations.into_iter().next())
        .and_then(|generation| generation.generated_text.into_iter().last())
        .and_then(|turn| match turn.content {
            Value::String(text) => Some(text),
            _ => None,
        });

    match answer {
        Some(text) => Extraction::Answer(text),
        None => Extraction::Fallback(stringify(result)),
    }
}

/// Extract the answer text from `result`. Never fails.
pub fn extract(result: &Value) -> String {
    let extraction = decode(result);
    if let Extraction::Fallback(_) = extraction {
        warn!("Unexpected pipeline output shape, returning raw output");
    }
    extraction.into_text()
}

/// String form of an arbitrary value: bare strings as-is, everything else as JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) if !s.is_empty() => s.clone(),
        other => other.to_string(),
    }
}
