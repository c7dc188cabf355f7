//! Multimodal chat message composition.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

/// One typed unit of a chat turn.
///
/// Serializes as `{"type": "text", "text": ...}` or `{"type": "video", "video": ...}`,
/// the block format chat templates expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Video { video: String },
}

/// A single chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

/// Build the user turn for an analysis request.
///
/// Blocks are ordered system text, prompt text, video. The system block is
/// left out entirely when no (or an empty) system prompt is given.
pub fn compose(prompt: &str, system_prompt: Option<&str>, video_path: &Path) -> ChatMessage {
    let mut content = Vec::with_capacity(3);

    if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
        content.push(ContentBlock::Text {
            text: system.to_string(),
        });
    }
    content.push(ContentBlock::Text {
        text: prompt.to_string(),
    });
    content.push(ContentBlock::Video {
        video: video_path.to_string_lossy().into_owned(),
    });

    ChatMessage {
        role: Role::User,
        content,
    }
}
