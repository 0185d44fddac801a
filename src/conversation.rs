use crate::settings::ConversationSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conversation used by the legacy `/chat` and `/chats` routes.
pub const DEFAULT_CONVERSATION: Uuid = Uuid::nil();

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Speaker {
    User,
    Chatbot,
}

/// One stored message. Never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub id: i64,
    pub conversation_id: Uuid,
    pub message: Option<String>,
    pub is_bot: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn speaker(&self) -> Speaker {
        if self.is_bot { Speaker::Chatbot } else { Speaker::User }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub turns: Vec<ChatTurn>,
    pub settings: ConversationSettings,
}
