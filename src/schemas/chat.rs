use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::{ChatMessage, Conversation};

#[derive(Debug, Deserialize)]
pub(crate) struct ChatRequest {
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) chat_id: Option<String>,
}

/// Reply of both `/chat/start` and `/chat`.
#[derive(Debug, Serialize)]
pub(crate) struct ChatResponse {
    pub(crate) response: String,
    pub(crate) chat_id: String,
    pub(crate) history: Vec<ChatMessage>,
}

impl ChatResponse {
    pub(crate) fn from_db(conversation: Conversation) -> Self {
        let history = conversation.messages.0;
        let response = history.last().map(|message| message.content.clone()).unwrap_or_default();
        Self { response, chat_id: conversation.id, history }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ConversationSummary {
    pub(crate) chat_id: String,
    pub(crate) summary: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) is_assignment_chat: bool,
}

impl ConversationSummary {
    pub(crate) fn from_db(conversation: Conversation) -> Self {
        Self {
            is_assignment_chat: conversation.assignment_id.is_some(),
            chat_id: conversation.id,
            summary: conversation.summary,
            created_at: format_primitive(conversation.created_at),
            updated_at: format_primitive(conversation.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ConversationDetail {
    pub(crate) chat_id: String,
    pub(crate) summary: String,
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) assignment_id: Option<String>,
    pub(crate) question_id: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl ConversationDetail {
    pub(crate) fn from_db(conversation: Conversation) -> Self {
        Self {
            chat_id: conversation.id,
            summary: conversation.summary,
            messages: conversation.messages.0,
            assignment_id: conversation.assignment_id,
            question_id: conversation.question_id,
            created_at: format_primitive(conversation.created_at),
            updated_at: format_primitive(conversation.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageResponse {
    pub(crate) message: String,
}
