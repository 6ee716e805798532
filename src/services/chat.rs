use std::sync::Arc;

use sqlx::types::Json;
use uuid::Uuid;

use crate::core::metrics;
use crate::core::time::primitive_now_utc;
use crate::db::models::{ChatMessage, Conversation, User};
use crate::repositories::ConversationStore;
use crate::services::completion::CompletionService;
use crate::services::lifecycle::{LifecycleError, LifecycleResult};
use crate::services::prompts;

pub(crate) const MAX_MESSAGE_CHARS: usize = 3000;
const FALLBACK_TITLE_CHARS: usize = 50;

/// General tutoring conversations. Question-scoped conversations created by
/// the lifecycle are continued through the same turn.
#[derive(Clone)]
pub(crate) struct ChatService {
    conversations: Arc<dyn ConversationStore>,
    completion: Arc<dyn CompletionService>,
}

impl ChatService {
    pub(crate) fn new(
        conversations: Arc<dyn ConversationStore>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        Self { conversations, completion }
    }

    pub(crate) async fn start(&self, user: &User) -> LifecycleResult<Conversation> {
        let now = primitive_now_utc();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            messages: Json(vec![
                ChatMessage::system(prompts::TUTOR_PROMPT),
                ChatMessage::assistant(prompts::WELCOME_GREETING),
            ]),
            summary: prompts::PLACEHOLDER_SUMMARY.to_string(),
            created_at: now,
            updated_at: now,
            is_deleted: false,
            assignment_id: None,
            question_id: None,
        };
        self.conversations.insert_conversation(&conversation).await?;

        metrics::lifecycle_event("chat_started");
        tracing::info!(chat_id = %conversation.id, user_id = %user.id, "Chat started");
        Ok(conversation)
    }

    /// One exchange. Nothing is written unless the completion succeeds; the
    /// document is then stored whole with both new messages.
    pub(crate) async fn turn(
        &self,
        user: &User,
        chat_id: Option<&str>,
        message: &str,
    ) -> LifecycleResult<Conversation> {
        let message = validate_message(message)?;
        let now = primitive_now_utc();

        let mut conversation = match chat_id {
            Some(id) => match self.conversations.find_conversation(id).await? {
                Some(existing) if existing.user_id == user.id && !existing.is_deleted => existing,
                Some(_) => return Err(LifecycleError::NotFound("Conversation not found")),
                None => fresh_conversation(id.to_string(), &user.id, now),
            },
            None => fresh_conversation(Uuid::new_v4().to_string(), &user.id, now),
        };

        conversation.messages.push(ChatMessage::user(message));
        let reply = self.completion.complete(&conversation.messages).await?;
        conversation.messages.push(ChatMessage::assistant(reply));

        if prompts::is_placeholder_summary(&conversation.summary) {
            conversation.summary = self.title_for(message).await;
        }
        conversation.updated_at = primitive_now_utc();
        self.conversations.save_conversation(&conversation).await?;

        metrics::lifecycle_event("chat_turn");
        tracing::debug!(
            chat_id = %conversation.id,
            messages = conversation.messages.len(),
            "Chat turn stored"
        );
        Ok(conversation)
    }

    pub(crate) async fn list(&self, user: &User) -> LifecycleResult<Vec<Conversation>> {
        Ok(self.conversations.list_conversations(&user.id).await?)
    }

    pub(crate) async fn get(&self, user: &User, chat_id: &str) -> LifecycleResult<Conversation> {
        match self.conversations.find_conversation(chat_id).await? {
            Some(conversation) if conversation.user_id == user.id && !conversation.is_deleted => {
                Ok(conversation)
            }
            _ => Err(LifecycleError::NotFound("Conversation not found")),
        }
    }

    pub(crate) async fn delete(&self, user: &User, chat_id: &str) -> LifecycleResult<()> {
        let deleted = self
            .conversations
            .soft_delete_conversation(chat_id, &user.id, primitive_now_utc())
            .await?;
        if !deleted {
            return Err(LifecycleError::NotFound("Conversation not found"));
        }

        tracing::info!(chat_id, user_id = %user.id, "Conversation deleted");
        Ok(())
    }

    async fn title_for(&self, text: &str) -> String {
        match self.completion.titleize(text).await {
            Ok(title) => title,
            Err(err) => {
                tracing::warn!(error = %err, "Title generation failed, using message prefix");
                fallback_title(text)
            }
        }
    }
}

pub(crate) fn validate_message(message: &str) -> LifecycleResult<&str> {
    let message = message.trim();
    if message.is_empty() {
        return Err(LifecycleError::InvalidInput("Message cannot be empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(LifecycleError::InvalidInput(format!(
            "Message exceeds maximum length of {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(message)
}

pub(crate) fn fallback_title(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= FALLBACK_TITLE_CHARS {
        return text.to_string();
    }
    let prefix: String = text.chars().take(FALLBACK_TITLE_CHARS).collect();
    format!("{prefix}...")
}

fn fresh_conversation(
    id: String,
    user_id: &str,
    now: time::PrimitiveDateTime,
) -> Conversation {
    Conversation {
        id,
        user_id: user_id.to_string(),
        messages: Json(vec![ChatMessage::system(prompts::TUTOR_PROMPT)]),
        summary: prompts::PLACEHOLDER_SUMMARY.to_string(),
        created_at: now,
        updated_at: now,
        is_deleted: false,
        assignment_id: None,
        question_id: None,
    }
}
