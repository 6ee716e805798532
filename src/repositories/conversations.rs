use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use time::PrimitiveDateTime;

use super::{ConversationStore, PgStore, StoreResult};
use crate::db::models::Conversation;

const COLUMNS: &str = "\
    id, user_id, messages, summary, created_at, updated_at, is_deleted, \
    assignment_id, question_id";

pub(crate) async fn insert(conn: &mut PgConnection, conversation: &Conversation) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO conversations (
            id, user_id, messages, summary, created_at, updated_at, is_deleted,
            assignment_id, question_id
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
    )
    .bind(&conversation.id)
    .bind(&conversation.user_id)
    .bind(&conversation.messages)
    .bind(&conversation.summary)
    .bind(conversation.created_at)
    .bind(conversation.updated_at)
    .bind(conversation.is_deleted)
    .bind(&conversation.assignment_id)
    .bind(&conversation.question_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> StoreResult<Option<Conversation>> {
    let conversation =
        sqlx::query_as::<_, Conversation>(&format!("SELECT {COLUMNS} FROM conversations WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(conversation)
}

/// Linkage columns are never written after insert.
pub(crate) async fn upsert(pool: &PgPool, conversation: &Conversation) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO conversations (
            id, user_id, messages, summary, created_at, updated_at, is_deleted,
            assignment_id, question_id
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
        ON CONFLICT (id) DO UPDATE SET
            messages = EXCLUDED.messages,
            summary = EXCLUDED.summary,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(&conversation.id)
    .bind(&conversation.user_id)
    .bind(&conversation.messages)
    .bind(&conversation.summary)
    .bind(conversation.created_at)
    .bind(conversation.updated_at)
    .bind(conversation.is_deleted)
    .bind(&conversation.assignment_id)
    .bind(&conversation.question_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn list_for_user(pool: &PgPool, user_id: &str) -> StoreResult<Vec<Conversation>> {
    let conversations = sqlx::query_as::<_, Conversation>(&format!(
        "SELECT {COLUMNS} FROM conversations
         WHERE user_id = $1 AND is_deleted = FALSE
         ORDER BY updated_at DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(conversations)
}

pub(crate) async fn soft_delete(
    pool: &PgPool,
    id: &str,
    user_id: &str,
    now: PrimitiveDateTime,
) -> StoreResult<bool> {
    let result = sqlx::query(
        "UPDATE conversations SET is_deleted = TRUE, updated_at = $3
         WHERE id = $1 AND user_id = $2 AND is_deleted = FALSE",
    )
    .bind(id)
    .bind(user_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl ConversationStore for PgStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        let mut conn = self.pool().acquire().await?;
        insert(&mut conn, conversation).await
    }

    async fn find_conversation(&self, id: &str) -> StoreResult<Option<Conversation>> {
        find_by_id(self.pool(), id).await
    }

    async fn save_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        upsert(self.pool(), conversation).await
    }

    async fn list_conversations(&self, user_id: &str) -> StoreResult<Vec<Conversation>> {
        list_for_user(self.pool(), user_id).await
    }

    async fn soft_delete_conversation(
        &self,
        id: &str,
        user_id: &str,
        now: PrimitiveDateTime,
    ) -> StoreResult<bool> {
        soft_delete(self.pool(), id, user_id, now).await
    }
}
