pub(crate) mod catalog;
pub(crate) mod conversations;
pub(crate) mod health;
pub(crate) mod progress;
pub(crate) mod users;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{
    Assignment, AssignmentTemplate, Conversation, ProgressRecord, QuestionProgress, User,
};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("record already exists")]
    Duplicate,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                StoreError::Duplicate
            }
            _ => StoreError::Database(err),
        }
    }
}

pub(crate) type StoreResult<T> = Result<T, StoreError>;

/// Who granted a role and when. `None` revokes it.
#[derive(Debug, Clone)]
pub(crate) struct RoleGrant {
    pub(crate) granted_by: String,
    pub(crate) granted_at: PrimitiveDateTime,
}

#[async_trait]
pub(crate) trait ConversationStore: Send + Sync {
    async fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()>;

    /// Returns soft-deleted documents too; callers decide visibility.
    async fn find_conversation(&self, id: &str) -> StoreResult<Option<Conversation>>;

    /// Whole-document write of messages, summary and `updated_at`.
    async fn save_conversation(&self, conversation: &Conversation) -> StoreResult<()>;

    async fn list_conversations(&self, user_id: &str) -> StoreResult<Vec<Conversation>>;

    async fn soft_delete_conversation(
        &self,
        id: &str,
        user_id: &str,
        now: PrimitiveDateTime,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub(crate) trait AssignmentCatalog: Send + Sync {
    async fn insert_template(&self, template: &AssignmentTemplate) -> StoreResult<()>;
    async fn find_template(&self, id: &str) -> StoreResult<Option<AssignmentTemplate>>;
    async fn list_templates(&self) -> StoreResult<Vec<AssignmentTemplate>>;
    async fn update_template(&self, template: &AssignmentTemplate) -> StoreResult<bool>;
    async fn delete_template(&self, id: &str) -> StoreResult<bool>;

    async fn insert_assignment(&self, assignment: &Assignment) -> StoreResult<()>;
    async fn find_assignment(&self, id: &str) -> StoreResult<Option<Assignment>>;
    async fn list_assignments(&self) -> StoreResult<Vec<Assignment>>;
    async fn list_assignments_for_student(&self, email: &str) -> StoreResult<Vec<Assignment>>;
    async fn update_roster(&self, id: &str, allowed_students: &[String]) -> StoreResult<bool>;
    async fn delete_assignment(&self, id: &str) -> StoreResult<bool>;
}

#[async_trait]
pub(crate) trait ProgressStore: Send + Sync {
    async fn find_progress(
        &self,
        assignment_id: &str,
        student_email: &str,
    ) -> StoreResult<Option<ProgressRecord>>;

    async fn list_progress(&self, assignment_id: &str) -> StoreResult<Vec<ProgressRecord>>;

    async fn list_progress_for_student(
        &self,
        student_email: &str,
    ) -> StoreResult<Vec<ProgressRecord>>;

    /// Writes the record, every entry and the seeded conversations together.
    /// Fails with `Duplicate` when the record already exists.
    async fn create_progress(
        &self,
        record: &ProgressRecord,
        conversations: &[Conversation],
    ) -> StoreResult<()>;

    /// Replaces one entry row as a whole.
    async fn replace_entry(&self, entry: &QuestionProgress) -> StoreResult<()>;
}

#[async_trait]
pub(crate) trait UserDirectory: Send + Sync {
    /// Creates the user on first sight, refreshes email and name afterwards.
    async fn upsert_identity(
        &self,
        id: &str,
        email: &str,
        display_name: &str,
        now: PrimitiveDateTime,
    ) -> StoreResult<User>;

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn list_admins(&self) -> StoreResult<Vec<User>>;
    async fn list_graders(&self) -> StoreResult<Vec<User>>;
    async fn set_admin(&self, user_id: &str, grant: Option<RoleGrant>) -> StoreResult<bool>;
    async fn set_grader(&self, user_id: &str, grant: Option<RoleGrant>) -> StoreResult<bool>;
}

/// Postgres-backed implementation of every store trait.
#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
