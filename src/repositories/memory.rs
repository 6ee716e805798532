use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use time::PrimitiveDateTime;

use super::{
    AssignmentCatalog, ConversationStore, ProgressStore, RoleGrant, StoreError, StoreResult,
    UserDirectory,
};
use crate::db::models::{
    Assignment, AssignmentTemplate, Conversation, ProgressRecord, QuestionProgress, User,
};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    conversations: HashMap<String, Conversation>,
    templates: HashMap<String, AssignmentTemplate>,
    assignments: HashMap<String, Assignment>,
    progress: HashMap<(String, String), ProgressRecord>,
}

/// Process-local stand-in for `PgStore`, used by unit and router tests.
#[derive(Clone, Default)]
pub(crate) struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn conversation_count(&self) -> usize {
        self.tables.lock().conversations.len()
    }

    pub(crate) fn conversations_for_question(
        &self,
        assignment_id: &str,
        question_id: &str,
    ) -> Vec<Conversation> {
        self.tables
            .lock()
            .conversations
            .values()
            .filter(|conversation| {
                conversation.assignment_id.as_deref() == Some(assignment_id)
                    && conversation.question_id.as_deref() == Some(question_id)
            })
            .cloned()
            .collect()
    }

    /// Hard-removes a document; simulates a store that lost a write.
    pub(crate) fn purge_conversation(&self, id: &str) {
        self.tables.lock().conversations.remove(id);
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        if tables.conversations.contains_key(&conversation.id) {
            return Err(StoreError::Duplicate);
        }
        tables.conversations.insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn find_conversation(&self, id: &str) -> StoreResult<Option<Conversation>> {
        Ok(self.tables.lock().conversations.get(id).cloned())
    }

    async fn save_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        match tables.conversations.get_mut(&conversation.id) {
            Some(existing) => {
                existing.messages = conversation.messages.clone();
                existing.summary = conversation.summary.clone();
                existing.updated_at = conversation.updated_at;
            }
            None => {
                tables.conversations.insert(conversation.id.clone(), conversation.clone());
            }
        }
        Ok(())
    }

    async fn list_conversations(&self, user_id: &str) -> StoreResult<Vec<Conversation>> {
        let tables = self.tables.lock();
        let mut conversations: Vec<_> = tables
            .conversations
            .values()
            .filter(|conversation| conversation.user_id == user_id && !conversation.is_deleted)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn soft_delete_conversation(
        &self,
        id: &str,
        user_id: &str,
        now: PrimitiveDateTime,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        match tables.conversations.get_mut(id) {
            Some(conversation) if conversation.user_id == user_id && !conversation.is_deleted => {
                conversation.is_deleted = true;
                conversation.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl AssignmentCatalog for InMemoryStore {
    async fn insert_template(&self, template: &AssignmentTemplate) -> StoreResult<()> {
        self.tables.lock().templates.insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn find_template(&self, id: &str) -> StoreResult<Option<AssignmentTemplate>> {
        Ok(self.tables.lock().templates.get(id).cloned())
    }

    async fn list_templates(&self) -> StoreResult<Vec<AssignmentTemplate>> {
        let mut templates: Vec<_> = self.tables.lock().templates.values().cloned().collect();
        templates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(templates)
    }

    async fn update_template(&self, template: &AssignmentTemplate) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        match tables.templates.get_mut(&template.id) {
            Some(existing) => {
                existing.title = template.title.clone();
                existing.description = template.description.clone();
                existing.questions = template.questions.clone();
                existing.updated_at = template.updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_template(&self, id: &str) -> StoreResult<bool> {
        Ok(self.tables.lock().templates.remove(id).is_some())
    }

    async fn insert_assignment(&self, assignment: &Assignment) -> StoreResult<()> {
        self.tables.lock().assignments.insert(assignment.id.clone(), assignment.clone());
        Ok(())
    }

    async fn find_assignment(&self, id: &str) -> StoreResult<Option<Assignment>> {
        Ok(self.tables.lock().assignments.get(id).cloned())
    }

    async fn list_assignments(&self) -> StoreResult<Vec<Assignment>> {
        let mut assignments: Vec<_> = self.tables.lock().assignments.values().cloned().collect();
        assignments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(assignments)
    }

    async fn list_assignments_for_student(&self, email: &str) -> StoreResult<Vec<Assignment>> {
        let mut assignments: Vec<_> = self
            .tables
            .lock()
            .assignments
            .values()
            .filter(|assignment| assignment.allowed_students.iter().any(|allowed| allowed == email))
            .cloned()
            .collect();
        assignments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(assignments)
    }

    async fn update_roster(&self, id: &str, allowed_students: &[String]) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        match tables.assignments.get_mut(id) {
            Some(assignment) => {
                assignment.allowed_students = allowed_students.to_vec();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_assignment(&self, id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        let removed = tables.assignments.remove(id).is_some();
        tables.progress.retain(|(assignment_id, _), _| assignment_id != id);
        Ok(removed)
    }
}

#[async_trait]
impl ProgressStore for InMemoryStore {
    async fn find_progress(
        &self,
        assignment_id: &str,
        student_email: &str,
    ) -> StoreResult<Option<ProgressRecord>> {
        let key = (assignment_id.to_string(), student_email.to_string());
        Ok(self.tables.lock().progress.get(&key).cloned())
    }

    async fn list_progress(&self, assignment_id: &str) -> StoreResult<Vec<ProgressRecord>> {
        let mut records: Vec<_> = self
            .tables
            .lock()
            .progress
            .values()
            .filter(|record| record.header.assignment_id == assignment_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.header.student_email.cmp(&b.header.student_email));
        Ok(records)
    }

    async fn list_progress_for_student(
        &self,
        student_email: &str,
    ) -> StoreResult<Vec<ProgressRecord>> {
        Ok(self
            .tables
            .lock()
            .progress
            .values()
            .filter(|record| record.header.student_email == student_email)
            .cloned()
            .collect())
    }

    async fn create_progress(
        &self,
        record: &ProgressRecord,
        conversations: &[Conversation],
    ) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        let key = (record.header.assignment_id.clone(), record.header.student_email.clone());
        if tables.progress.contains_key(&key)
            || conversations.iter().any(|conversation| tables.conversations.contains_key(&conversation.id))
        {
            return Err(StoreError::Duplicate);
        }

        for conversation in conversations {
            tables.conversations.insert(conversation.id.clone(), conversation.clone());
        }
        tables.progress.insert(key, record.clone());
        Ok(())
    }

    async fn replace_entry(&self, entry: &QuestionProgress) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        let key = (entry.assignment_id.clone(), entry.student_email.clone());
        if let Some(slot) =
            tables.progress.get_mut(&key).and_then(|record| record.entry_mut(&entry.question_id))
        {
            *slot = entry.clone();
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn upsert_identity(
        &self,
        id: &str,
        email: &str,
        display_name: &str,
        now: PrimitiveDateTime,
    ) -> StoreResult<User> {
        let mut tables = self.tables.lock();
        let user = tables.users.entry(id.to_string()).or_insert_with(|| User {
            id: id.to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            is_admin: false,
            admin_since: None,
            admin_added_by: None,
            is_grader: false,
            grader_since: None,
            grader_added_by: None,
            created_at: now,
            updated_at: now,
        });
        user.email = email.to_string();
        user.display_name = display_name.to_string();
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .tables
            .lock()
            .users
            .values()
            .filter(|user| user.email == email)
            .max_by_key(|user| user.updated_at)
            .cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(sorted_users(&self.tables.lock().users, |_| true))
    }

    async fn list_admins(&self) -> StoreResult<Vec<User>> {
        Ok(sorted_users(&self.tables.lock().users, |user| user.is_admin))
    }

    async fn list_graders(&self) -> StoreResult<Vec<User>> {
        Ok(sorted_users(&self.tables.lock().users, |user| user.is_grader))
    }

    async fn set_admin(&self, user_id: &str, grant: Option<RoleGrant>) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        let Some(user) = tables.users.get_mut(user_id) else {
            return Ok(false);
        };
        user.is_admin = grant.is_some();
        user.admin_since = grant.as_ref().map(|grant| grant.granted_at);
        user.admin_added_by = grant.map(|grant| grant.granted_by);
        Ok(true)
    }

    async fn set_grader(&self, user_id: &str, grant: Option<RoleGrant>) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        let Some(user) = tables.users.get_mut(user_id) else {
            return Ok(false);
        };
        user.is_grader = grant.is_some();
        user.grader_since = grant.as_ref().map(|grant| grant.granted_at);
        user.grader_added_by = grant.map(|grant| grant.granted_by);
        Ok(true)
    }
}

fn sorted_users(users: &HashMap<String, User>, keep: impl Fn(&User) -> bool) -> Vec<User> {
    let mut selected: Vec<_> = users.values().filter(|user| keep(user)).cloned().collect();
    selected.sort_by(|a, b| a.email.cmp(&b.email));
    selected
}
