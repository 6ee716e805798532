use std::collections::HashMap;
use std::sync::Arc;

use sqlx::types::Json;
use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::metrics;
use crate::core::time::primitive_now_utc;
use crate::db::models::{
    Assignment, Conversation, ProgressRecord, Question, QuestionProgress, StudentAssignment, User,
};
use crate::db::types::GradeOutcome;
use crate::repositories::{
    AssignmentCatalog, ConversationStore, ProgressStore, StoreError,
};
use crate::services::completion::CompletionError;
use crate::services::export::{self, ExportSnapshot};
use crate::services::prompts;


#[derive(Debug, Error)]
pub(crate) enum LifecycleError {
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("conversation is not linked to this question")]
    InvalidReference,
    #[error("message not found in conversation")]
    ContentMismatch,
    #[error("{0}")]
    InvalidInput(String),
    #[error("completion service failed: {0}")]
    Service(#[from] CompletionError),
    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}

pub(crate) type LifecycleResult<T> = Result<T, LifecycleError>;

/// Result of binding a question to a conversation.
#[derive(Debug, Clone)]
pub(crate) struct BoundChat {
    pub(crate) chat_id: String,
    pub(crate) created: bool,
    pub(crate) entry: QuestionProgress,
}

#[derive(Debug, Clone)]
pub(crate) struct AssignmentProgress {
    pub(crate) assignment: Assignment,
    pub(crate) record: ProgressRecord,
}

/// One roster entry of the student's assignment list.
#[derive(Debug, Clone)]
pub(crate) struct AssignmentOverview {
    pub(crate) assignment: Assignment,
    pub(crate) record: Option<ProgressRecord>,
}

#[derive(Debug, Clone)]
pub(crate) struct StaffProgress {
    pub(crate) assignment: Assignment,
    pub(crate) records: Vec<ProgressRecord>,
}

/// Drives a student's assignment from acceptance to grading. Every question
/// entry owns at most one current conversation plus an append-only archive.
#[derive(Clone)]
pub(crate) struct LifecycleService {
    conversations: Arc<dyn ConversationStore>,
    catalog: Arc<dyn AssignmentCatalog>,
    progress: Arc<dyn ProgressStore>,
}

impl LifecycleService {
    pub(crate) fn new(
        conversations: Arc<dyn ConversationStore>,
        catalog: Arc<dyn AssignmentCatalog>,
        progress: Arc<dyn ProgressStore>,
    ) -> Self {
        Self { conversations, catalog, progress }
    }

    /// Creates the progress record with one seeded conversation per question.
    pub(crate) async fn accept(
        &self,
        assignment_id: &str,
        student: &User,
    ) -> LifecycleResult<ProgressRecord> {
        let assignment = self
            .catalog
            .find_assignment(assignment_id)
            .await?
            .ok_or(LifecycleError::NotFound("Assignment not found"))?;

        if !assignment.allows(&student.email) {
            return Err(LifecycleError::Forbidden("You are not allowed to access this assignment"));
        }

        if self.progress.find_progress(assignment_id, &student.email).await?.is_some() {
            return Err(LifecycleError::Conflict("Assignment already accepted"));
        }

        let now = primitive_now_utc();
        let mut conversations = Vec::with_capacity(assignment.questions.len());
        let mut entries = Vec::with_capacity(assignment.questions.len());

        for (position, question) in assignment.questions.iter().enumerate() {
            let conversation = seeded_conversation(&assignment, question, &student.id, now);
            entries.push(QuestionProgress::snapshot(
                &assignment.id,
                &student.email,
                position,
                question,
                Some(conversation.id.clone()),
                now,
            ));
            conversations.push(conversation);
        }

        let header = StudentAssignment {
            assignment_id: assignment.id.clone(),
            student_email: student.email.clone(),
            student_id: student.id.clone(),
            student_name: student.display_name.clone(),
            accepted_at: now,
        };
        let record = ProgressRecord::new(header, entries);

        match self.progress.create_progress(&record, &conversations).await {
            Ok(()) => {}
            Err(StoreError::Duplicate) => {
                return Err(LifecycleError::Conflict("Assignment already accepted"));
            }
            Err(err) => return Err(err.into()),
        }

        metrics::lifecycle_event("assignment_accepted");
        tracing::info!(
            assignment_id = %assignment.id,
            student = %student.email,
            conversations = conversations.len(),
            "Assignment accepted"
        );

        Ok(record)
    }

    /// Returns the question's current conversation, creating a fresh seeded
    /// one when there is none, when it has vanished, or when `reset` is set.
    pub(crate) async fn bind_or_create(
        &self,
        assignment_id: &str,
        question_id: &str,
        student: &User,
        reset: bool,
    ) -> LifecycleResult<BoundChat> {
        let record = self.require_record(assignment_id, &student.email).await?;
        let mut entry = record
            .entry(question_id)
            .cloned()
            .ok_or(LifecycleError::NotFound("Question not found in this assignment"))?;

        if reset {
            let archived = entry.reset_attempt();
            metrics::lifecycle_event("question_reset");
            tracing::info!(
                assignment_id,
                question_id,
                student = %student.email,
                archived_chat_id = archived.as_deref(),
                "Question attempt reset"
            );
        } else if let Some(chat_id) = entry.chat_id.clone() {
            match self.conversations.find_conversation(&chat_id).await? {
                Some(conversation) if !conversation.is_deleted => {
                    return Ok(BoundChat { chat_id, created: false, entry });
                }
                Some(_) => {
                    tracing::info!(
                        assignment_id,
                        question_id,
                        chat_id = %chat_id,
                        "Bound conversation was deleted, archiving it and creating a replacement"
                    );
                    entry.archived_chat_ids.0.push(chat_id);
                }
                None => {
                    tracing::warn!(
                        assignment_id,
                        question_id,
                        chat_id = %chat_id,
                        "Bound conversation is missing, creating a replacement"
                    );
                }
            }
            entry.chat_id = None;
        }

        let title = match self.catalog.find_assignment(assignment_id).await? {
            Some(assignment) => assignment.title,
            None => assignment_id.to_string(),
        };

        let now = primitive_now_utc();
        let question = entry.question();
        let conversation = Conversation {
            summary: prompts::question_summary(&title, &question),
            ..blank_question_conversation(assignment_id, &question, &student.id, now)
        };
        self.conversations.insert_conversation(&conversation).await?;

        entry.chat_id = Some(conversation.id.clone());
        entry.updated_at = now;
        self.progress.replace_entry(&entry).await?;

        metrics::lifecycle_event("question_chat_created");
        tracing::info!(
            assignment_id,
            question_id,
            chat_id = %conversation.id,
            "Question conversation created"
        );

        Ok(BoundChat { chat_id: conversation.id, created: true, entry })
    }

    /// Records `content` as the answer when it matches a user message of a
    /// conversation linked to the question.
    pub(crate) async fn submit_answer(
        &self,
        assignment_id: &str,
        question_id: &str,
        student: &User,
        chat_id: &str,
        content: &str,
    ) -> LifecycleResult<QuestionProgress> {
        let record = self.require_record(assignment_id, &student.email).await?;
        let mut entry = record
            .entry(question_id)
            .cloned()
            .ok_or(LifecycleError::NotFound("Question not found in this assignment"))?;

        if !entry.knows_chat(chat_id) {
            return Err(LifecycleError::InvalidReference);
        }

        let conversation = self
            .conversations
            .find_conversation(chat_id)
            .await?
            .ok_or(LifecycleError::NotFound("Conversation not found"))?;

        let index = conversation
            .find_user_message(content)
            .ok_or(LifecycleError::ContentMismatch)?;

        let now = primitive_now_utc();
        entry.student_solution = Some(content.to_string());
        entry.solution_chat_id = Some(chat_id.to_string());
        entry.solution_message_index = Some(index as i32);
        entry.submitted_at = Some(now);
        entry.attempts += 1;
        entry.updated_at = now;
        self.progress.replace_entry(&entry).await?;

        metrics::lifecycle_event("answer_submitted");
        tracing::info!(
            assignment_id,
            question_id,
            student = %student.email,
            chat_id,
            message_index = index,
            attempts = entry.attempts,
            "Answer submitted"
        );

        Ok(entry)
    }

    /// Overwrites grade and feedback only. Callers check the grader role.
    pub(crate) async fn grade(
        &self,
        assignment_id: &str,
        question_id: &str,
        student_email: &str,
        outcome: GradeOutcome,
        feedback: Option<String>,
        grader: &User,
    ) -> LifecycleResult<QuestionProgress> {
        let student_email = student_email.trim().to_ascii_lowercase();
        let record = self
            .progress
            .find_progress(assignment_id, &student_email)
            .await?
            .ok_or(LifecycleError::NotFound("Student has not accepted this assignment"))?;
        let mut entry = record
            .entry(question_id)
            .cloned()
            .ok_or(LifecycleError::NotFound("Question not found in this assignment"))?;

        entry.grade = outcome;
        entry.feedback = feedback;
        entry.updated_at = primitive_now_utc();
        self.progress.replace_entry(&entry).await?;

        metrics::lifecycle_event("answer_graded");
        tracing::info!(
            assignment_id,
            question_id,
            student = %student_email,
            grader = %grader.email,
            grade = outcome.as_str(),
            "Submission graded"
        );

        Ok(entry)
    }

    pub(crate) async fn progress(
        &self,
        assignment_id: &str,
        student: &User,
    ) -> LifecycleResult<AssignmentProgress> {
        let record = self.require_record(assignment_id, &student.email).await?;
        let assignment = self
            .catalog
            .find_assignment(assignment_id)
            .await?
            .ok_or(LifecycleError::NotFound("Assignment not found"))?;

        Ok(AssignmentProgress { assignment, record })
    }

    /// Assignments whose roster includes the student, newest first, each
    /// with the student's progress when accepted.
    pub(crate) async fn list_for_student(
        &self,
        student: &User,
    ) -> LifecycleResult<Vec<AssignmentOverview>> {
        let assignments = self.catalog.list_assignments_for_student(&student.email).await?;
        let mut records: HashMap<String, ProgressRecord> = self
            .progress
            .list_progress_for_student(&student.email)
            .await?
            .into_iter()
            .map(|record| (record.header.assignment_id.clone(), record))
            .collect();

        Ok(assignments
            .into_iter()
            .map(|assignment| {
                let record = records.remove(&assignment.id);
                AssignmentOverview { assignment, record }
            })
            .collect())
    }

    pub(crate) async fn staff_progress(&self, assignment_id: &str) -> LifecycleResult<StaffProgress> {
        let assignment = self
            .catalog
            .find_assignment(assignment_id)
            .await?
            .ok_or(LifecycleError::NotFound("Assignment not found"))?;
        let records = self.progress.list_progress(assignment_id).await?;

        Ok(StaffProgress { assignment, records })
    }

    pub(crate) async fn export_snapshot(&self, assignment_id: &str) -> LifecycleResult<ExportSnapshot> {
        let StaffProgress { assignment, records } = self.staff_progress(assignment_id).await?;
        tracing::info!(assignment_id, students = records.len(), "Exporting assignment progress");
        Ok(export::build_snapshot(&assignment, &records))
    }

    async fn require_record(
        &self,
        assignment_id: &str,
        student_email: &str,
    ) -> LifecycleResult<ProgressRecord> {
        self.progress
            .find_progress(assignment_id, student_email)
            .await?
            .ok_or(LifecycleError::NotFound("Assignment not accepted"))
    }
}

fn seeded_conversation(
    assignment: &Assignment,
    question: &Question,
    user_id: &str,
    now: PrimitiveDateTime,
) -> Conversation {
    Conversation {
        summary: prompts::question_summary(&assignment.title, question),
        ..blank_question_conversation(&assignment.id, question, user_id, now)
    }
}

fn blank_question_conversation(
    assignment_id: &str,
    question: &Question,
    user_id: &str,
    now: PrimitiveDateTime,
) -> Conversation {
    Conversation {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        messages: Json(prompts::question_seed(question)),
        summary: String::new(),
        created_at: now,
        updated_at: now,
        is_deleted: false,
        assignment_id: Some(assignment_id.to_string()),
        question_id: Some(question.id.clone()),
    }
}
