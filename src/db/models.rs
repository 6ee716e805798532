use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{GradeOutcome, MessageRole};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) display_name: String,
    pub(crate) is_admin: bool,
    pub(crate) admin_since: Option<PrimitiveDateTime>,
    pub(crate) admin_added_by: Option<String>,
    pub(crate) is_grader: bool,
    pub(crate) grader_since: Option<PrimitiveDateTime>,
    pub(crate) grader_added_by: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl User {
    pub(crate) fn is_staff(&self) -> bool {
        self.is_admin || self.is_grader
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ChatMessage {
    pub(crate) role: MessageRole,
    pub(crate) content: String,
}

impl ChatMessage {
    pub(crate) fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub(crate) fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub(crate) fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Conversation {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) messages: Json<Vec<ChatMessage>>,
    pub(crate) summary: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) is_deleted: bool,
    pub(crate) assignment_id: Option<String>,
    pub(crate) question_id: Option<String>,
}

impl Conversation {
    /// Position (0-based, system message included) of the first user message
    /// whose content matches exactly.
    pub(crate) fn find_user_message(&self, content: &str) -> Option<usize> {
        self.messages
            .iter()
            .position(|message| message.role == MessageRole::User && message.content == content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) number: String,
    pub(crate) prompt_md: String,
    pub(crate) marks: i32,
    pub(crate) hints: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct AssignmentTemplate {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) questions: Vec<Question>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub(crate) struct Assignment {
    pub(crate) id: String,
    pub(crate) template_id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) questions: Vec<Question>,
    pub(crate) allowed_students: Vec<String>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
}

impl Assignment {
    pub(crate) fn allows(&self, email: &str) -> bool {
        self.allowed_students.iter().any(|allowed| allowed.eq_ignore_ascii_case(email))
    }
}

/// Per-question state of one student's attempt at an assignment. One row in
/// `question_progress`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionProgress {
    pub(crate) assignment_id: String,
    pub(crate) student_email: String,
    pub(crate) question_id: String,
    pub(crate) position: i32,
    pub(crate) number: String,
    pub(crate) prompt_md: String,
    pub(crate) marks: i32,
    pub(crate) hints: Json<Vec<String>>,
    pub(crate) chat_id: Option<String>,
    pub(crate) archived_chat_ids: Json<Vec<String>>,
    pub(crate) student_solution: Option<String>,
    pub(crate) solution_chat_id: Option<String>,
    pub(crate) solution_message_index: Option<i32>,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) attempts: i32,
    pub(crate) grade: GradeOutcome,
    pub(crate) feedback: Option<String>,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl QuestionProgress {
    /// Fresh entry with the question's display fields copied in.
    pub(crate) fn snapshot(
        assignment_id: &str,
        student_email: &str,
        position: usize,
        question: &Question,
        chat_id: Option<String>,
        now: PrimitiveDateTime,
    ) -> Self {
        Self {
            assignment_id: assignment_id.to_string(),
            student_email: student_email.to_string(),
            question_id: question.id.clone(),
            position: position as i32,
            number: question.number.clone(),
            prompt_md: question.prompt_md.clone(),
            marks: question.marks,
            hints: Json(question.hints.clone()),
            chat_id,
            archived_chat_ids: Json(Vec::new()),
            student_solution: None,
            solution_chat_id: None,
            solution_message_index: None,
            submitted_at: None,
            attempts: 0,
            grade: GradeOutcome::NotGraded,
            feedback: None,
            updated_at: now,
        }
    }

    pub(crate) fn knows_chat(&self, chat_id: &str) -> bool {
        self.chat_id.as_deref() == Some(chat_id)
            || self.archived_chat_ids.iter().any(|archived| archived == chat_id)
    }

    /// Moves the current chat (if any) to the archive and wipes the attempt.
    pub(crate) fn reset_attempt(&mut self) -> Option<String> {
        let archived = self.chat_id.take();
        if let Some(chat_id) = &archived {
            self.archived_chat_ids.push(chat_id.clone());
        }
        self.student_solution = None;
        self.solution_chat_id = None;
        self.solution_message_index = None;
        self.submitted_at = None;
        self.attempts = 0;
        self.grade = GradeOutcome::NotGraded;
        self.feedback = None;
        archived
    }

    pub(crate) fn is_answered(&self) -> bool {
        self.student_solution.is_some()
    }

    /// Display copy of the question, as it looked when the student accepted.
    pub(crate) fn question(&self) -> Question {
        Question {
            id: self.question_id.clone(),
            number: self.number.clone(),
            prompt_md: self.prompt_md.clone(),
            marks: self.marks,
            hints: self.hints.0.clone(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct StudentAssignment {
    pub(crate) assignment_id: String,
    pub(crate) student_email: String,
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) accepted_at: PrimitiveDateTime,
}

/// A student's accepted assignment with its entries keyed by question id.
/// Ordering is carried by `QuestionProgress::position`.
#[derive(Debug, Clone)]
pub(crate) struct ProgressRecord {
    pub(crate) header: StudentAssignment,
    entries: HashMap<String, QuestionProgress>,
}

impl ProgressRecord {
    pub(crate) fn new(header: StudentAssignment, entries: Vec<QuestionProgress>) -> Self {
        let entries =
            entries.into_iter().map(|entry| (entry.question_id.clone(), entry)).collect();
        Self { header, entries }
    }

    pub(crate) fn entry(&self, question_id: &str) -> Option<&QuestionProgress> {
        self.entries.get(question_id)
    }

    pub(crate) fn entry_mut(&mut self, question_id: &str) -> Option<&mut QuestionProgress> {
        self.entries.get_mut(question_id)
    }

    pub(crate) fn ordered_entries(&self) -> Vec<&QuestionProgress> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.position);
        entries
    }

    pub(crate) fn into_ordered_entries(self) -> Vec<QuestionProgress> {
        let mut entries: Vec<_> = self.entries.into_values().collect();
        entries.sort_by_key(|entry| entry.position);
        entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn answered_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.is_answered()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_now_utc;

    fn question(id: &str) -> Question {
        Question {
            id: id.to_string(),
            number: "1".to_string(),
            prompt_md: "What is 2 + 2?".to_string(),
            marks: 2,
            hints: vec!["count".to_string()],
        }
    }

    #[test]
    fn reset_attempt_archives_only_present_chat() {
        let now = primitive_now_utc();
        let mut entry =
            QuestionProgress::snapshot("a1", "s@x.edu", 0, &question("q1"), None, now);

        assert_eq!(entry.reset_attempt(), None);
        assert!(entry.archived_chat_ids.is_empty());

        entry.chat_id = Some("c1".to_string());
        entry.attempts = 3;
        entry.grade = GradeOutcome::Correct;
        entry.student_solution = Some("4".to_string());

        assert_eq!(entry.reset_attempt().as_deref(), Some("c1"));
        assert_eq!(entry.archived_chat_ids.0, vec!["c1".to_string()]);
        assert_eq!(entry.attempts, 0);
        assert_eq!(entry.grade, GradeOutcome::NotGraded);
        assert!(entry.student_solution.is_none());
        assert!(entry.knows_chat("c1"));
    }

    #[test]
    fn progress_record_orders_by_position() {
        let now = primitive_now_utc();
        let header = StudentAssignment {
            assignment_id: "a1".to_string(),
            student_email: "s@x.edu".to_string(),
            student_id: "u1".to_string(),
            student_name: "S".to_string(),
            accepted_at: now,
        };
        let second = QuestionProgress::snapshot("a1", "s@x.edu", 1, &question("q2"), None, now);
        let first = QuestionProgress::snapshot("a1", "s@x.edu", 0, &question("q1"), None, now);

        let record = ProgressRecord::new(header, vec![second, first]);
        let ids: Vec<_> =
            record.ordered_entries().iter().map(|entry| entry.question_id.clone()).collect();
        assert_eq!(ids, vec!["q1", "q2"]);
        assert!(record.entry("q2").is_some());
        assert!(record.entry("missing").is_none());
    }

    #[test]
    fn find_user_message_ignores_other_roles() {
        let now = primitive_now_utc();
        let conversation = Conversation {
            id: "c1".to_string(),
            user_id: "u1".to_string(),
            messages: Json(vec![
                ChatMessage::system("42"),
                ChatMessage::assistant("42"),
                ChatMessage::user("41"),
                ChatMessage::user("42"),
                ChatMessage::user("42"),
            ]),
            summary: "New Chat".to_string(),
            created_at: now,
            updated_at: now,
            is_deleted: false,
            assignment_id: None,
            question_id: None,
        };

        assert_eq!(conversation.find_user_message("42"), Some(3));
        assert_eq!(conversation.find_user_message("43"), None);
    }
}
