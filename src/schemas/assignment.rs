use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Assignment, AssignmentTemplate, ProgressRecord, Question, QuestionProgress};
use crate::db::types::GradeOutcome;

const DEFAULT_MARKS: i32 = 1;

/// Question as persisted inside the `questions` JSONB column. Older documents
/// carry `question_text` and lack `prompt_md`, `number` and `marks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoredQuestion {
    #[serde(default, alias = "id")]
    pub(crate) question_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) number: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) prompt_md: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) question_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) marks: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) hints: Option<Vec<String>>,
}

impl StoredQuestion {
    /// Migration-on-read into the single shape the rest of the crate sees.
    /// `position` is the 0-based index inside the stored array.
    pub(crate) fn normalize(self, position: usize) -> Question {
        let ordinal = position + 1;
        let number = match self.number {
            Some(serde_json::Value::String(value)) if !value.trim().is_empty() => {
                value.trim().to_string()
            }
            Some(serde_json::Value::Number(value)) => value.to_string(),
            _ => ordinal.to_string(),
        };
        let prompt_md = self
            .prompt_md
            .filter(|value| !value.trim().is_empty())
            .or(self.question_text)
            .unwrap_or_default();

        Question {
            id: self.question_id.unwrap_or_else(|| format!("q{ordinal}")),
            number,
            prompt_md,
            marks: self.marks.map(|marks| marks.round() as i32).unwrap_or(DEFAULT_MARKS),
            hints: self.hints.unwrap_or_default(),
        }
    }
}

impl From<&Question> for StoredQuestion {
    fn from(question: &Question) -> Self {
        Self {
            question_id: Some(question.id.clone()),
            number: Some(serde_json::Value::String(question.number.clone())),
            prompt_md: Some(question.prompt_md.clone()),
            question_text: None,
            marks: Some(f64::from(question.marks)),
            hints: Some(question.hints.clone()),
        }
    }
}

pub(crate) fn normalize_questions(stored: Vec<StoredQuestion>) -> Vec<Question> {
    stored.into_iter().enumerate().map(|(position, question)| question.normalize(position)).collect()
}

pub(crate) fn store_questions(questions: &[Question]) -> Vec<StoredQuestion> {
    questions.iter().map(StoredQuestion::from).collect()
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionInput {
    /// Echoed back on update to keep the question's identity.
    #[serde(default, alias = "question_id")]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) number: Option<String>,
    #[serde(alias = "question_text", deserialize_with = "trimmed")]
    #[validate(length(min = 1, message = "prompt_md must not be empty"))]
    pub(crate) prompt_md: String,
    #[serde(default = "default_marks")]
    #[validate(range(min = 0, message = "marks must be non-negative"))]
    pub(crate) marks: i32,
    #[serde(default)]
    pub(crate) hints: Vec<String>,
}

fn default_marks() -> i32 {
    DEFAULT_MARKS
}

fn trimmed<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(String::deserialize(deserializer)?.trim().to_string())
}

/// Builds questions from admin input. Ids echoed back that match `existing`
/// are kept once; repeats and unknown ids get a fresh id.
pub(crate) fn build_questions(inputs: Vec<QuestionInput>, existing: &[Question]) -> Vec<Question> {
    let mut used: HashSet<String> = HashSet::with_capacity(inputs.len());
    inputs
        .into_iter()
        .enumerate()
        .map(|(position, input)| {
            let id = input
                .id
                .filter(|id| existing.iter().any(|question| &question.id == id))
                .filter(|id| !used.contains(id))
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            used.insert(id.clone());
            let number = input
                .number
                .map(|number| number.trim().to_string())
                .filter(|number| !number.is_empty())
                .unwrap_or_else(|| (position + 1).to_string());

            Question {
                id,
                number,
                prompt_md: input.prompt_md,
                marks: input.marks,
                hints: input
                    .hints
                    .into_iter()
                    .map(|hint| hint.trim().to_string())
                    .filter(|hint| !hint.is_empty())
                    .collect(),
            }
        })
        .collect()
}

/// Lowercases, trims and de-duplicates roster emails, keeping first-seen order.
pub(crate) fn normalize_roster(emails: Vec<String>) -> Vec<String> {
    let mut roster: Vec<String> = Vec::with_capacity(emails.len());
    for email in emails {
        let email = email.trim().to_ascii_lowercase();
        if !email.is_empty() && !roster.contains(&email) {
            roster.push(email);
        }
    }
    roster
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TemplateUpsert {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: String,
    #[validate(nested)]
    pub(crate) questions: Vec<QuestionInput>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TemplateResponse {
    pub(crate) template_id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) questions: Vec<Question>,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl TemplateResponse {
    pub(crate) fn from_db(template: AssignmentTemplate) -> Self {
        Self {
            template_id: template.id,
            title: template.title,
            description: template.description,
            questions: template.questions,
            created_by: template.created_by,
            created_at: format_primitive(template.created_at),
            updated_at: format_primitive(template.updated_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AssignmentCreate {
    #[validate(length(min = 1, message = "template_id must not be empty"))]
    pub(crate) template_id: String,
    #[serde(default)]
    pub(crate) allowed_students: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RosterUpdate {
    pub(crate) allowed_students: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentResponse {
    pub(crate) assignment_id: String,
    pub(crate) template_id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) questions: Vec<Question>,
    pub(crate) allowed_students: Vec<String>,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
}

impl AssignmentResponse {
    pub(crate) fn from_db(assignment: Assignment) -> Self {
        Self {
            assignment_id: assignment.id,
            template_id: assignment.template_id,
            title: assignment.title,
            description: assignment.description,
            questions: assignment.questions,
            allowed_students: assignment.allowed_students,
            created_by: assignment.created_by,
            created_at: format_primitive(assignment.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentAssignmentSummary {
    pub(crate) assignment_id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) total_questions: usize,
    pub(crate) questions_answered: usize,
    pub(crate) accepted: bool,
    pub(crate) accepted_at: Option<String>,
    pub(crate) created_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AcceptResponse {
    pub(crate) message: String,
    pub(crate) conversations_created: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionProgressResponse {
    pub(crate) question_id: String,
    pub(crate) number: String,
    pub(crate) prompt_md: String,
    pub(crate) marks: i32,
    pub(crate) hints: Vec<String>,
    pub(crate) chat_id: Option<String>,
    pub(crate) archived_chat_ids: Vec<String>,
    pub(crate) student_solution: Option<String>,
    pub(crate) solution_chat_id: Option<String>,
    pub(crate) solution_message_index: Option<i32>,
    pub(crate) submitted_at: Option<String>,
    pub(crate) attempts: i32,
    pub(crate) grade: GradeOutcome,
    pub(crate) feedback: Option<String>,
}

impl QuestionProgressResponse {
    pub(crate) fn from_db(entry: QuestionProgress) -> Self {
        Self {
            question_id: entry.question_id,
            number: entry.number,
            prompt_md: entry.prompt_md,
            marks: entry.marks,
            hints: entry.hints.0,
            chat_id: entry.chat_id,
            archived_chat_ids: entry.archived_chat_ids.0,
            student_solution: entry.student_solution,
            solution_chat_id: entry.solution_chat_id,
            solution_message_index: entry.solution_message_index,
            submitted_at: entry.submitted_at.map(format_primitive),
            attempts: entry.attempts,
            grade: entry.grade,
            feedback: entry.feedback,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentProgressResponse {
    pub(crate) assignment_id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) accepted_at: String,
    pub(crate) questions: Vec<QuestionProgressResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentProgressResponse {
    pub(crate) student_email: String,
    pub(crate) student_name: String,
    pub(crate) accepted_at: String,
    pub(crate) questions_answered: usize,
    pub(crate) questions: Vec<QuestionProgressResponse>,
}

impl StudentProgressResponse {
    pub(crate) fn from_db(record: ProgressRecord) -> Self {
        let questions_answered = record.answered_count();
        let header = record.header.clone();
        Self {
            student_email: header.student_email,
            student_name: header.student_name,
            accepted_at: format_primitive(header.accepted_at),
            questions_answered,
            questions: record
                .into_ordered_entries()
                .into_iter()
                .map(QuestionProgressResponse::from_db)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StaffProgressResponse {
    pub(crate) assignment_id: String,
    pub(crate) title: String,
    pub(crate) total_questions: usize,
    pub(crate) total_students: usize,
    pub(crate) students: Vec<StudentProgressResponse>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct QuestionChatQuery {
    #[serde(default)]
    pub(crate) reset: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionChatResponse {
    pub(crate) chat_id: String,
    pub(crate) created: bool,
    pub(crate) question_id: String,
    pub(crate) number: String,
    pub(crate) prompt_md: String,
    pub(crate) archived_chat_ids: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubmitAnswerRequest {
    #[serde(alias = "conversation_id")]
    #[validate(length(min = 1, message = "chat_id must not be empty"))]
    pub(crate) chat_id: String,
    #[serde(alias = "content")]
    #[validate(length(min = 1, message = "message must not be empty"))]
    pub(crate) message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitAnswerResponse {
    pub(crate) message: String,
    pub(crate) attempts: i32,
    pub(crate) solution_message_index: i32,
    pub(crate) submitted_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionChatsEntry {
    pub(crate) question_id: String,
    pub(crate) number: String,
    pub(crate) prompt_md: String,
    pub(crate) chat_id: Option<String>,
    pub(crate) archived_chat_ids: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradeRequest {
    #[validate(email(message = "student_email must be an email address"))]
    pub(crate) student_email: String,
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    pub(crate) grade: GradeOutcome,
    #[serde(default)]
    pub(crate) feedback: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_question_is_normalized() {
        let stored: StoredQuestion = serde_json::from_value(serde_json::json!({
            "question_id": "abc",
            "question_text": "Explain photosynthesis",
            "hints": ["light"]
        }))
        .unwrap();

        let question = stored.normalize(2);
        assert_eq!(question.id, "abc");
        assert_eq!(question.number, "3");
        assert_eq!(question.prompt_md, "Explain photosynthesis");
        assert_eq!(question.marks, 1);
        assert_eq!(question.hints, vec!["light".to_string()]);
    }

    #[test]
    fn prompt_md_wins_over_legacy_text() {
        let stored: StoredQuestion = serde_json::from_value(serde_json::json!({
            "id": "q",
            "number": 7,
            "prompt_md": "New **prompt**",
            "question_text": "Old prompt",
            "marks": 4
        }))
        .unwrap();

        let question = stored.normalize(0);
        assert_eq!(question.number, "7");
        assert_eq!(question.prompt_md, "New **prompt**");
        assert_eq!(question.marks, 4);
        assert!(question.hints.is_empty());
    }

    #[test]
    fn stored_shape_reads_back_unchanged() {
        let original = Question {
            id: "q1".to_string(),
            number: "1a".to_string(),
            prompt_md: "Solve $x^2 = 4$".to_string(),
            marks: 3,
            hints: vec!["factor".to_string()],
        };

        let json = serde_json::to_value(StoredQuestion::from(&original)).unwrap();
        assert!(json.get("question_text").is_none());
        let stored: StoredQuestion = serde_json::from_value(json).unwrap();
        assert_eq!(stored.normalize(5), original);
    }

    #[test]
    fn build_questions_keeps_known_ids_only() {
        let existing = vec![Question {
            id: "keep-me".to_string(),
            number: "1".to_string(),
            prompt_md: "old".to_string(),
            marks: 1,
            hints: vec![],
        }];
        let inputs = vec![
            QuestionInput {
                id: Some("keep-me".to_string()),
                number: None,
                prompt_md: " edited ".to_string(),
                marks: 2,
                hints: vec![" ".to_string(), "hint".to_string()],
            },
            QuestionInput {
                id: Some("forged".to_string()),
                number: Some("b".to_string()),
                prompt_md: "new".to_string(),
                marks: 1,
                hints: vec![],
            },
        ];

        let questions = build_questions(inputs, &existing);
        assert_eq!(questions[0].id, "keep-me");
        assert_eq!(questions[0].prompt_md, "edited");
        assert_eq!(questions[0].number, "1");
        assert_eq!(questions[0].hints, vec!["hint".to_string()]);
        assert_ne!(questions[1].id, "forged");
        assert_eq!(questions[1].number, "b");
    }

    #[test]
    fn repeated_kept_id_is_replaced() {
        let existing = vec![Question {
            id: "keep-me".to_string(),
            number: "1".to_string(),
            prompt_md: "old".to_string(),
            marks: 1,
            hints: vec![],
        }];
        let inputs = (0..2)
            .map(|n| QuestionInput {
                id: Some("keep-me".to_string()),
                number: None,
                prompt_md: format!("part {n}"),
                marks: 1,
                hints: vec![],
            })
            .collect();

        let questions = build_questions(inputs, &existing);
        assert_eq!(questions[0].id, "keep-me");
        assert_ne!(questions[1].id, "keep-me");
    }

    #[test]
    fn blank_prompt_fails_validation() {
        let payload: TemplateUpsert = serde_json::from_value(serde_json::json!({
            "title": "Homework",
            "questions": [{"prompt_md": "   \n  "}]
        }))
        .unwrap();

        assert_eq!(payload.questions[0].prompt_md, "");
        assert!(payload.validate().is_err());
    }

    #[test]
    fn roster_is_lowercased_and_deduplicated() {
        let roster = normalize_roster(vec![
            "Alice@Example.edu".to_string(),
            " bob@example.edu ".to_string(),
            "alice@example.edu".to_string(),
            "".to_string(),
        ]);
        assert_eq!(roster, vec!["alice@example.edu", "bob@example.edu"]);
    }
}
