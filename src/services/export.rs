use std::fmt::Write as _;

use time::PrimitiveDateTime;

use crate::core::time::format_export_stamp;
use crate::db::models::{Assignment, ProgressRecord};

/// Characters of answer text that fit on one page of the printed layout.
const CHARS_PER_PAGE: usize = 3500;
const NO_ANSWER: &str = "[No answer submitted]";

/// Plain data handed to a formatter; no store types leak past this point.
#[derive(Debug, Clone)]
pub(crate) struct ExportSnapshot {
    pub(crate) assignment_title: String,
    pub(crate) students: Vec<StudentExport>,
}

#[derive(Debug, Clone)]
pub(crate) struct StudentExport {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) questions: Vec<QuestionExport>,
}

#[derive(Debug, Clone)]
pub(crate) struct QuestionExport {
    pub(crate) number: String,
    pub(crate) marks: i32,
    pub(crate) solution: Option<String>,
    pub(crate) chat_id: Option<String>,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone)]
pub(crate) struct ExportDocument {
    pub(crate) filename: String,
    pub(crate) content_type: &'static str,
    pub(crate) body: String,
}

pub(crate) trait ExportFormatter: Send + Sync {
    fn render(&self, snapshot: &ExportSnapshot) -> ExportDocument;
}

/// Students in acceptance order, questions in assignment order. The chat
/// link points at the conversation the answer came from when there is one.
pub(crate) fn build_snapshot(assignment: &Assignment, records: &[ProgressRecord]) -> ExportSnapshot {
    let mut records: Vec<&ProgressRecord> = records.iter().collect();
    records.sort_by_key(|record| record.header.accepted_at);

    let students = records
        .into_iter()
        .map(|record| StudentExport {
            name: record.header.student_name.clone(),
            email: record.header.student_email.clone(),
            questions: record
                .ordered_entries()
                .into_iter()
                .map(|entry| QuestionExport {
                    number: entry.number.clone(),
                    marks: entry.marks,
                    solution: entry.student_solution.clone(),
                    chat_id: entry.solution_chat_id.clone().or_else(|| entry.chat_id.clone()),
                    submitted_at: entry.submitted_at,
                })
                .collect(),
        })
        .collect();

    ExportSnapshot { assignment_title: assignment.title.clone(), students }
}

/// Two sections per question per student, mirroring the printed layout.
pub(crate) struct MarkdownExportFormatter {
    frontend_url: String,
}

impl MarkdownExportFormatter {
    pub(crate) fn new(frontend_url: impl Into<String>) -> Self {
        Self { frontend_url: frontend_url.into().trim_end_matches('/').to_string() }
    }

    fn write_header(
        &self,
        out: &mut String,
        title: &str,
        student: &StudentExport,
        question: &QuestionExport,
        page: usize,
    ) {
        let submitted = question
            .submitted_at
            .map(format_export_stamp)
            .unwrap_or_else(|| "Not submitted".to_string());

        let _ = writeln!(
            out,
            "## Question {} (Page {page} of 2) - {} marks\n",
            question.number, question.marks
        );
        let _ = writeln!(out, "- **Name:** {}", student.name);
        let _ = writeln!(out, "- **Email:** {}", student.email);
        let _ = writeln!(out, "- **Assignment:** {title}");
        let _ = writeln!(out, "- **Submitted:** {submitted}");
        if let Some(chat_id) = &question.chat_id {
            let _ = writeln!(out, "- **Chat Link:** {}/?chat_id={chat_id}", self.frontend_url);
        }
        out.push('\n');
    }
}

impl ExportFormatter for MarkdownExportFormatter {
    fn render(&self, snapshot: &ExportSnapshot) -> ExportDocument {
        let title = &snapshot.assignment_title;
        let mut out = String::new();
        let _ = writeln!(out, "# {title}\n");

        for student in &snapshot.students {
            for question in &student.questions {
                let (first, rest) = match question.solution.as_deref() {
                    Some(text) => split_answer(text),
                    None => (NO_ANSWER, None),
                };

                self.write_header(&mut out, title, student, question, 1);
                let _ = writeln!(out, "### Student Answer:\n\n{first}\n\n---\n");

                self.write_header(&mut out, title, student, question, 2);
                if let Some(rest) = rest {
                    let _ = writeln!(out, "### Student Answer (continued):\n\n{rest}\n");
                }
                out.push_str("---\n\n");
            }
        }

        ExportDocument {
            filename: format!("{}_progress.md", filename_stem(title)),
            content_type: "text/markdown; charset=utf-8",
            body: out,
        }
    }
}

/// Splits an answer into the part printed on the first page and the
/// continuation. Long answers break after a paragraph or sentence when that
/// break lies past 70% of the page budget, otherwise exactly at the budget.
pub(crate) fn split_answer(text: &str) -> (&str, Option<&str>) {
    let Some((budget_end, _)) = text.char_indices().nth(CHARS_PER_PAGE) else {
        return (text, None);
    };

    let chunk = &text[..budget_end];
    let last_break = [chunk.rfind("\n\n"), chunk.rfind(". "), chunk.rfind(".\n")]
        .into_iter()
        .flatten()
        .max();

    let threshold = CHARS_PER_PAGE * 7 / 10;
    let cut = match last_break {
        Some(position) if chunk[..position].chars().count() > threshold => position + 1,
        _ => budget_end,
    };

    let rest = text[cut..].trim_start();
    let rest = if rest.is_empty() { None } else { Some(rest) };
    (&text[..cut], rest)
}

fn filename_stem(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '_' })
        .collect();
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        "assignment".to_string()
    } else {
        stem.to_string()
    }
}
