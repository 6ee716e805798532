use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use super::{conversations, PgStore, ProgressStore, StoreResult};
use crate::db::models::{Conversation, ProgressRecord, QuestionProgress, StudentAssignment};

const HEADER_COLUMNS: &str = "assignment_id, student_email, student_id, student_name, accepted_at";

const ENTRY_COLUMNS: &str = "\
    assignment_id, student_email, question_id, position, number, prompt_md, marks, hints, \
    chat_id, archived_chat_ids, student_solution, solution_chat_id, solution_message_index, \
    submitted_at, attempts, grade, feedback, updated_at";

async fn insert_entry(conn: &mut PgConnection, entry: &QuestionProgress) -> StoreResult<()> {
    sqlx::query(&format!(
        "INSERT INTO question_progress ({ENTRY_COLUMNS})
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)"
    ))
    .bind(&entry.assignment_id)
    .bind(&entry.student_email)
    .bind(&entry.question_id)
    .bind(entry.position)
    .bind(&entry.number)
    .bind(&entry.prompt_md)
    .bind(entry.marks)
    .bind(&entry.hints)
    .bind(&entry.chat_id)
    .bind(&entry.archived_chat_ids)
    .bind(&entry.student_solution)
    .bind(&entry.solution_chat_id)
    .bind(entry.solution_message_index)
    .bind(entry.submitted_at)
    .bind(entry.attempts)
    .bind(entry.grade)
    .bind(&entry.feedback)
    .bind(entry.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Display snapshot columns (number, prompt, marks, hints, position) are
/// written once at accept time and left alone here.
pub(crate) async fn replace_entry(pool: &PgPool, entry: &QuestionProgress) -> StoreResult<()> {
    sqlx::query(
        "UPDATE question_progress SET
            chat_id = $1,
            archived_chat_ids = $2,
            student_solution = $3,
            solution_chat_id = $4,
            solution_message_index = $5,
            submitted_at = $6,
            attempts = $7,
            grade = $8,
            feedback = $9,
            updated_at = $10
         WHERE assignment_id = $11 AND student_email = $12 AND question_id = $13",
    )
    .bind(&entry.chat_id)
    .bind(&entry.archived_chat_ids)
    .bind(&entry.student_solution)
    .bind(&entry.solution_chat_id)
    .bind(entry.solution_message_index)
    .bind(entry.submitted_at)
    .bind(entry.attempts)
    .bind(entry.grade)
    .bind(&entry.feedback)
    .bind(entry.updated_at)
    .bind(&entry.assignment_id)
    .bind(&entry.student_email)
    .bind(&entry.question_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Inserts header, entries and conversations in one transaction.
pub(crate) async fn create(
    pool: &PgPool,
    record: &ProgressRecord,
    seeded: &[Conversation],
) -> StoreResult<()> {
    let mut tx = pool.begin().await?;
    let header = &record.header;

    sqlx::query(&format!(
        "INSERT INTO student_assignments ({HEADER_COLUMNS}) VALUES ($1,$2,$3,$4,$5)"
    ))
    .bind(&header.assignment_id)
    .bind(&header.student_email)
    .bind(&header.student_id)
    .bind(&header.student_name)
    .bind(header.accepted_at)
    .execute(&mut *tx)
    .await?;

    for conversation in seeded {
        conversations::insert(&mut *tx, conversation).await?;
    }

    for entry in record.ordered_entries() {
        insert_entry(&mut *tx, entry).await?;
    }

    tx.commit().await?;
    Ok(())
}

pub(crate) async fn find(
    pool: &PgPool,
    assignment_id: &str,
    student_email: &str,
) -> StoreResult<Option<ProgressRecord>> {
    let header = sqlx::query_as::<_, StudentAssignment>(&format!(
        "SELECT {HEADER_COLUMNS} FROM student_assignments
         WHERE assignment_id = $1 AND student_email = $2"
    ))
    .bind(assignment_id)
    .bind(student_email)
    .fetch_optional(pool)
    .await?;

    let Some(header) = header else {
        return Ok(None);
    };

    let entries = sqlx::query_as::<_, QuestionProgress>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM question_progress
         WHERE assignment_id = $1 AND student_email = $2
         ORDER BY position"
    ))
    .bind(assignment_id)
    .bind(student_email)
    .fetch_all(pool)
    .await?;

    Ok(Some(ProgressRecord::new(header, entries)))
}

pub(crate) async fn list_for_assignment(
    pool: &PgPool,
    assignment_id: &str,
) -> StoreResult<Vec<ProgressRecord>> {
    let headers = sqlx::query_as::<_, StudentAssignment>(&format!(
        "SELECT {HEADER_COLUMNS} FROM student_assignments
         WHERE assignment_id = $1
         ORDER BY student_email"
    ))
    .bind(assignment_id)
    .fetch_all(pool)
    .await?;

    let entries = sqlx::query_as::<_, QuestionProgress>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM question_progress
         WHERE assignment_id = $1
         ORDER BY student_email, position"
    ))
    .bind(assignment_id)
    .fetch_all(pool)
    .await?;

    Ok(assemble(headers, entries))
}

pub(crate) async fn list_for_student(
    pool: &PgPool,
    student_email: &str,
) -> StoreResult<Vec<ProgressRecord>> {
    let headers = sqlx::query_as::<_, StudentAssignment>(&format!(
        "SELECT {HEADER_COLUMNS} FROM student_assignments
         WHERE student_email = $1
         ORDER BY accepted_at DESC"
    ))
    .bind(student_email)
    .fetch_all(pool)
    .await?;

    let entries = sqlx::query_as::<_, QuestionProgress>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM question_progress
         WHERE student_email = $1
         ORDER BY assignment_id, position"
    ))
    .bind(student_email)
    .fetch_all(pool)
    .await?;

    Ok(assemble(headers, entries))
}

fn assemble(headers: Vec<StudentAssignment>, entries: Vec<QuestionProgress>) -> Vec<ProgressRecord> {
    let mut grouped: HashMap<(String, String), Vec<QuestionProgress>> = HashMap::new();
    for entry in entries {
        grouped
            .entry((entry.assignment_id.clone(), entry.student_email.clone()))
            .or_default()
            .push(entry);
    }

    headers
        .into_iter()
        .map(|header| {
            let key = (header.assignment_id.clone(), header.student_email.clone());
            let entries = grouped.remove(&key).unwrap_or_default();
            ProgressRecord::new(header, entries)
        })
        .collect()
}

#[async_trait]
impl ProgressStore for PgStore {
    async fn find_progress(
        &self,
        assignment_id: &str,
        student_email: &str,
    ) -> StoreResult<Option<ProgressRecord>> {
        find(self.pool(), assignment_id, student_email).await
    }

    async fn list_progress(&self, assignment_id: &str) -> StoreResult<Vec<ProgressRecord>> {
        list_for_assignment(self.pool(), assignment_id).await
    }

    async fn list_progress_for_student(
        &self,
        student_email: &str,
    ) -> StoreResult<Vec<ProgressRecord>> {
        list_for_student(self.pool(), student_email).await
    }

    async fn create_progress(
        &self,
        record: &ProgressRecord,
        conversations: &[Conversation],
    ) -> StoreResult<()> {
        create(self.pool(), record, conversations).await
    }

    async fn replace_entry(&self, entry: &QuestionProgress) -> StoreResult<()> {
        replace_entry(self.pool(), entry).await
    }
}
