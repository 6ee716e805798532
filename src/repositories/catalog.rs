use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use time::PrimitiveDateTime;

use super::{AssignmentCatalog, PgStore, StoreResult};
use crate::db::models::{Assignment, AssignmentTemplate};
use crate::schemas::assignment::{normalize_questions, store_questions, StoredQuestion};

const TEMPLATE_COLUMNS: &str = "id, title, description, questions, created_by, created_at, updated_at";

const ASSIGNMENT_COLUMNS: &str = "\
    id, template_id, title, description, questions, allowed_students, created_by, created_at";

#[derive(Debug, FromRow)]
struct TemplateRow {
    id: String,
    title: String,
    description: String,
    questions: Json<Vec<StoredQuestion>>,
    created_by: String,
    created_at: PrimitiveDateTime,
    updated_at: PrimitiveDateTime,
}

impl From<TemplateRow> for AssignmentTemplate {
    fn from(row: TemplateRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            questions: normalize_questions(row.questions.0),
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct AssignmentRow {
    id: String,
    template_id: String,
    title: String,
    description: String,
    questions: Json<Vec<StoredQuestion>>,
    allowed_students: Vec<String>,
    created_by: String,
    created_at: PrimitiveDateTime,
}

impl From<AssignmentRow> for Assignment {
    fn from(row: AssignmentRow) -> Self {
        Self {
            id: row.id,
            template_id: row.template_id,
            title: row.title,
            description: row.description,
            questions: normalize_questions(row.questions.0),
            allowed_students: row.allowed_students,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

pub(crate) async fn insert_template(pool: &PgPool, template: &AssignmentTemplate) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO assignment_templates (
            id, title, description, questions, created_by, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7)",
    )
    .bind(&template.id)
    .bind(&template.title)
    .bind(&template.description)
    .bind(Json(store_questions(&template.questions)))
    .bind(&template.created_by)
    .bind(template.created_at)
    .bind(template.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn find_template(pool: &PgPool, id: &str) -> StoreResult<Option<AssignmentTemplate>> {
    let row = sqlx::query_as::<_, TemplateRow>(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM assignment_templates WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(AssignmentTemplate::from))
}

pub(crate) async fn list_templates(pool: &PgPool) -> StoreResult<Vec<AssignmentTemplate>> {
    let rows = sqlx::query_as::<_, TemplateRow>(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM assignment_templates ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(AssignmentTemplate::from).collect())
}

pub(crate) async fn update_template(pool: &PgPool, template: &AssignmentTemplate) -> StoreResult<bool> {
    let result = sqlx::query(
        "UPDATE assignment_templates SET
            title = $1,
            description = $2,
            questions = $3,
            updated_at = $4
         WHERE id = $5",
    )
    .bind(&template.title)
    .bind(&template.description)
    .bind(Json(store_questions(&template.questions)))
    .bind(template.updated_at)
    .bind(&template.id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_template(pool: &PgPool, id: &str) -> StoreResult<bool> {
    let result = sqlx::query("DELETE FROM assignment_templates WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn insert_assignment(pool: &PgPool, assignment: &Assignment) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO assignments (
            id, template_id, title, description, questions, allowed_students, created_by, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
    )
    .bind(&assignment.id)
    .bind(&assignment.template_id)
    .bind(&assignment.title)
    .bind(&assignment.description)
    .bind(Json(store_questions(&assignment.questions)))
    .bind(&assignment.allowed_students)
    .bind(&assignment.created_by)
    .bind(assignment.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn find_assignment(pool: &PgPool, id: &str) -> StoreResult<Option<Assignment>> {
    let row = sqlx::query_as::<_, AssignmentRow>(&format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Assignment::from))
}

pub(crate) async fn list_assignments(pool: &PgPool) -> StoreResult<Vec<Assignment>> {
    let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Assignment::from).collect())
}

pub(crate) async fn list_for_student(pool: &PgPool, email: &str) -> StoreResult<Vec<Assignment>> {
    let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments
         WHERE $1 = ANY(allowed_students)
         ORDER BY created_at DESC"
    ))
    .bind(email)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Assignment::from).collect())
}

pub(crate) async fn update_roster(
    pool: &PgPool,
    id: &str,
    allowed_students: &[String],
) -> StoreResult<bool> {
    let result = sqlx::query("UPDATE assignments SET allowed_students = $1 WHERE id = $2")
        .bind(allowed_students)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_assignment(pool: &PgPool, id: &str) -> StoreResult<bool> {
    let result = sqlx::query("DELETE FROM assignments WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl AssignmentCatalog for PgStore {
    async fn insert_template(&self, template: &AssignmentTemplate) -> StoreResult<()> {
        insert_template(self.pool(), template).await
    }

    async fn find_template(&self, id: &str) -> StoreResult<Option<AssignmentTemplate>> {
        find_template(self.pool(), id).await
    }

    async fn list_templates(&self) -> StoreResult<Vec<AssignmentTemplate>> {
        list_templates(self.pool()).await
    }

    async fn update_template(&self, template: &AssignmentTemplate) -> StoreResult<bool> {
        update_template(self.pool(), template).await
    }

    async fn delete_template(&self, id: &str) -> StoreResult<bool> {
        delete_template(self.pool(), id).await
    }

    async fn insert_assignment(&self, assignment: &Assignment) -> StoreResult<()> {
        insert_assignment(self.pool(), assignment).await
    }

    async fn find_assignment(&self, id: &str) -> StoreResult<Option<Assignment>> {
        find_assignment(self.pool(), id).await
    }

    async fn list_assignments(&self) -> StoreResult<Vec<Assignment>> {
        list_assignments(self.pool()).await
    }

    async fn list_assignments_for_student(&self, email: &str) -> StoreResult<Vec<Assignment>> {
        list_for_student(self.pool(), email).await
    }

    async fn update_roster(&self, id: &str, allowed_students: &[String]) -> StoreResult<bool> {
        update_roster(self.pool(), id, allowed_students).await
    }

    async fn delete_assignment(&self, id: &str) -> StoreResult<bool> {
        delete_assignment(self.pool(), id).await
    }
}
