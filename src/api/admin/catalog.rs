use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentStaff};
use crate::core::{metrics, state::AppState, time::primitive_now_utc};
use crate::db::models::{Assignment, AssignmentTemplate};
use crate::schemas::assignment::{
    build_questions, normalize_roster, AssignmentCreate, AssignmentResponse, GradeRequest,
    QuestionProgressResponse, RosterUpdate, StaffProgressResponse, StudentProgressResponse,
    TemplateResponse, TemplateUpsert,
};
use crate::schemas::chat::MessageResponse;
use crate::services::lifecycle::StaffProgress;

fn validate_template(payload: &TemplateUpsert) -> Result<(), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if payload.questions.is_empty() {
        return Err(ApiError::BadRequest("Template must have at least one question".to_string()));
    }
    Ok(())
}

fn template_not_found() -> ApiError {
    ApiError::NotFound("Template not found".to_string())
}

fn assignment_not_found() -> ApiError {
    ApiError::NotFound("Assignment not found".to_string())
}

pub(super) async fn list_templates(
    State(state): State<AppState>,
    CurrentAdmin(_admin): CurrentAdmin,
) -> Result<Json<Vec<TemplateResponse>>, ApiError> {
    let templates = state.catalog().list_templates().await?;
    Ok(Json(templates.into_iter().map(TemplateResponse::from_db).collect()))
}

pub(super) async fn create_template(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Json(payload): Json<TemplateUpsert>,
) -> Result<(StatusCode, Json<TemplateResponse>), ApiError> {
    validate_template(&payload)?;

    let now = primitive_now_utc();
    let template = AssignmentTemplate {
        id: Uuid::new_v4().to_string(),
        title: payload.title.trim().to_string(),
        description: payload.description.trim().to_string(),
        questions: build_questions(payload.questions, &[]),
        created_by: admin.email.clone(),
        created_at: now,
        updated_at: now,
    };
    state.catalog().insert_template(&template).await?;

    metrics::lifecycle_event("template_created");
    tracing::info!(template_id = %template.id, admin = %admin.email, "Template created");

    Ok((StatusCode::CREATED, Json(TemplateResponse::from_db(template))))
}

pub(super) async fn get_template(
    State(state): State<AppState>,
    CurrentAdmin(_admin): CurrentAdmin,
    Path(template_id): Path<String>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let template =
        state.catalog().find_template(&template_id).await?.ok_or_else(template_not_found)?;
    Ok(Json(TemplateResponse::from_db(template)))
}

/// Assignments already created from the template keep their own snapshot.
pub(super) async fn update_template(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Path(template_id): Path<String>,
    Json(payload): Json<TemplateUpsert>,
) -> Result<Json<TemplateResponse>, ApiError> {
    validate_template(&payload)?;

    let existing =
        state.catalog().find_template(&template_id).await?.ok_or_else(template_not_found)?;
    let template = AssignmentTemplate {
        title: payload.title.trim().to_string(),
        description: payload.description.trim().to_string(),
        questions: build_questions(payload.questions, &existing.questions),
        updated_at: primitive_now_utc(),
        ..existing
    };

    if !state.catalog().update_template(&template).await? {
        return Err(template_not_found());
    }

    tracing::info!(template_id = %template.id, admin = %admin.email, "Template updated");
    Ok(Json(TemplateResponse::from_db(template)))
}

pub(super) async fn delete_template(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Path(template_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.catalog().delete_template(&template_id).await? {
        return Err(template_not_found());
    }

    tracing::info!(template_id = %template_id, admin = %admin.email, "Template deleted");
    Ok(Json(MessageResponse { message: "Template deleted successfully".to_string() }))
}

pub(super) async fn list_assignments(
    State(state): State<AppState>,
    CurrentAdmin(_admin): CurrentAdmin,
) -> Result<Json<Vec<AssignmentResponse>>, ApiError> {
    let assignments = state.catalog().list_assignments().await?;
    Ok(Json(assignments.into_iter().map(AssignmentResponse::from_db).collect()))
}

pub(super) async fn create_assignment(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Json(payload): Json<AssignmentCreate>,
) -> Result<(StatusCode, Json<AssignmentResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let template =
        state.catalog().find_template(&payload.template_id).await?.ok_or_else(template_not_found)?;

    let assignment = Assignment {
        id: Uuid::new_v4().to_string(),
        template_id: template.id,
        title: template.title,
        description: template.description,
        questions: template.questions,
        allowed_students: normalize_roster(payload.allowed_students),
        created_by: admin.email.clone(),
        created_at: primitive_now_utc(),
    };
    state.catalog().insert_assignment(&assignment).await?;

    metrics::lifecycle_event("assignment_created");
    tracing::info!(
        assignment_id = %assignment.id,
        template_id = %assignment.template_id,
        students = assignment.allowed_students.len(),
        admin = %admin.email,
        "Assignment created"
    );

    Ok((StatusCode::CREATED, Json(AssignmentResponse::from_db(assignment))))
}

pub(super) async fn get_assignment(
    State(state): State<AppState>,
    CurrentAdmin(_admin): CurrentAdmin,
    Path(assignment_id): Path<String>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let assignment =
        state.catalog().find_assignment(&assignment_id).await?.ok_or_else(assignment_not_found)?;
    Ok(Json(AssignmentResponse::from_db(assignment)))
}

pub(super) async fn delete_assignment(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Path(assignment_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.catalog().delete_assignment(&assignment_id).await? {
        return Err(assignment_not_found());
    }

    tracing::info!(assignment_id = %assignment_id, admin = %admin.email, "Assignment deleted");
    Ok(Json(MessageResponse { message: "Assignment deleted successfully".to_string() }))
}

/// Replaces the roster. Students dropped from it keep their progress.
pub(super) async fn update_roster(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Path(assignment_id): Path<String>,
    Json(payload): Json<RosterUpdate>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let roster = normalize_roster(payload.allowed_students);
    if !state.catalog().update_roster(&assignment_id, &roster).await? {
        return Err(assignment_not_found());
    }

    tracing::info!(
        assignment_id = %assignment_id,
        students = roster.len(),
        admin = %admin.email,
        "Roster updated"
    );

    let assignment =
        state.catalog().find_assignment(&assignment_id).await?.ok_or_else(assignment_not_found)?;
    Ok(Json(AssignmentResponse::from_db(assignment)))
}

pub(super) async fn staff_progress(
    State(state): State<AppState>,
    CurrentStaff(_staff): CurrentStaff,
    Path(assignment_id): Path<String>,
) -> Result<Json<StaffProgressResponse>, ApiError> {
    let StaffProgress { assignment, records } =
        state.lifecycle().staff_progress(&assignment_id).await?;

    Ok(Json(StaffProgressResponse {
        assignment_id: assignment.id,
        title: assignment.title,
        total_questions: assignment.questions.len(),
        total_students: records.len(),
        students: records.into_iter().map(StudentProgressResponse::from_db).collect(),
    }))
}

pub(super) async fn grade_submission(
    State(state): State<AppState>,
    CurrentStaff(grader): CurrentStaff,
    Path(assignment_id): Path<String>,
    Json(payload): Json<GradeRequest>,
) -> Result<Json<QuestionProgressResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let entry = state
        .lifecycle()
        .grade(
            &assignment_id,
            &payload.question_id,
            &payload.student_email,
            payload.grade,
            payload.feedback,
            &grader,
        )
        .await?;

    Ok(Json(QuestionProgressResponse::from_db(entry)))
}

pub(super) async fn export_progress(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Path(assignment_id): Path<String>,
) -> Result<Response, ApiError> {
    let snapshot = state.lifecycle().export_snapshot(&assignment_id).await?;
    let document = state.exporter().render(&snapshot);
    metrics::lifecycle_event("progress_exported");
    tracing::info!(assignment_id = %assignment_id, admin = %admin.email, "Progress exported");

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", document.filename))
        .map_err(|e| ApiError::internal(e, "Failed to build export filename"))?;

    let mut response = (StatusCode::OK, document.body).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(document.content_type));
    response.headers_mut().insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}
