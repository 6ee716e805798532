use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::format_primitive;
use crate::schemas::assignment::{
    AcceptResponse, AssignmentProgressResponse, QuestionChatQuery, QuestionChatResponse,
    QuestionChatsEntry, QuestionProgressResponse, StudentAssignmentSummary, SubmitAnswerRequest,
    SubmitAnswerResponse,
};
use crate::services::lifecycle::{AssignmentOverview, AssignmentProgress};


pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_assignments))
        .route("/:assignment_id", get(get_progress))
        .route("/:assignment_id/accept", post(accept_assignment))
        .route("/:assignment_id/chats", get(question_chats))
        .route("/:assignment_id/questions/:question_id/chat", get(question_chat))
        .route("/:assignment_id/questions/:question_id/submit", post(submit_answer))
}

async fn list_assignments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<StudentAssignmentSummary>>, ApiError> {
    let overview = state.lifecycle().list_for_student(&user).await?;
    Ok(Json(overview.into_iter().map(summary_from_overview).collect()))
}

async fn accept_assignment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(assignment_id): Path<String>,
) -> Result<Json<AcceptResponse>, ApiError> {
    let record = state.lifecycle().accept(&assignment_id, &user).await?;

    Ok(Json(AcceptResponse {
        message: "Assignment accepted successfully".to_string(),
        conversations_created: record.len(),
    }))
}

async fn get_progress(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(assignment_id): Path<String>,
) -> Result<Json<AssignmentProgressResponse>, ApiError> {
    let progress = state.lifecycle().progress(&assignment_id, &user).await?;
    Ok(Json(progress_response(progress)))
}

async fn question_chat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((assignment_id, question_id)): Path<(String, String)>,
    Query(query): Query<QuestionChatQuery>,
) -> Result<Json<QuestionChatResponse>, ApiError> {
    let bound = state
        .lifecycle()
        .bind_or_create(&assignment_id, &question_id, &user, query.reset)
        .await?;

    Ok(Json(QuestionChatResponse {
        chat_id: bound.chat_id,
        created: bound.created,
        question_id: bound.entry.question_id,
        number: bound.entry.number,
        prompt_md: bound.entry.prompt_md,
        archived_chat_ids: bound.entry.archived_chat_ids.0,
    }))
}

async fn submit_answer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((assignment_id, question_id)): Path<(String, String)>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let entry = state
        .lifecycle()
        .submit_answer(&assignment_id, &question_id, &user, &payload.chat_id, &payload.message)
        .await?;

    let (Some(index), Some(submitted_at)) = (entry.solution_message_index, entry.submitted_at)
    else {
        return Err(ApiError::Internal("Submission was not recorded".to_string()));
    };

    Ok(Json(SubmitAnswerResponse {
        message: "Answer submitted successfully".to_string(),
        attempts: entry.attempts,
        solution_message_index: index,
        submitted_at: format_primitive(submitted_at),
    }))
}

async fn question_chats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(assignment_id): Path<String>,
) -> Result<Json<Vec<QuestionChatsEntry>>, ApiError> {
    let progress = state.lifecycle().progress(&assignment_id, &user).await?;

    Ok(Json(
        progress
            .record
            .into_ordered_entries()
            .into_iter()
            .map(|entry| QuestionChatsEntry {
                question_id: entry.question_id,
                number: entry.number,
                prompt_md: entry.prompt_md,
                chat_id: entry.chat_id,
                archived_chat_ids: entry.archived_chat_ids.0,
            })
            .collect(),
    ))
}

fn summary_from_overview(overview: AssignmentOverview) -> StudentAssignmentSummary {
    let AssignmentOverview { assignment, record } = overview;
    StudentAssignmentSummary {
        total_questions: assignment.questions.len(),
        questions_answered: record.as_ref().map(|record| record.answered_count()).unwrap_or(0),
        accepted: record.is_some(),
        accepted_at: record.as_ref().map(|record| format_primitive(record.header.accepted_at)),
        created_at: format_primitive(assignment.created_at),
        assignment_id: assignment.id,
        title: assignment.title,
        description: assignment.description,
    }
}

fn progress_response(progress: AssignmentProgress) -> AssignmentProgressResponse {
    let AssignmentProgress { assignment, record } = progress;
    AssignmentProgressResponse {
        assignment_id: assignment.id,
        title: assignment.title,
        description: assignment.description,
        accepted_at: format_primitive(record.header.accepted_at),
        questions: record
            .into_ordered_entries()
            .into_iter()
            .map(QuestionProgressResponse::from_db)
            .collect(),
    }
}
