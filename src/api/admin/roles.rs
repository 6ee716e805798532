use axum::{extract::State, Json};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::core::{state::AppState, time::primitive_now_utc};
use crate::db::models::User;
use crate::repositories::RoleGrant;
use crate::schemas::admin::{
    AdminListResponse, AdminStatusResponse, GraderListResponse, RoleChangeRequest,
    RoleChangeResponse, RoleHolder, UserListEntry, UserListResponse,
};

const UNKNOWN_USER: &str = "User not found. User must log in at least once before being made an admin.";
const UNKNOWN_GRADER: &str =
    "User not found. User must log in at least once before being made a grader.";

async fn target_user(
    state: &AppState,
    payload: &RoleChangeRequest,
    missing: &str,
) -> Result<User, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state
        .users()
        .find_user_by_email(&payload.normalized_email())
        .await?
        .ok_or_else(|| ApiError::NotFound(missing.to_string()))
}

fn grant_from(admin: &User) -> RoleGrant {
    RoleGrant { granted_by: admin.email.clone(), granted_at: primitive_now_utc() }
}

pub(super) async fn check(CurrentAdmin(admin): CurrentAdmin) -> Json<AdminStatusResponse> {
    Json(AdminStatusResponse { is_admin: admin.is_admin, is_grader: admin.is_grader, email: admin.email })
}

pub(super) async fn list_admins(
    State(state): State<AppState>,
    CurrentAdmin(_admin): CurrentAdmin,
) -> Result<Json<AdminListResponse>, ApiError> {
    let admins: Vec<RoleHolder> =
        state.users().list_admins().await?.into_iter().map(RoleHolder::admin).collect();
    Ok(Json(AdminListResponse { total: admins.len(), admins }))
}

pub(super) async fn list_graders(
    State(state): State<AppState>,
    CurrentAdmin(_admin): CurrentAdmin,
) -> Result<Json<GraderListResponse>, ApiError> {
    let graders: Vec<RoleHolder> =
        state.users().list_graders().await?.into_iter().map(RoleHolder::grader).collect();
    Ok(Json(GraderListResponse { total: graders.len(), graders }))
}

pub(super) async fn list_users(
    State(state): State<AppState>,
    CurrentAdmin(_admin): CurrentAdmin,
) -> Result<Json<UserListResponse>, ApiError> {
    let users = state
        .users()
        .list_users()
        .await?
        .into_iter()
        .map(|user| UserListEntry { user_id: user.id, email: user.email, username: user.display_name })
        .collect();
    Ok(Json(UserListResponse { users }))
}

pub(super) async fn add_admin(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Json(payload): Json<RoleChangeRequest>,
) -> Result<Json<RoleChangeResponse>, ApiError> {
    let target = target_user(&state, &payload, UNKNOWN_USER).await?;
    if target.is_admin {
        return Err(ApiError::Conflict("User is already an admin".to_string()));
    }

    state.users().set_admin(&target.id, Some(grant_from(&admin))).await?;
    tracing::info!(email = %target.email, admin = %admin.email, "Admin granted");

    Ok(Json(RoleChangeResponse {
        message: format!("Successfully added {} as admin", target.email),
        email: target.email,
        changed_by: admin.email,
    }))
}

pub(super) async fn remove_admin(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Json(payload): Json<RoleChangeRequest>,
) -> Result<Json<RoleChangeResponse>, ApiError> {
    let target = target_user(&state, &payload, UNKNOWN_USER).await?;
    if target.id == admin.id {
        return Err(ApiError::BadRequest("Cannot remove your own admin privileges".to_string()));
    }
    if !target.is_admin {
        return Err(ApiError::BadRequest("User is not an admin".to_string()));
    }

    state.users().set_admin(&target.id, None).await?;
    tracing::info!(email = %target.email, admin = %admin.email, "Admin revoked");

    Ok(Json(RoleChangeResponse {
        message: format!("Successfully removed admin privileges from {}", target.email),
        email: target.email,
        changed_by: admin.email,
    }))
}

pub(super) async fn add_grader(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Json(payload): Json<RoleChangeRequest>,
) -> Result<Json<RoleChangeResponse>, ApiError> {
    let target = target_user(&state, &payload, UNKNOWN_GRADER).await?;
    if target.is_grader {
        return Err(ApiError::Conflict("User is already a grader".to_string()));
    }

    state.users().set_grader(&target.id, Some(grant_from(&admin))).await?;
    tracing::info!(email = %target.email, admin = %admin.email, "Grader granted");

    Ok(Json(RoleChangeResponse {
        message: format!("Successfully added {} as grader", target.email),
        email: target.email,
        changed_by: admin.email,
    }))
}

pub(super) async fn remove_grader(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Json(payload): Json<RoleChangeRequest>,
) -> Result<Json<RoleChangeResponse>, ApiError> {
    let target = target_user(&state, &payload, UNKNOWN_GRADER).await?;
    if !target.is_grader {
        return Err(ApiError::BadRequest("User is not a grader".to_string()));
    }

    state.users().set_grader(&target.id, None).await?;
    tracing::info!(email = %target.email, admin = %admin.email, "Grader revoked");

    Ok(Json(RoleChangeResponse {
        message: format!("Successfully removed grader privileges from {}", target.email),
        email: target.email,
        changed_by: admin.email,
    }))
}
