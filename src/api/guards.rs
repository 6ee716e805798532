use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{bootstrap, state::AppState, time::primitive_now_utc};
use crate::db::models::User;

pub(crate) struct CurrentUser(pub(crate) User);
pub(crate) struct CurrentAdmin(pub(crate) User);
/// Graders and admins.
pub(crate) struct CurrentStaff(pub(crate) User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let identity = app_state.identity().resolve(token).await.map_err(|err| {
            tracing::debug!(error = %err, "Bearer token rejected");
            ApiError::Unauthorized("Invalid authentication credentials")
        })?;

        let now = primitive_now_utc();
        let user = app_state
            .users()
            .upsert_identity(&identity.id, &identity.email, &identity.name, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load user"))?;

        let user = bootstrap::promote_on_first_sign_in(&app_state, user, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to promote first admin"))?;

        Ok(CurrentUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if user.is_admin {
            Ok(CurrentAdmin(user))
        } else {
            Err(ApiError::Forbidden("Admin access required"))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStaff {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if user.is_staff() {
            Ok(CurrentStaff(user))
        } else {
            Err(ApiError::Forbidden("Grader or admin access required"))
        }
    }
}

/// Counts one hit against `scope:{user}` and refuses once the window is full.
pub(crate) async fn enforce_rate_limit(
    state: &AppState,
    scope: &'static str,
    user: &User,
    limit: u64,
    message: &'static str,
) -> Result<(), ApiError> {
    let window = std::time::Duration::from_secs(state.settings().rate_limit().window_seconds);
    let key = format!("{scope}:{}", user.id);

    if state.rate_limiter().allow(&key, limit, window).await {
        return Ok(());
    }

    crate::core::metrics::rate_limited(scope);
    tracing::warn!(scope, user_id = %user.id, "Rate limit exceeded");
    Err(ApiError::TooManyRequests(message))
}
