use time::PrimitiveDateTime;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::User;
use crate::repositories::{RoleGrant, StoreResult};

const SYSTEM_GRANTOR: &str = "System";

/// Grants admin to `FIRST_ADMIN_EMAIL` at startup while no admin exists
/// yet and that user already exists. Otherwise the grant happens on
/// their first sign-in. A later demotion is never undone.
pub(crate) async fn ensure_first_admin(state: &AppState) -> anyhow::Result<()> {
    let Some(email) = state.settings().admin().first_admin_email.clone() else {
        tracing::debug!("FIRST_ADMIN_EMAIL not configured; skipping admin bootstrap");
        return Ok(());
    };

    if !state.users().list_admins().await?.is_empty() {
        tracing::info!(email = %email, "Admins already in place; skipping admin bootstrap");
        return Ok(());
    }

    match state.users().find_user_by_email(&email).await? {
        Some(user) => grant_admin(state, &user).await?,
        None => {
            tracing::info!(email = %email, "First admin has not signed in yet; will promote on first login");
        }
    }

    Ok(())
}

/// Promotes `user` when this request created their account and the email is
/// the configured first admin.
pub(crate) async fn promote_on_first_sign_in(
    state: &AppState,
    user: User,
    signed_in_at: PrimitiveDateTime,
) -> StoreResult<User> {
    let is_first_admin = state
        .settings()
        .admin()
        .first_admin_email
        .as_deref()
        .is_some_and(|email| email == user.email);

    if !is_first_admin || user.is_admin || user.created_at != signed_in_at {
        return Ok(user);
    }

    grant_admin(state, &user).await?;
    Ok(state.users().find_user(&user.id).await?.unwrap_or(user))
}

async fn grant_admin(state: &AppState, user: &User) -> StoreResult<()> {
    let grant = RoleGrant { granted_by: SYSTEM_GRANTOR.to_string(), granted_at: primitive_now_utc() };
    state.users().set_admin(&user.id, Some(grant)).await?;
    tracing::info!(email = %user.email, "Granted admin to first admin account");
    Ok(())
}
