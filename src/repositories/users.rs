use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use super::{PgStore, RoleGrant, StoreResult, UserDirectory};
use crate::db::models::User;

const COLUMNS: &str = "\
    id, email, display_name, is_admin, admin_since, admin_added_by, \
    is_grader, grader_since, grader_added_by, created_at, updated_at";

pub(crate) async fn upsert_identity(
    pool: &PgPool,
    id: &str,
    email: &str,
    display_name: &str,
    now: PrimitiveDateTime,
) -> StoreResult<User> {
    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (id, email, display_name, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$4)
         ON CONFLICT (id) DO UPDATE SET
            email = EXCLUDED.email,
            display_name = EXCLUDED.display_name,
            updated_at = EXCLUDED.updated_at
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(email)
    .bind(display_name)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(user)
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> StoreResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Most recently seen account wins when an email was reused.
pub(crate) async fn find_by_email(pool: &PgPool, email: &str) -> StoreResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {COLUMNS} FROM users WHERE email = $1 ORDER BY updated_at DESC LIMIT 1"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

async fn list(pool: &PgPool, filter: &str) -> StoreResult<Vec<User>> {
    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {COLUMNS} FROM users WHERE {filter} ORDER BY email"
    ))
    .fetch_all(pool)
    .await?;
    Ok(users)
}

pub(crate) async fn set_admin(
    pool: &PgPool,
    user_id: &str,
    grant: Option<RoleGrant>,
    now: PrimitiveDateTime,
) -> StoreResult<bool> {
    let (flag, since, by) = split_grant(grant);
    let result = sqlx::query(
        "UPDATE users SET is_admin = $1, admin_since = $2, admin_added_by = $3, updated_at = $4
         WHERE id = $5",
    )
    .bind(flag)
    .bind(since)
    .bind(by)
    .bind(now)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn set_grader(
    pool: &PgPool,
    user_id: &str,
    grant: Option<RoleGrant>,
    now: PrimitiveDateTime,
) -> StoreResult<bool> {
    let (flag, since, by) = split_grant(grant);
    let result = sqlx::query(
        "UPDATE users SET is_grader = $1, grader_since = $2, grader_added_by = $3, updated_at = $4
         WHERE id = $5",
    )
    .bind(flag)
    .bind(since)
    .bind(by)
    .bind(now)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

fn split_grant(grant: Option<RoleGrant>) -> (bool, Option<PrimitiveDateTime>, Option<String>) {
    match grant {
        Some(grant) => (true, Some(grant.granted_at), Some(grant.granted_by)),
        None => (false, None, None),
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn upsert_identity(
        &self,
        id: &str,
        email: &str,
        display_name: &str,
        now: PrimitiveDateTime,
    ) -> StoreResult<User> {
        upsert_identity(self.pool(), id, email, display_name, now).await
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        find_by_id(self.pool(), id).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        find_by_email(self.pool(), email).await
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        list(self.pool(), "TRUE").await
    }

    async fn list_admins(&self) -> StoreResult<Vec<User>> {
        list(self.pool(), "is_admin").await
    }

    async fn list_graders(&self) -> StoreResult<Vec<User>> {
        list(self.pool(), "is_grader").await
    }

    async fn set_admin(&self, user_id: &str, grant: Option<RoleGrant>) -> StoreResult<bool> {
        set_admin(self.pool(), user_id, grant, crate::core::time::primitive_now_utc()).await
    }

    async fn set_grader(&self, user_id: &str, grant: Option<RoleGrant>) -> StoreResult<bool> {
        set_grader(self.pool(), user_id, grant, crate::core::time::primitive_now_utc()).await
    }
}
