use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::User;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct RoleChangeRequest {
    #[validate(email(message = "email must be an email address"))]
    pub(crate) email: String,
}

impl RoleChangeRequest {
    pub(crate) fn normalized_email(&self) -> String {
        self.email.trim().to_ascii_lowercase()
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AdminStatusResponse {
    pub(crate) is_admin: bool,
    pub(crate) is_grader: bool,
    pub(crate) email: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RoleHolder {
    pub(crate) email: String,
    pub(crate) username: String,
    pub(crate) added_at: Option<String>,
    pub(crate) added_by: String,
    pub(crate) is_admin: bool,
    pub(crate) is_grader: bool,
}

impl RoleHolder {
    pub(crate) fn admin(user: User) -> Self {
        Self {
            added_at: user.admin_since.map(format_primitive),
            added_by: user.admin_added_by.unwrap_or_else(|| "System".to_string()),
            email: user.email,
            username: user.display_name,
            is_admin: user.is_admin,
            is_grader: user.is_grader,
        }
    }

    pub(crate) fn grader(user: User) -> Self {
        Self {
            added_at: user.grader_since.map(format_primitive),
            added_by: user.grader_added_by.unwrap_or_else(|| "System".to_string()),
            email: user.email,
            username: user.display_name,
            is_admin: user.is_admin,
            is_grader: user.is_grader,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AdminListResponse {
    pub(crate) admins: Vec<RoleHolder>,
    pub(crate) total: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct GraderListResponse {
    pub(crate) graders: Vec<RoleHolder>,
    pub(crate) total: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct RoleChangeResponse {
    pub(crate) message: String,
    pub(crate) email: String,
    pub(crate) changed_by: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserListEntry {
    pub(crate) user_id: String,
    pub(crate) email: String,
    pub(crate) username: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserListResponse {
    pub(crate) users: Vec<UserListEntry>,
}
