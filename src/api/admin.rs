use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::core::state::AppState;

mod catalog;
mod roles;


pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/assignment-templates",
            get(catalog::list_templates).post(catalog::create_template),
        )
        .route(
            "/assignment-templates/:template_id",
            get(catalog::get_template).put(catalog::update_template).delete(catalog::delete_template),
        )
        .route("/assignments", get(catalog::list_assignments).post(catalog::create_assignment))
        .route(
            "/assignments/:assignment_id",
            get(catalog::get_assignment).delete(catalog::delete_assignment),
        )
        .route("/assignments/:assignment_id/students", put(catalog::update_roster))
        .route("/assignments/:assignment_id/progress", get(catalog::staff_progress))
        .route("/assignments/:assignment_id/grades", post(catalog::grade_submission))
        .route("/assignments/:assignment_id/export", post(catalog::export_progress))
        .route("/check", get(roles::check))
        .route("/list", get(roles::list_admins))
        .route("/users", get(roles::list_users))
        .route("/add", post(roles::add_admin))
        .route("/remove", delete(roles::remove_admin))
        .route("/graders", get(roles::list_graders))
        .route("/graders/add", post(roles::add_grader))
        .route("/graders/remove", delete(roles::remove_grader))
}
