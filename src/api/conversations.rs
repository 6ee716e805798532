use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::schemas::chat::{ConversationDetail, ConversationSummary, MessageResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_conversations))
        .route("/:chat_id", get(get_conversation).delete(delete_conversation))
}

async fn list_conversations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let conversations = state.chat().list(&user).await?;
    Ok(Json(conversations.into_iter().map(ConversationSummary::from_db).collect()))
}

async fn get_conversation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(chat_id): Path<String>,
) -> Result<Json<ConversationDetail>, ApiError> {
    let conversation = state.chat().get(&user, &chat_id).await?;
    Ok(Json(ConversationDetail::from_db(conversation)))
}

async fn delete_conversation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(chat_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.chat().delete(&user, &chat_id).await?;
    Ok(Json(MessageResponse { message: "Conversation deleted successfully".to_string() }))
}
