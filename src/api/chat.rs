use axum::{extract::State, routing::post, Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::{enforce_rate_limit, CurrentUser};
use crate::core::state::AppState;
use crate::schemas::chat::{ChatRequest, ChatResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/", post(chat_turn)).route("/start", post(start_chat))
}

async fn start_chat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ChatResponse>, ApiError> {
    enforce_rate_limit(
        &state,
        "start",
        &user,
        state.settings().rate_limit().chat_start_per_window,
        "Rate limit exceeded for starting new chats. Try again in a minute.",
    )
    .await?;

    let conversation = state.chat().start(&user).await?;
    Ok(Json(ChatResponse::from_db(conversation)))
}

async fn chat_turn(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    enforce_rate_limit(
        &state,
        "chat",
        &user,
        state.settings().rate_limit().chat_per_window,
        "Rate limit exceeded for chat messages. Try again in a minute.",
    )
    .await?;

    let chat_id = payload.chat_id.as_deref().filter(|id| !id.trim().is_empty());
    let conversation = state.chat().turn(&user, chat_id, &payload.message).await?;
    Ok(Json(ChatResponse::from_db(conversation)))
}
