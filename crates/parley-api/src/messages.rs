use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use parley_store::resolve_views;
use parley_types::api::{HistoryQuery, SendMessageRequest, UpdatesQuery, non_blank};

use crate::AppState;
use crate::error::status_for;
use crate::middleware::Caller;

/// POST /messages/send — callers may only post as themselves.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let sender = non_blank(req.sender.as_deref()).ok_or(StatusCode::BAD_REQUEST)?;
    let content = non_blank(req.content.as_deref()).ok_or(StatusCode::BAD_REQUEST)?;

    if !caller.is(sender) {
        return Err(StatusCode::FORBIDDEN);
    }

    state
        .longpoll
        .publish(sender, content)
        .map_err(|e| status_for(&e))?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /messages/updates?lastId= — long poll for messages after the cursor.
///
/// Answers at once if something newer exists, otherwise waits for the next
/// write or the poll timeout, whichever comes first. One wait per request;
/// clients call again after every response.
pub async fn get_updates(
    State(state): State<AppState>,
    Extension(_caller): Extension<Caller>,
    Query(query): Query<UpdatesQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let last_id = query
        .last_id
        .filter(|id| *id >= 0)
        .ok_or(StatusCode::BAD_REQUEST)? as u64;

    let messages = state.longpoll.poll(last_id).await.into_messages();
    let views = resolve_views(messages, &state.identity).map_err(|e| status_for(&e))?;

    Ok(Json(views))
}

/// GET /messages/history?take= — the whole log, or its last `take` entries.
pub async fn get_history(
    State(state): State<AppState>,
    Extension(_caller): Extension<Caller>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let log = state.longpoll.log();
    let messages = match query.take {
        Some(take) if take <= 0 => return Err(StatusCode::BAD_REQUEST),
        Some(take) => log.get_last(take),
        None => log.get_all(),
    };

    let views = resolve_views(messages, &state.identity).map_err(|e| status_for(&e))?;
    Ok(Json(views))
}

/// POST /messages/clear — admin only.
pub async fn clear_messages(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    if !caller.is_admin {
        return Err(StatusCode::FORBIDDEN);
    }

    let removed = state.longpoll.log().clear_all();
    info!("{} cleared {} messages", caller.username, removed);
    Ok(StatusCode::NO_CONTENT)
}
