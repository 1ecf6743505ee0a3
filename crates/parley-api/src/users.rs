use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, info};

use parley_types::api::{DeleteUserRequest, UpdateUserRequest, non_blank};

use crate::AppState;
use crate::error::status_for;
use crate::middleware::Caller;

/// GET /users — registered usernames, 204 when there are none.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_caller): Extension<Caller>,
) -> Response {
    let usernames = state.identity.list_usernames();
    if usernames.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    Json(usernames).into_response()
}

/// GET /users/status — online flag per user, 204 when there are none.
pub async fn list_statuses(
    State(state): State<AppState>,
    Extension(_caller): Extension<Caller>,
) -> Response {
    let statuses = state.identity.list_statuses();
    if statuses.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    Json(statuses).into_response()
}

/// POST /users/heartbeat
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    state
        .identity
        .record_heartbeat(caller.id)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    Ok(StatusCode::OK)
}

/// POST /users/update — rename and/or change password of yourself, or of
/// anyone when admin.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let username = non_blank(req.username.as_deref()).ok_or(StatusCode::BAD_REQUEST)?;
    let new_username = non_blank(req.new_username.as_deref());
    let new_password = non_blank(req.new_password.as_deref());
    if new_username.is_none() && new_password.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }

    if !caller.may_manage(username) {
        return Err(StatusCode::FORBIDDEN);
    }

    let user = state
        .identity
        .update(username, new_username.unwrap_or(username), new_password)
        .map_err(|e| status_for(&e))?;

    info!("{} updated account {} ({})", caller.username, user.username, user.id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /users/delete — delete yourself, or anyone when admin. The caller's
/// own password must be supplied again.
///
/// The user's messages go with the account so the log never points at a
/// user that no longer exists.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<DeleteUserRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let username = non_blank(req.username.as_deref()).ok_or(StatusCode::BAD_REQUEST)?;
    let password = non_blank(req.password.as_deref()).ok_or(StatusCode::BAD_REQUEST)?;

    if !caller.may_manage(username) {
        return Err(StatusCode::FORBIDDEN);
    }

    let verified = state
        .identity
        .get_by_id(caller.id)
        .is_some_and(|me| me.password == password);
    if !verified {
        return Err(StatusCode::FORBIDDEN);
    }

    let target = state
        .identity
        .get_by_username(username)
        .ok_or(StatusCode::BAD_REQUEST)?;

    // Account first: appends confirm the sender under the log lock, so any
    // message that got in before the removal is caught by the purge below.
    let removed = state.identity.remove_by_id(target.id).map_err(|e| {
        error!("Failed to delete user {}: {}", target.id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let purged = state.longpoll.log().remove_by_sender(removed.id);

    info!(
        "{} deleted account {} ({}), {} messages removed",
        caller.username, removed.username, removed.id, purged
    );
    Ok(StatusCode::NO_CONTENT)
}
