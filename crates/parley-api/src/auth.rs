use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{info, warn};

use parley_types::api::{CredentialsRequest, LoginResponse, non_blank};

use crate::AppState;
use crate::error::status_for;

/// POST /auth/register — create an ordinary (non-admin) account.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let username = non_blank(req.username.as_deref()).ok_or(StatusCode::BAD_REQUEST)?;
    let password = non_blank(req.password.as_deref()).ok_or(StatusCode::BAD_REQUEST)?;

    let user = state
        .identity
        .add(username, password, false)
        .map_err(|e| status_for(&e))?;

    info!("Registered {} ({})", user.username, user.id);
    Ok((StatusCode::CREATED, Json(user.username)))
}

/// POST /auth/login — check credentials and issue a fresh session token,
/// which invalidates any earlier one.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let username = non_blank(req.username.as_deref()).ok_or(StatusCode::BAD_REQUEST)?;
    let password = non_blank(req.password.as_deref()).ok_or(StatusCode::BAD_REQUEST)?;

    let user = state
        .identity
        .verify_credentials(username, password)
        .ok_or_else(|| {
            warn!("Failed login for {}", username);
            StatusCode::UNAUTHORIZED
        })?;

    // The account can vanish between the check and the token issue.
    let token = state
        .identity
        .issue_session_token(user.id)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    state
        .identity
        .record_heartbeat(user.id)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    info!("{} logged in", user.username);
    Ok(Json(LoginResponse {
        username: user.username,
        token,
    }))
}
