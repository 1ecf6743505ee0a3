use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use parley_store::IdentityStore;
use parley_types::models::User;

use crate::AppState;

/// Header carrying the session token (`SessionAuthToken`; header names are
/// case-insensitive).
pub const SESSION_TOKEN_HEADER: &str = "sessionauthtoken";

/// The authenticated user behind a request, as resolved when it arrived.
#[derive(Debug, Clone)]
pub struct Caller {
    pub id: u64,
    pub username: String,
    pub is_admin: bool,
}

impl Caller {
    pub fn is(&self, username: &str) -> bool {
        self.username.to_lowercase() == username.to_lowercase()
    }

    /// Admins may act on any account; everyone else only on their own.
    pub fn may_manage(&self, username: &str) -> bool {
        self.is_admin || self.is(username)
    }
}

impl From<User> for Caller {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            is_admin: user.is_admin,
        }
    }
}

/// Resolve a presented token to its user. Absent or blank tokens never match.
pub fn authenticate(identity: &IdentityStore, token: Option<&str>) -> Option<User> {
    let token = token.map(str::trim).filter(|t| !t.is_empty())?;
    identity.get_by_session_token(token)
}

/// Reject the request unless it carries a live session token.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = req
        .headers()
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    let user = authenticate(&state.identity, token).ok_or_else(|| {
        warn!("Rejected {} {}: no valid session", req.method(), req.uri().path());
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(Caller::from(user));
    Ok(next.run(req).await)
}
