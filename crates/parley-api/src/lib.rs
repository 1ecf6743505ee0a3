pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod system;
pub mod users;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use parley_gateway::longpoll::LongPoll;
use parley_store::IdentityStore;

pub type AppState = Arc<AppStateInner>;

/// Stores shared by every handler. Built once by the server and handed to
/// the router; nothing here is global.
pub struct AppStateInner {
    pub identity: Arc<IdentityStore>,
    pub longpoll: LongPoll,
}

impl AppStateInner {
    pub fn new(identity: Arc<IdentityStore>, longpoll: LongPoll) -> AppState {
        Arc::new(Self { identity, longpoll })
    }
}

/// All routes. Everything outside `/auth` and `/system` sits behind the
/// session guard.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/system/health", get(system::health));

    let protected_routes = Router::new()
        .route("/messages/send", post(messages::send_message))
        .route("/messages/updates", get(messages::get_updates))
        .route("/messages/history", get(messages::get_history))
        .route("/messages/clear", post(messages::clear_messages))
        .route("/users", get(users::list_users))
        .route("/users/update", post(users::update_user))
        .route("/users/delete", post(users::delete_user))
        .route("/users/status", get(users::list_statuses))
        .route("/users/heartbeat", post(users::heartbeat))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
