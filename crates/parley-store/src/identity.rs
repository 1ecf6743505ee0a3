use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Duration;
use tracing::debug;

use parley_types::api::UserStatus;
use parley_types::models::User;

use crate::clock::Clock;
use crate::{StoreError, read_lock, write_lock};

/// Directory of registered users, indexed by id, username and session token.
///
/// All three indexes live behind one lock so a rename or token re-issue is
/// never observed half-applied.
pub struct IdentityStore {
    directory: RwLock<Directory>,
    clock: Arc<dyn Clock>,
    online_window: Duration,
}

#[derive(Default)]
struct Directory {
    next_id: u64,
    by_id: BTreeMap<u64, User>,
    /// Lowercased username -> id.
    by_username: HashMap<String, u64>,
    by_token: HashMap<String, u64>,
}

impl Directory {
    fn id_for(&self, username: &str) -> Option<u64> {
        self.by_username.get(&username_key(username)).copied()
    }

    fn fresh_token(&self) -> String {
        loop {
            let token = generate_token();
            if !self.by_token.contains_key(&token) {
                return token;
            }
        }
    }

    fn purge(&mut self, id: u64) -> Option<User> {
        let user = self.by_id.remove(&id)?;
        self.by_username.remove(&username_key(&user.username));
        self.by_token.remove(&user.session_token);
        Some(user)
    }
}

impl IdentityStore {
    pub fn new(clock: Arc<dyn Clock>, online_window: Duration) -> Self {
        Self {
            directory: RwLock::new(Directory::default()),
            clock,
            online_window,
        }
    }

    /// Register a new user. The account starts with a session token and
    /// counts as seen now.
    pub fn add(&self, username: &str, password: &str, is_admin: bool) -> Result<User, StoreError> {
        if username.trim().is_empty() {
            return Err(StoreError::InvalidInput("username is blank"));
        }
        if password.is_empty() {
            return Err(StoreError::InvalidInput("password is blank"));
        }

        let now = self.clock.now();
        let mut dir = write_lock(&self.directory);
        if dir.id_for(username).is_some() {
            return Err(StoreError::UsernameTaken);
        }

        dir.next_id += 1;
        let user = User {
            id: dir.next_id,
            username: username.to_string(),
            password: password.to_string(),
            is_admin,
            session_token: dir.fresh_token(),
            last_seen: now,
        };

        dir.by_username.insert(username_key(username), user.id);
        dir.by_token.insert(user.session_token.clone(), user.id);
        dir.by_id.insert(user.id, user.clone());
        Ok(user)
    }

    /// Rename and/or change the password of `old_username`.
    pub fn update(
        &self,
        old_username: &str,
        new_username: &str,
        new_password: Option<&str>,
    ) -> Result<User, StoreError> {
        if new_username.trim().is_empty() {
            return Err(StoreError::InvalidInput("username is blank"));
        }
        if new_password.is_some_and(str::is_empty) {
            return Err(StoreError::InvalidInput("password is blank"));
        }

        let mut dir = write_lock(&self.directory);
        let id = dir.id_for(old_username).ok_or(StoreError::NotFound)?;

        let old_key = username_key(old_username);
        let new_key = username_key(new_username);
        if new_key != old_key && dir.by_username.contains_key(&new_key) {
            return Err(StoreError::UsernameTaken);
        }

        dir.by_username.remove(&old_key);
        dir.by_username.insert(new_key, id);

        let user = dir.by_id.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.username = new_username.to_string();
        if let Some(password) = new_password {
            user.password = password.to_string();
        }
        Ok(user.clone())
    }

    pub fn remove(&self, username: &str) -> Result<User, StoreError> {
        let mut dir = write_lock(&self.directory);
        let id = dir.id_for(username).ok_or(StoreError::NotFound)?;
        dir.purge(id).ok_or(StoreError::NotFound)
    }

    pub fn remove_by_id(&self, id: u64) -> Result<User, StoreError> {
        write_lock(&self.directory).purge(id).ok_or(StoreError::NotFound)
    }

    pub fn get_by_username(&self, username: &str) -> Option<User> {
        let dir = read_lock(&self.directory);
        dir.id_for(username).and_then(|id| dir.by_id.get(&id).cloned())
    }

    pub fn get_by_id(&self, id: u64) -> Option<User> {
        read_lock(&self.directory).by_id.get(&id).cloned()
    }

    pub fn get_by_session_token(&self, token: &str) -> Option<User> {
        let dir = read_lock(&self.directory);
        dir.by_token.get(token).and_then(|id| dir.by_id.get(id).cloned())
    }

    /// Usernames in registration order.
    pub fn list_usernames(&self) -> Vec<String> {
        read_lock(&self.directory)
            .by_id
            .values()
            .map(|u| u.username.clone())
            .collect()
    }

    /// Online status of every user, recomputed against the clock on each call.
    pub fn list_statuses(&self) -> Vec<UserStatus> {
        let dir = read_lock(&self.directory);
        dir.by_id
            .values()
            .map(|u| UserStatus {
                username: u.username.clone(),
                online: self.is_online(u),
            })
            .collect()
    }

    pub fn is_online(&self, user: &User) -> bool {
        self.clock.now() - user.last_seen < self.online_window
    }

    /// Replace the user's session token. The previous token stops resolving.
    pub fn issue_session_token(&self, user_id: u64) -> Result<String, StoreError> {
        let mut dir = write_lock(&self.directory);
        let token = dir.fresh_token();

        let user = dir.by_id.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        let previous = std::mem::replace(&mut user.session_token, token.clone());

        dir.by_token.remove(&previous);
        dir.by_token.insert(token.clone(), user_id);
        debug!("Issued new session token for user {}", user_id);
        Ok(token)
    }

    pub fn record_heartbeat(&self, user_id: u64) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut dir = write_lock(&self.directory);
        let user = dir.by_id.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.last_seen = now;
        Ok(())
    }

    /// Look up `username` and compare the password by exact equality.
    pub fn verify_credentials(&self, username: &str, password: &str) -> Option<User> {
        self.get_by_username(username)
            .filter(|user| user.password == password)
    }
}

fn username_key(username: &str) -> String {
    username.to_lowercase()
}

fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}
