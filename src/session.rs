use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::auth::Role;

/// Absolute session lifetime, fixed at login. Validation never extends it.
pub const SESSION_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub role: Role,
    pub expires_at: Instant,
}

/// In-process session store keyed by opaque token. Lives inside `AppState`
/// and is handed to handlers explicitly; nothing here is global.
pub struct SessionStore {
    ttl: Duration,
    sessions: HashMap<String, Session>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SESSION_TTL)
    }
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: HashMap::new(),
        }
    }

    pub fn issue(&mut self, username: &str, role: Role) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                role,
                expires_at: Instant::now() + self.ttl,
            },
        );
        log::debug!("session issued user={}", username);
        token
    }

    /// Looks the token up, dropping the entry if it has expired.
    pub fn validate(&mut self, token: &str) -> Option<Session> {
        let expired = match self.sessions.get(token) {
            Some(s) => s.expires_at <= Instant::now(),
            None => return None,
        };
        if expired {
            self.sessions.remove(token);
            return None;
        }
        self.sessions.get(token).cloned()
    }

    pub fn logout(&mut self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }
}
