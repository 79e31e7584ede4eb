use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// In-memory login sessions keyed by bearer token. Sessions do not survive
/// a server restart.
pub struct SessionStore {
    ttl: Duration,
    sessions: HashMap<String, Session>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: HashMap::new(),
        }
    }

    /// Open a session for a user and return its token.
    pub fn create(&mut self, user_id: i64) -> String {
        self.purge_expired();
        let token = generate_token();
        self.sessions.insert(
            token.clone(),
            Session {
                user_id,
                expires_at: Utc::now() + self.ttl,
            },
        );
        token
    }

    pub fn get(&self, token: &str) -> Option<&Session> {
        self.sessions
            .get(token)
            .filter(|session| session.expires_at > Utc::now())
    }

    pub fn revoke(&mut self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    fn purge_expired(&mut self) {
        let now = Utc::now();
        self.sessions.retain(|_, session| session.expires_at > now);
    }
}

fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes
        .iter()
        .fold(String::with_capacity(64), |mut acc: String, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}
