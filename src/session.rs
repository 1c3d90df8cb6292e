//! Cookie-backed authentication sessions.
//!
//! Sessions live in process memory keyed by a random id carried in the
//! `dancify_session` cookie. Each session holds the user's current token
//! pair; refreshed tokens are written back so later requests reuse them.

use axum::http::HeaderMap;
use axum::http::header;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::spotify::TokenInfo;

pub const SESSION_COOKIE: &str = "dancify_session";

#[derive(Debug, Clone)]
pub struct Session {
    pub token: TokenInfo,
    pub user_id: String,
    pub display_name: String,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a session and return its new id.
    pub async fn insert(&self, session: Session) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions.write().await.insert(id.clone(), session);
        id
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }

    /// Replace the token of an existing session after a refresh.
    pub async fn update_token(&self, id: &str, token: TokenInfo) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.token = token;
        }
    }
}

/// Extract the session id from the request's Cookie header, if present.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|cookie| {
        let (name, value) = cookie.trim().split_once('=')?;
        if name == SESSION_COOKIE && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}

/// Set-Cookie value establishing a session.
pub fn session_cookie(id: &str) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax")
}

/// Set-Cookie value clearing the session cookie.
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0")
}
