//! In-memory sessions and memory archive.
//!
//! Shapes follow the agent-runtime wire format the web client speaks: events
//! carry a `content` with `role` and text `parts`, and all JSON is camelCase.
//! Nothing here survives a restart.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::model::{DietaryRestrictions, MealKind};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

/// A message: who said it and what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

fn default_role() -> String {
    "user".to_string()
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::text(text)],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part::text(text)],
        }
    }

    /// All text parts joined with newlines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One entry in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub invocation_id: String,
    /// `"user"` or the name of the agent that produced the event.
    pub author: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Event {
    pub fn new(invocation_id: &str, author: impl Into<String>, content: Content) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invocation_id: invocation_id.to_string(),
            author: author.into(),
            timestamp: now_seconds(),
            content,
            error_message: None,
        }
    }

    /// An agent event reporting a failed turn.
    pub fn error(invocation_id: &str, author: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut event = Self::new(invocation_id, author, Content::model(message.clone()));
        event.error_message = Some(message);
        event
    }
}

fn now_seconds() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Conversation state carried between turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// `None` until the user has answered; `Some(empty)` means no restrictions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dietary_restrictions: Option<DietaryRestrictions>,
    /// Meals asked for on a turn that was waiting on restrictions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_meals: Vec<MealKind>,
    /// Caller-supplied keys kept as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    pub state: SessionState,
    pub events: Vec<Event>,
    pub last_update_time: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session {0} already exists")]
    AlreadyExists(String),

    #[error("session {0} not found")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    app: String,
    user: String,
    id: String,
}

impl SessionKey {
    fn new(app: &str, user: &str, id: &str) -> Self {
        Self {
            app: app.to_string(),
            user: user.to_string(),
            id: id.to_string(),
        }
    }
}

/// Sessions keyed by app, user and session id.
#[derive(Debug, Default)]
pub struct SessionService {
    sessions: RwLock<HashMap<SessionKey, Session>>,
}

impl SessionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session. A missing `id` gets a fresh UUID.
    pub async fn create(
        &self,
        app: &str,
        user: &str,
        id: Option<&str>,
        state: SessionState,
    ) -> Result<Session, SessionError> {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let key = SessionKey::new(app, user, &id);
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&key) {
            return Err(SessionError::AlreadyExists(id));
        }
        let session = Session {
            id: id.clone(),
            app_name: app.to_string(),
            user_id: user.to_string(),
            state,
            events: Vec::new(),
            last_update_time: now_seconds(),
        };
        sessions.insert(key, session.clone());
        debug!(app, user, session_id = %id, "session created");
        Ok(session)
    }

    pub async fn get(&self, app: &str, user: &str, id: &str) -> Option<Session> {
        self.sessions
            .read()
            .await
            .get(&SessionKey::new(app, user, id))
            .cloned()
    }

    /// Sessions for one user, oldest update first.
    pub async fn list(&self, app: &str, user: &str) -> Vec<Session> {
        let sessions = self.sessions.read().await;
        let mut out: Vec<Session> = sessions
            .values()
            .filter(|s| s.app_name == app && s.user_id == user)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.last_update_time.total_cmp(&b.last_update_time));
        out
    }

    pub async fn delete(&self, app: &str, user: &str, id: &str) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .remove(&SessionKey::new(app, user, id))
            .map(|_| ())
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Append events and replace the state in one step.
    pub async fn commit(
        &self,
        app: &str,
        user: &str,
        id: &str,
        events: &[Event],
        state: SessionState,
    ) -> Result<Session, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&SessionKey::new(app, user, id))
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.events.extend_from_slice(events);
        session.state = state;
        session.last_update_time = now_seconds();
        Ok(session.clone())
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// A remembered message from an archived session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub session_id: String,
    pub author: String,
    pub text: String,
    pub timestamp: f64,
}

/// Archive of past conversations, searchable by keyword.
#[derive(Debug, Default)]
pub struct MemoryService {
    entries: RwLock<HashMap<(String, String), HashMap<String, Vec<MemoryEntry>>>>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the session's text events, replacing any earlier archive of the
    /// same session.
    pub async fn archive(&self, session: &Session) {
        let entries: Vec<MemoryEntry> = session
            .events
            .iter()
            .map(|e| MemoryEntry {
                session_id: session.id.clone(),
                author: e.author.clone(),
                text: e.content.text(),
                timestamp: e.timestamp,
            })
            .filter(|m| !m.text.trim().is_empty())
            .collect();
        debug!(session_id = %session.id, entries = entries.len(), "session archived to memory");
        self.entries
            .write()
            .await
            .entry((session.app_name.clone(), session.user_id.clone()))
            .or_default()
            .insert(session.id.clone(), entries);
    }

    /// Entries for one user containing any word of `query`, case-insensitively.
    pub async fn search(&self, app: &str, user: &str, query: &str) -> Vec<MemoryEntry> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if words.is_empty() {
            return Vec::new();
        }
        let entries = self.entries.read().await;
        let Some(by_session) = entries.get(&(app.to_string(), user.to_string())) else {
            return Vec::new();
        };
        let mut hits: Vec<MemoryEntry> = by_session
            .values()
            .flatten()
            .filter(|m| {
                let text = m.text.to_lowercase();
                words.iter().any(|w| text.contains(w.as_str()))
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let svc = SessionService::new();
        svc.create("app", "u1", Some("s1"), SessionState::default())
            .await
            .unwrap();
        let err = svc
            .create("app", "u1", Some("s1"), SessionState::default())
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::AlreadyExists("s1".to_string()));
        // Same id under another user is a different session.
        svc.create("app", "u2", Some("s1"), SessionState::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_generates_id() {
        let svc = SessionService::new();
        let session = svc
            .create("app", "u1", None, SessionState::default())
            .await
            .unwrap();
        assert!(Uuid::parse_str(&session.id).is_ok());
        assert_eq!(svc.list("app", "u1").await.len(), 1);
    }

    #[tokio::test]
    async fn commit_appends_events_and_state() {
        let svc = SessionService::new();
        svc.create("app", "u1", Some("s1"), SessionState::default())
            .await
            .unwrap();
        let state = SessionState {
            dietary_restrictions: Some(DietaryRestrictions::new(["vegan"])),
            ..SessionState::default()
        };
        let event = Event::new("inv", "user", Content::user("vegan please"));
        let session = svc
            .commit("app", "u1", "s1", &[event], state.clone())
            .await
            .unwrap();
        assert_eq!(session.events.len(), 1);
        assert_eq!(session.state, state);

        let missing = svc
            .commit("app", "u1", "nope", &[], SessionState::default())
            .await
            .unwrap_err();
        assert_eq!(missing, SessionError::NotFound("nope".to_string()));
    }

    #[tokio::test]
    async fn delete_removes_session() {
        let svc = SessionService::new();
        svc.create("app", "u1", Some("s1"), SessionState::default())
            .await
            .unwrap();
        svc.delete("app", "u1", "s1").await.unwrap();
        assert!(svc.get("app", "u1", "s1").await.is_none());
        assert!(svc.delete("app", "u1", "s1").await.is_err());
    }

    #[test]
    fn event_serializes_camel_case() {
        let event = Event::new("inv-1", "meal_prep_agent", Content::model("hello"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["invocationId"], "inv-1");
        assert_eq!(json["content"]["role"], "model");
        assert_eq!(json["content"]["parts"][0]["text"], "hello");
        assert!(json.get("errorMessage").is_none());
    }

    #[test]
    fn state_keeps_unknown_keys() {
        let state: SessionState = serde_json::from_value(serde_json::json!({
            "dietaryRestrictions": ["Gluten Free"],
            "theme": "dark"
        }))
        .unwrap();
        assert!(state.dietary_restrictions.unwrap().contains("gluten-free"));
        assert_eq!(state.extra["theme"], "dark");
    }

    #[tokio::test]
    async fn memory_search_matches_words() {
        let svc = SessionService::new();
        svc.create("app", "u1", Some("s1"), SessionState::default())
            .await
            .unwrap();
        let session = svc
            .commit(
                "app",
                "u1",
                "s1",
                &[
                    Event::new("inv", "user", Content::user("I am vegetarian")),
                    Event::new("inv", "meal_prep_agent", Content::model("Lentil curry on Monday")),
                ],
                SessionState::default(),
            )
            .await
            .unwrap();
        let memory = MemoryService::new();
        memory.archive(&session).await;
        memory.archive(&session).await;

        let hits = memory.search("app", "u1", "CURRY").await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].author, "meal_prep_agent");
        assert!(memory.search("app", "u2", "curry").await.is_empty());
        assert!(memory.search("app", "u1", "   ").await.is_empty());
    }
}
