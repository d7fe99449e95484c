use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Stored session row, keyed by the opaque token carried in the cookie.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SessionRecord {
    pub session_token: String,
    pub user_id: Uuid,
    pub expires: DateTime<Utc>,
}

/// A stored verification token. `token` is the hashed form.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct VerificationToken {
    pub identifier: String,
    pub token: String,
    pub expires: DateTime<Utc>,
}

/// Session view returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionUser {
    /// The user's id from the `users` table. Filled in by the enricher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
}
