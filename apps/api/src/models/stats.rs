use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// AI credit allowance granted to every new account.
pub const INITIAL_AI_CREDITS: i32 = 240;

/// Per-user usage counters. `user_id` points back at the user; the record
/// does not own it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StatsRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub resume_created: i32,
    pub application_tailored: i32,
    pub application_tracked: i32,
    pub ai_credits: i32,
    pub created_at: DateTime<Utc>,
}

impl StatsRow {
    /// The record every account starts with.
    pub fn initial(user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            resume_created: 0,
            application_tailored: 0,
            application_tracked: 0,
            ai_credits: INITIAL_AI_CREDITS,
            created_at: Utc::now(),
        }
    }
}
