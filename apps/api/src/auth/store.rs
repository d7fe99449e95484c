//! Identity persistence: users, accounts, sessions, verification tokens and
//! the per-user stats record created on first sign-in.
//!
//! The sign-in flow depends only on the `IdentityStore` trait. `AppState`
//! carries an `Arc<dyn IdentityStore>`; production uses `PgIdentityStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::session::{SessionRecord, VerificationToken};
use crate::models::stats::StatsRow;
use crate::models::user::{Account, NewUser, User};

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn create_verification_token(&self, token: &VerificationToken) -> Result<(), AppError>;

    /// Removes and returns the matching token. At most one caller ever gets
    /// `Some` for a given token; expiry is checked by the caller.
    async fn use_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
    ) -> Result<Option<VerificationToken>, AppError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Inserts a new user. Returns `None` when the email is already taken,
    /// e.g. a concurrent first sign-in won the race.
    async fn create_user(&self, user: &NewUser) -> Result<Option<User>, AppError>;

    async fn mark_email_verified(&self, user_id: Uuid, at: DateTime<Utc>)
        -> Result<User, AppError>;

    async fn link_account(&self, account: &Account) -> Result<(), AppError>;

    /// Returns `false` if the user already had a stats record.
    async fn create_stats(&self, stats: &StatsRow) -> Result<bool, AppError>;

    /// Creates the default stats record for every user without one.
    async fn create_missing_stats(&self) -> Result<u64, AppError>;

    async fn create_session(&self, session: &SessionRecord) -> Result<(), AppError>;

    async fn get_session_and_user(
        &self,
        session_token: &str,
    ) -> Result<Option<(SessionRecord, User)>, AppError>;

    async fn update_session_expiry(
        &self,
        session_token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn delete_session(&self, session_token: &str) -> Result<(), AppError>;

    /// Deletes verification tokens that expired at or before `now`.
    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, AppError>;

    /// Deletes sessions that expired at or before `now`.
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SessionUserRow {
    session_token: String,
    expires: DateTime<Utc>,
    #[sqlx(flatten)]
    user: User,
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn create_verification_token(&self, token: &VerificationToken) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO verification_tokens (identifier, token, expires) VALUES ($1, $2, $3)",
        )
        .bind(&token.identifier)
        .bind(&token.token)
        .bind(token.expires)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn use_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
    ) -> Result<Option<VerificationToken>, AppError> {
        // Single statement: concurrent redemptions serialize on the row lock,
        // and only the first DELETE returns it.
        Ok(sqlx::query_as::<_, VerificationToken>(
            r#"
            DELETE FROM verification_tokens
            WHERE identifier = $1 AND token = $2
            RETURNING identifier, token, expires
            "#,
        )
        .bind(identifier)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, email_verified, image, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_user(&self, user: &NewUser) -> Result<Option<User>, AppError> {
        Ok(sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, email_verified, image)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, name, email, email_verified, image, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.image)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn mark_email_verified(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<User, AppError> {
        Ok(sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET email_verified = $2
            WHERE id = $1
            RETURNING id, name, email, email_verified, image, created_at
            "#,
        )
        .bind(user_id)
        .bind(at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn link_account(&self, account: &Account) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, user_id, type, provider, provider_account_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (provider, provider_account_id) DO NOTHING
            "#,
        )
        .bind(account.id)
        .bind(account.user_id)
        .bind(&account.account_type)
        .bind(&account.provider)
        .bind(&account.provider_account_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_stats(&self, stats: &StatsRow) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO stats
                (id, user_id, resume_created, application_tailored,
                 application_tracked, ai_credits, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(stats.id)
        .bind(stats.user_id)
        .bind(stats.resume_created)
        .bind(stats.application_tailored)
        .bind(stats.application_tracked)
        .bind(stats.ai_credits)
        .bind(stats.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn create_missing_stats(&self) -> Result<u64, AppError> {
        // Column defaults carry the initial counters and credit allowance.
        let result = sqlx::query(
            r#"
            INSERT INTO stats (id, user_id)
            SELECT gen_random_uuid(), u.id
            FROM users u
            WHERE NOT EXISTS (SELECT 1 FROM stats s WHERE s.user_id = u.id)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn create_session(&self, session: &SessionRecord) -> Result<(), AppError> {
        sqlx::query("INSERT INTO sessions (session_token, user_id, expires) VALUES ($1, $2, $3)")
            .bind(&session.session_token)
            .bind(session.user_id)
            .bind(session.expires)
            .execute(&self.pool)
            .await?;
        debug!(user_id = %session.user_id, "Session created");
        Ok(())
    }

    async fn get_session_and_user(
        &self,
        session_token: &str,
    ) -> Result<Option<(SessionRecord, User)>, AppError> {
        let row = sqlx::query_as::<_, SessionUserRow>(
            r#"
            SELECT s.session_token, s.expires,
                   u.id, u.name, u.email, u.email_verified, u.image, u.created_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.session_token = $1
            "#,
        )
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let record = SessionRecord {
                session_token: r.session_token,
                user_id: r.user.id,
                expires: r.expires,
            };
            (record, r.user)
        }))
    }

    async fn update_session_expiry(
        &self,
        session_token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE sessions SET expires = $2 WHERE session_token = $1")
            .bind(session_token)
            .bind(expires)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_session(&self, session_token: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sessions WHERE session_token = $1")
            .bind(session_token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM verification_tokens WHERE expires <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
