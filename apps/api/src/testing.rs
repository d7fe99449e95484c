//! In-memory stand-ins for the store and mailer traits, used by unit and
//! router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::analysis::store::AnalysisStore;
use crate::auth::store::IdentityStore;
use crate::config::tests::test_config;
use crate::errors::AppError;
use crate::mail::{MailError, Mailer, OutgoingMail};
use crate::models::analysis::ObjectId;
use crate::models::session::{SessionRecord, VerificationToken};
use crate::models::stats::StatsRow;
use crate::models::user::{Account, NewUser, User};
use crate::state::AppState;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    accounts: Vec<Account>,
    sessions: Vec<SessionRecord>,
    tokens: Vec<VerificationToken>,
    stats: Vec<StatsRow>,
}

/// Mirrors the Postgres constraints the flow relies on: unique email, unique
/// stats per user, delete-returning token consumption under one lock.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    tables: Mutex<Tables>,
    fail_stats: AtomicBool,
    fail_link_once: AtomicBool,
    hide_users_once: AtomicBool,
}

impl InMemoryIdentityStore {
    pub fn fail_stats_inserts(&self, fail: bool) {
        self.fail_stats.store(fail, Ordering::SeqCst);
    }

    /// The next `link_account` fails with a database error.
    pub fn fail_next_link(&self) {
        self.fail_link_once.store(true, Ordering::SeqCst);
    }

    /// The next `get_user_by_email` misses, simulating a concurrent insert.
    pub fn hide_existing_users_once(&self) {
        self.hide_users_once.store(true, Ordering::SeqCst);
    }

    pub fn stats_for(&self, user_id: Uuid) -> Vec<StatsRow> {
        let t = self.tables.lock().unwrap();
        t.stats.iter().filter(|s| s.user_id == user_id).cloned().collect()
    }

    pub fn accounts_for(&self, user_id: Uuid) -> Vec<Account> {
        let t = self.tables.lock().unwrap();
        t.accounts.iter().filter(|a| a.user_id == user_id).cloned().collect()
    }

    pub fn tokens(&self) -> Vec<VerificationToken> {
        self.tables.lock().unwrap().tokens.clone()
    }

    pub fn session_count(&self) -> usize {
        self.tables.lock().unwrap().sessions.len()
    }

    pub fn user_count(&self) -> usize {
        self.tables.lock().unwrap().users.len()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn create_verification_token(&self, token: &VerificationToken) -> Result<(), AppError> {
        self.tables.lock().unwrap().tokens.push(token.clone());
        Ok(())
    }

    async fn use_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
    ) -> Result<Option<VerificationToken>, AppError> {
        let mut t = self.tables.lock().unwrap();
        let pos = t
            .tokens
            .iter()
            .position(|v| v.identifier == identifier && v.token == token_hash);
        Ok(pos.map(|i| t.tokens.remove(i)))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        if self.hide_users_once.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        let t = self.tables.lock().unwrap();
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: &NewUser) -> Result<Option<User>, AppError> {
        let mut t = self.tables.lock().unwrap();
        if t.users.iter().any(|u| u.email == user.email) {
            return Ok(None);
        }
        let created = User {
            id: Uuid::new_v4(),
            name: user.name.clone(),
            email: user.email.clone(),
            email_verified: user.email_verified,
            image: user.image.clone(),
            created_at: Utc::now(),
        };
        t.users.push(created.clone());
        Ok(Some(created))
    }

    async fn mark_email_verified(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let mut t = self.tables.lock().unwrap();
        let user = t
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(AppError::Database(sqlx::Error::RowNotFound))?;
        user.email_verified = Some(at);
        Ok(user.clone())
    }

    async fn link_account(&self, account: &Account) -> Result<(), AppError> {
        if self.fail_link_once.swap(false, Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut t = self.tables.lock().unwrap();
        let exists = t.accounts.iter().any(|a| {
            a.provider == account.provider && a.provider_account_id == account.provider_account_id
        });
        if !exists {
            t.accounts.push(account.clone());
        }
        Ok(())
    }

    async fn create_stats(&self, stats: &StatsRow) -> Result<bool, AppError> {
        if self.fail_stats.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut t = self.tables.lock().unwrap();
        if t.stats.iter().any(|s| s.user_id == stats.user_id) {
            return Ok(false);
        }
        t.stats.push(stats.clone());
        Ok(true)
    }

    async fn create_missing_stats(&self) -> Result<u64, AppError> {
        let mut t = self.tables.lock().unwrap();
        let missing: Vec<Uuid> = t
            .users
            .iter()
            .filter(|u| !t.stats.iter().any(|s| s.user_id == u.id))
            .map(|u| u.id)
            .collect();
        for user_id in &missing {
            t.stats.push(StatsRow::initial(*user_id));
        }
        Ok(missing.len() as u64)
    }

    async fn create_session(&self, session: &SessionRecord) -> Result<(), AppError> {
        self.tables.lock().unwrap().sessions.push(session.clone());
        Ok(())
    }

    async fn get_session_and_user(
        &self,
        session_token: &str,
    ) -> Result<Option<(SessionRecord, User)>, AppError> {
        let t = self.tables.lock().unwrap();
        let Some(record) = t.sessions.iter().find(|s| s.session_token == session_token) else {
            return Ok(None);
        };
        Ok(t.users
            .iter()
            .find(|u| u.id == record.user_id)
            .map(|u| (record.clone(), u.clone())))
    }

    async fn update_session_expiry(
        &self,
        session_token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut t = self.tables.lock().unwrap();
        if let Some(s) = t.sessions.iter_mut().find(|s| s.session_token == session_token) {
            s.expires = expires;
        }
        Ok(())
    }

    async fn delete_session(&self, session_token: &str) -> Result<(), AppError> {
        self.tables
            .lock()
            .unwrap()
            .sessions
            .retain(|s| s.session_token != session_token);
        Ok(())
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut t = self.tables.lock().unwrap();
        let before = t.tokens.len();
        t.tokens.retain(|v| v.expires > now);
        Ok((before - t.tokens.len()) as u64)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut t = self.tables.lock().unwrap();
        let before = t.sessions.len();
        t.sessions.retain(|s| s.expires > now);
        Ok((before - t.sessions.len()) as u64)
    }
}

/// Captures outgoing mail instead of talking to a relay.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<OutgoingMail> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Timeout(0));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

/// Pulls `(email, token)` out of the verification link in a sent message.
pub fn link_from_mail(mail: &OutgoingMail) -> (String, String) {
    let start = mail.text.find("http").expect("mail contains a link");
    let link = mail.text[start..]
        .split_whitespace()
        .next()
        .expect("link is non-empty");
    let url = url::Url::parse(link).expect("link parses");
    let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
    (pairs["email"].clone(), pairs["token"].clone())
}

/// Analysis store backed by a map, counting every lookup.
#[derive(Default)]
pub struct CountingAnalysisStore {
    docs: Mutex<HashMap<String, Value>>,
    lookups: AtomicUsize,
    fail: AtomicBool,
}

impl CountingAnalysisStore {
    pub fn insert(&self, id: &str, doc: Value) {
        self.docs.lock().unwrap().insert(id.to_string(), doc);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn fail_lookups(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnalysisStore for CountingAnalysisStore {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Value>, AppError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.docs.lock().unwrap().get(id.as_str()).cloned())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub identity: Arc<InMemoryIdentityStore>,
    pub mailer: Arc<RecordingMailer>,
    pub analyses: Arc<CountingAnalysisStore>,
}

pub fn test_app() -> TestApp {
    let identity = Arc::new(InMemoryIdentityStore::default());
    let mailer = Arc::new(RecordingMailer::default());
    let analyses = Arc::new(CountingAnalysisStore::default());
    let state = AppState {
        config: test_config(),
        identity: identity.clone(),
        mailer: mailer.clone(),
        analyses: analyses.clone(),
    };
    TestApp {
        state,
        identity,
        mailer,
        analyses,
    }
}
