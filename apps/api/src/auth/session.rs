//! Database-backed sessions and the enricher that stamps the stored user id
//! onto every session handed to clients.

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::auth::store::IdentityStore;
use crate::auth::tokens::generate_token;
use crate::errors::AppError;
use crate::models::session::{Session, SessionRecord, SessionUser};
use crate::models::user::User;

pub const SESSION_COOKIE: &str = "tailor.session-token";
/// Sessions live 30 days from their last refresh.
pub const SESSION_MAX_AGE_DAYS: i64 = 30;
/// A session is refreshed at most once per day of activity.
pub const SESSION_UPDATE_AGE_HOURS: i64 = 24;

/// Copies the stored user's id into the session. Passthrough when either the
/// session has no user block or no stored user resolved.
pub fn enrich_session(mut session: Session, user: Option<&User>) -> Session {
    if let (Some(session_user), Some(user)) = (session.user.as_mut(), user) {
        session_user.id = Some(user.id.to_string());
    }
    session
}

pub fn new_session_record(user: &User, now: DateTime<Utc>) -> SessionRecord {
    SessionRecord {
        session_token: generate_token(),
        user_id: user.id,
        expires: now + Duration::days(SESSION_MAX_AGE_DAYS),
    }
}

/// A live session as handed to the client. `refreshed` is set when the
/// expiry moved, so the cookie has to be re-issued.
#[derive(Debug)]
pub struct ActiveSession {
    pub session: Session,
    pub refreshed: bool,
}

/// Loads the session behind `session_token`, dropping it if expired and
/// extending it if it is due for a refresh.
pub async fn materialize_session(
    store: &dyn IdentityStore,
    session_token: &str,
    now: DateTime<Utc>,
) -> Result<Option<ActiveSession>, AppError> {
    let Some((record, user)) = store.get_session_and_user(session_token).await? else {
        return Ok(None);
    };

    if record.expires <= now {
        debug!(user_id = %user.id, "Session expired; deleting");
        store.delete_session(&record.session_token).await?;
        return Ok(None);
    }

    let max_age = Duration::days(SESSION_MAX_AGE_DAYS);
    let mut expires = record.expires;
    let refreshed = expires - max_age + Duration::hours(SESSION_UPDATE_AGE_HOURS) <= now;
    if refreshed {
        expires = now + max_age;
        store
            .update_session_expiry(&record.session_token, expires)
            .await?;
    }

    let session = Session {
        user: Some(SessionUser {
            id: None,
            name: user.name.clone(),
            email: Some(user.email.clone()),
            image: user.image.clone(),
        }),
        expires,
    };
    Ok(Some(ActiveSession {
        session: enrich_session(session, Some(&user)),
        refreshed,
    }))
}

pub fn session_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

pub fn set_session_cookie(
    token: &str,
    expires: DateTime<Utc>,
    secure: bool,
) -> Result<HeaderValue, AppError> {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Expires={}",
        SESSION_COOKIE,
        token,
        expires.format("%a, %d %b %Y %H:%M:%S GMT")
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid session cookie: {e}")))
}

pub fn clear_session_cookie(secure: bool) -> HeaderValue {
    let secure = if secure { "; Secure" } else { "" };
    let cookie = format!(
        "{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT{secure}"
    );
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}
