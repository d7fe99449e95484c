//! Magic-link sign-in flow.
//!
//! 1. `request_sign_in`: normalise the address, persist a hashed 24h token,
//!    render and send the link.
//! 2. `complete_sign_in`: consume the token (committed before anything else
//!    happens), load or create the user, provision first-time users, open a
//!    session.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::provisioning::on_user_created;
use crate::auth::session::new_session_record;
use crate::auth::store::IdentityStore;
use crate::auth::tokens::{
    hash_token, issue_token, normalize_email, safe_callback_url, verification_url,
};
use crate::errors::AppError;
use crate::mail::compose::{compose_sign_in, SignInLink};
use crate::mail::{Mailer, OutgoingMail};
use crate::models::session::SessionRecord;
use crate::models::user::{Account, NewUser, User};

pub const EMAIL_PROVIDER: &str = "email";

pub struct SignInContext<'a> {
    pub store: &'a dyn IdentityStore,
    pub secret: &'a SecretString,
    pub base_url: &'a str,
}

/// Result of a successful link redemption.
#[derive(Debug)]
pub struct SignedIn {
    pub user: User,
    pub session: SessionRecord,
    pub is_new_user: bool,
    pub callback_url: String,
}

pub async fn request_sign_in(
    ctx: &SignInContext<'_>,
    mailer: &dyn Mailer,
    raw_email: &str,
    callback_url: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let email = normalize_email(raw_email)?;
    let callback_url = safe_callback_url(ctx.base_url, callback_url);

    let issued = issue_token(&email, ctx.secret, now);
    ctx.store.create_verification_token(&issued.record).await?;

    let url = verification_url(ctx.base_url, &issued.raw_token, &email, &callback_url)?;
    let composed = compose_sign_in(SignInLink { url: &url })?;

    mailer
        .send(&OutgoingMail {
            to: email.clone(),
            subject: composed.subject,
            text: composed.text,
            html: composed.html,
        })
        .await?;

    info!(expires = %issued.record.expires, "Sign-in link sent");
    Ok(())
}

pub async fn complete_sign_in(
    ctx: &SignInContext<'_>,
    raw_email: &str,
    raw_token: &str,
    callback_url: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SignedIn, AppError> {
    let email = normalize_email(raw_email).map_err(|_| AppError::InvalidOrExpiredToken)?;
    let token_hash = hash_token(raw_token, ctx.secret);

    let Some(token) = ctx.store.use_verification_token(&email, &token_hash).await? else {
        warn!("Sign-in link not found or already used");
        return Err(AppError::InvalidOrExpiredToken);
    };
    if token.expires <= now {
        warn!(expired_at = %token.expires, "Sign-in link expired");
        return Err(AppError::InvalidOrExpiredToken);
    }

    let (user, is_new_user) = resolve_user(ctx.store, &email, now).await?;

    let session = new_session_record(&user, now);
    ctx.store.create_session(&session).await?;

    info!(user_id = %user.id, is_new_user, "Sign-in completed");
    Ok(SignedIn {
        user,
        session,
        is_new_user,
        callback_url: safe_callback_url(ctx.base_url, callback_url),
    })
}

/// Loads the user for a verified address, creating it on first sign-in.
/// Provisioning runs only on the branch that actually inserted the row. The
/// `email` account is linked on every path so an earlier failed link is
/// repaired by the next sign-in.
async fn resolve_user(
    store: &dyn IdentityStore,
    email: &str,
    now: DateTime<Utc>,
) -> Result<(User, bool), AppError> {
    let (user, is_new_user) = match store.get_user_by_email(email).await? {
        Some(existing) => (store.mark_email_verified(existing.id, now).await?, false),
        None => {
            let new_user = NewUser {
                email: email.to_string(),
                name: None,
                image: None,
                email_verified: Some(now),
            };
            match store.create_user(&new_user).await? {
                Some(user) => {
                    on_user_created(store, &user).await;
                    (user, true)
                }
                None => {
                    // Lost a creation race with another first sign-in for this address.
                    let user = store.get_user_by_email(email).await?.ok_or_else(|| {
                        AppError::Internal(anyhow::anyhow!("user vanished after email conflict"))
                    })?;
                    (user, false)
                }
            }
        }
    };

    store
        .link_account(&Account {
            id: Uuid::new_v4(),
            user_id: user.id,
            account_type: EMAIL_PROVIDER.to_string(),
            provider: EMAIL_PROVIDER.to_string(),
            provider_account_id: email.to_string(),
        })
        .await?;
    Ok((user, is_new_user))
}
