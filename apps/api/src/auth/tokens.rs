//! Magic-link token issuance: random tokens, their stored hash, and the
//! verification URL that carries them.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use url::Url;

use crate::errors::AppError;
use crate::mail::compose::LINK_VALID_HOURS;
use crate::models::session::VerificationToken;

pub const CALLBACK_PATH: &str = "/api/auth/callback/email";
const TOKEN_BYTES: usize = 32;

/// A freshly minted link. `raw_token` only ever leaves the process inside the
/// email; the store sees `record.token`, the hash.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub raw_token: String,
    pub record: VerificationToken,
}

/// 32 random bytes, hex-encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `sha256(token || secret)`, hex-encoded.
pub fn hash_token(raw_token: &str, secret: &SecretString) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    hasher.update(secret.expose_secret().as_bytes());
    hex::encode(hasher.finalize())
}

pub fn token_validity() -> Duration {
    Duration::hours(LINK_VALID_HOURS)
}

pub fn issue_token(identifier: &str, secret: &SecretString, now: DateTime<Utc>) -> IssuedToken {
    let raw_token = generate_token();
    let record = VerificationToken {
        identifier: identifier.to_string(),
        token: hash_token(&raw_token, secret),
        expires: now + token_validity(),
    };
    IssuedToken { raw_token, record }
}

/// Trims and lower-cases, then validates as a mailbox address.
pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    email
        .parse::<lettre::Address>()
        .map_err(|_| AppError::InvalidEmail(raw.to_string()))?;
    Ok(email)
}

/// Returns `candidate` if it is a relative path or shares the base URL's
/// origin; otherwise the base URL. Protocol-relative paths (`//host`) are
/// treated as foreign.
pub fn safe_callback_url(base_url: &str, candidate: Option<&str>) -> String {
    let Some(candidate) = candidate.map(str::trim).filter(|c| !c.is_empty()) else {
        return base_url.to_string();
    };

    if candidate.starts_with('/') && !candidate.starts_with("//") {
        return format!("{base_url}{candidate}");
    }

    match (Url::parse(base_url), Url::parse(candidate)) {
        (Ok(base), Ok(target)) if base.origin() == target.origin() => target.to_string(),
        _ => base_url.to_string(),
    }
}

/// Appends the callback route to the base URL as written, so a path prefix in
/// `APP_URL` is kept, as it is for relative callback URLs.
pub fn verification_url(
    base_url: &str,
    raw_token: &str,
    email: &str,
    callback_url: &str,
) -> Result<String, AppError> {
    let mut url = Url::parse(&format!("{base_url}{CALLBACK_PATH}"))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid APP_URL: {e}")))?;
    url.query_pairs_mut()
        .append_pair("callbackUrl", callback_url)
        .append_pair("token", raw_token)
        .append_pair("email", email);
    Ok(url.to_string())
}
