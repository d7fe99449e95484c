use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::auth::service::{complete_sign_in, request_sign_in, SignInContext};
use crate::auth::session::{
    clear_session_cookie, materialize_session, session_token_from_headers, set_session_cookie,
};
use crate::errors::AppError;
use crate::state::AppState;

pub const SIGN_IN_PAGE: &str = "/login";
pub const VERIFY_REQUEST_PAGE: &str = "/login/verify-request";
pub const ERROR_PAGE: &str = SIGN_IN_PAGE;

#[derive(Debug, Deserialize)]
pub struct SignInBody {
    pub email: String,
    #[serde(rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub token: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

fn sign_in_context(state: &AppState) -> SignInContext<'_> {
    SignInContext {
        store: state.identity.as_ref(),
        secret: &state.config.auth_secret,
        base_url: &state.config.app_url,
    }
}

/// POST /api/auth/signin/email
///
/// A body that is not JSON or has no `email` is answered like a bad address.
pub async fn handle_sign_in(
    State(state): State<AppState>,
    body: Result<Json<SignInBody>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = body.map_err(|rejection| {
        debug!(error = %rejection, "Rejected sign-in body");
        AppError::InvalidEmail(rejection.body_text())
    })?;
    let ctx = sign_in_context(&state);
    request_sign_in(
        &ctx,
        state.mailer.as_ref(),
        &body.email,
        body.callback_url.as_deref(),
        Utc::now(),
    )
    .await?;
    Ok(Json(json!({ "url": VERIFY_REQUEST_PAGE })))
}

/// GET /api/auth/callback/email
///
/// Bad or spent links land on the sign-in page with `error=Verification`
/// rather than a bare error body, since this URL is opened from an email.
pub async fn handle_email_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    let error_redirect = format!("{}{}?error=Verification", state.config.app_url, ERROR_PAGE);

    let (Some(email), Some(token)) = (params.email, params.token) else {
        warn!("Sign-in callback missing token or email");
        return Ok(Redirect::to(&error_redirect).into_response());
    };

    let ctx = sign_in_context(&state);
    match complete_sign_in(
        &ctx,
        &email,
        &token,
        params.callback_url.as_deref(),
        Utc::now(),
    )
    .await
    {
        Ok(signed_in) => {
            debug!(
                user_id = %signed_in.user.id,
                is_new_user = signed_in.is_new_user,
                "Issuing session cookie"
            );
            let cookie = set_session_cookie(
                &signed_in.session.session_token,
                signed_in.session.expires,
                state.config.uses_https(),
            )?;
            Ok((
                [(header::SET_COOKIE, cookie)],
                Redirect::to(&signed_in.callback_url),
            )
                .into_response())
        }
        Err(AppError::InvalidOrExpiredToken) => Ok(Redirect::to(&error_redirect).into_response()),
        Err(other) => Err(other),
    }
}

/// GET /api/auth/session
///
/// Returns `{}` when there is no live session. A refreshed session comes back
/// with a new cookie carrying the extended expiry.
pub async fn handle_get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let Some(token) = session_token_from_headers(&headers) else {
        return Ok(Json(json!({})).into_response());
    };
    let Some(active) = materialize_session(state.identity.as_ref(), &token, Utc::now()).await?
    else {
        return Ok(Json(json!({})).into_response());
    };

    let expires = active.session.expires;
    let body = Json(
        serde_json::to_value(active.session).map_err(|e| AppError::Internal(e.into()))?,
    );
    if !active.refreshed {
        return Ok(body.into_response());
    }
    let cookie = set_session_cookie(&token, expires, state.config.uses_https())?;
    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}

/// POST /api/auth/signout
pub async fn handle_sign_out(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(token) = session_token_from_headers(&headers) {
        state.identity.delete_session(&token).await?;
    }
    Ok((
        [(header::SET_COOKIE, clear_session_cookie(state.config.uses_https()))],
        Json(json!({ "url": state.config.app_url })),
    )
        .into_response())
}
