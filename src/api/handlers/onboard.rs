//! `GET`/`POST` on `/onboard/{token}` and `/settings/{token}`.
//!
//! `GET` verifies the token and inspects its record without consuming it.
//! `POST` verifies the token, validates the submitted settings, then redeems
//! in one step. Each failure maps to exactly one status code:
//!
//! | outcome                                               | status |
//! |-------------------------------------------------------|--------|
//! | malformed, bad signature, wrong scope, unknown token  | 401    |
//! | missing or invalid settings (`POST`, valid token)     | 400    |
//! | token or record expired                               | 410    |
//! | already consumed                                      | 409    |
//! | storage failure                                       | 500    |

use crate::api::state::OnboardState;
use crate::api::types::{ErrorResponse, OnboardResponse};
use crate::redemption::{scope_path, PracticeSettings, RedemptionError, RedemptionSnapshot};
use crate::token::{Scope, TokenError};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

const MAX_FIELD_LEN: usize = 256;

#[derive(Debug)]
pub(crate) enum LinkError {
    Token(TokenError),
    Redemption(RedemptionError),
}

impl From<TokenError> for LinkError {
    fn from(err: TokenError) -> Self {
        Self::Token(err)
    }
}

impl From<RedemptionError> for LinkError {
    fn from(err: RedemptionError) -> Self {
        Self::Redemption(err)
    }
}

/// Status code and stable error code for a rejected link.
pub(crate) fn status_for(err: &LinkError) -> (StatusCode, &'static str) {
    match err {
        LinkError::Token(
            TokenError::MalformedToken | TokenError::InvalidSignature | TokenError::ScopeMismatch,
        )
        | LinkError::Redemption(RedemptionError::NotFound) => {
            (StatusCode::UNAUTHORIZED, "invalid_token")
        }
        LinkError::Token(TokenError::ExpiredToken)
        | LinkError::Redemption(RedemptionError::Expired) => (StatusCode::GONE, "expired"),
        LinkError::Redemption(RedemptionError::AlreadyConsumed) => {
            (StatusCode::CONFLICT, "already_used")
        }
        LinkError::Redemption(RedemptionError::DuplicateId | RedemptionError::Storage(_)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "server_error")
        }
    }
}

fn error_response(err: &LinkError) -> Response {
    let (status, code) = status_for(err);
    match err {
        LinkError::Redemption(RedemptionError::Storage(source)) => {
            error!("Onboarding link storage failure: {source:#}");
        }
        _ => debug!(?err, status = status.as_u16(), "onboarding link rejected"),
    }
    (status, Json(ErrorResponse::new(code))).into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
}

fn redirect_url(base: &Url, path: &str) -> String {
    let base = base.as_str().trim_end_matches('/');
    format!("{base}/{path}")
}

async fn inspect(
    state: &OnboardState,
    scope: Scope,
    token: &str,
) -> Result<RedemptionSnapshot, LinkError> {
    let claims = state.verifier().verify(token, scope)?;
    Ok(state
        .store()
        .inspect(claims.token_id(), claims.subject_id())
        .await?)
}

async fn check(state: &OnboardState, scope: Scope, token: &str) -> Response {
    match inspect(state, scope, token).await {
        Ok(snapshot) => {
            // Fragment keeps the token out of frontend access logs.
            let redirect = redirect_url(
                state.frontend_base_url(),
                &format!("{}/form#token={token}", scope_path(scope)),
            );
            let body = OnboardResponse {
                success: true,
                subject: snapshot.subject_id.clone(),
                snapshot,
                redirect_url: redirect,
                settings_saved: None,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => error_response(&err),
    }
}

async fn redeem(
    state: &OnboardState,
    scope: Scope,
    token: &str,
    payload: Option<Json<PracticeSettings>>,
) -> Response {
    let claims = match state.verifier().verify(token, scope) {
        Ok(claims) => claims,
        Err(err) => return error_response(&err.into()),
    };

    // Form is checked before the store so a typo never burns the link.
    let settings = match payload {
        Some(Json(settings)) => settings,
        None => return bad_request("missing_payload"),
    };
    if let Err(message) = validate_settings(&settings) {
        return bad_request(message);
    }

    let snapshot = match state
        .store()
        .redeem(claims.token_id(), claims.subject_id())
        .await
    {
        Ok(snapshot) => snapshot,
        Err(err) => {
            if matches!(err, RedemptionError::AlreadyConsumed) {
                warn!(token_id = %claims.token_id(), "replay of consumed onboarding link");
            }
            return error_response(&err.into());
        }
    };

    info!(token_id = %claims.token_id(), subject_id = %claims.sub, "onboarding link redeemed");

    let settings_saved = match state.sink().apply(&snapshot.subject_id, &settings) {
        Ok(()) => true,
        Err(err) => {
            // The token is already spent; report the save failure in the body.
            error!("Failed to hand off settings for {}: {err:#}", snapshot.subject_id);
            false
        }
    };

    let body = OnboardResponse {
        success: true,
        subject: snapshot.subject_id.clone(),
        snapshot,
        redirect_url: redirect_url(
            state.frontend_base_url(),
            &format!("{}/complete", scope_path(scope)),
        ),
        settings_saved: Some(settings_saved),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Field checks for a settings submission.
pub(crate) fn validate_settings(settings: &PracticeSettings) -> Result<(), &'static str> {
    let fields = [
        &settings.practice_name,
        &settings.contact_email,
        &settings.phone,
        &settings.address,
        &settings.website,
        &settings.timezone,
    ];

    if fields.iter().all(|field| field.is_none()) {
        return Err("empty_settings");
    }
    if fields
        .iter()
        .filter_map(|field| field.as_deref())
        .any(|value| value.trim().is_empty() || value.len() > MAX_FIELD_LEN)
    {
        return Err("invalid_field_length");
    }
    if let Some(email) = settings.contact_email.as_deref() {
        if !valid_email(email.trim()) {
            return Err("invalid_email");
        }
    }
    if let Some(website) = settings.website.as_deref() {
        let valid = Url::parse(website.trim())
            .is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some());
        if !valid {
            return Err("invalid_website");
        }
    }
    Ok(())
}

fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

#[utoipa::path(
    get,
    path = "/onboard/{token}",
    params(("token" = String, Path, description = "Onboarding link token")),
    responses(
        (status = 200, description = "Link is valid and unused", body = OnboardResponse),
        (status = 401, description = "Malformed, tampered, wrong-scope or unknown token", body = ErrorResponse),
        (status = 409, description = "Link already used", body = ErrorResponse),
        (status = 410, description = "Link expired", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    tag = "onboard"
)]
pub async fn check_onboarding(
    Path(token): Path<String>,
    state: Extension<Arc<OnboardState>>,
) -> impl IntoResponse {
    check(&state, Scope::Onboarding, &token).await
}

#[utoipa::path(
    post,
    path = "/onboard/{token}",
    params(("token" = String, Path, description = "Onboarding link token")),
    request_body = PracticeSettings,
    responses(
        (status = 200, description = "Link redeemed, settings handed off", body = OnboardResponse),
        (status = 400, description = "Missing or invalid settings payload", body = ErrorResponse),
        (status = 401, description = "Malformed, tampered, wrong-scope or unknown token", body = ErrorResponse),
        (status = 409, description = "Link already used", body = ErrorResponse),
        (status = 410, description = "Link expired", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    tag = "onboard"
)]
pub async fn redeem_onboarding(
    Path(token): Path<String>,
    state: Extension<Arc<OnboardState>>,
    payload: Option<Json<PracticeSettings>>,
) -> impl IntoResponse {
    redeem(&state, Scope::Onboarding, &token, payload).await
}

#[utoipa::path(
    get,
    path = "/settings/{token}",
    params(("token" = String, Path, description = "Settings update link token")),
    responses(
        (status = 200, description = "Link is valid and unused", body = OnboardResponse),
        (status = 401, description = "Malformed, tampered, wrong-scope or unknown token", body = ErrorResponse),
        (status = 409, description = "Link already used", body = ErrorResponse),
        (status = 410, description = "Link expired", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    tag = "onboard"
)]
pub async fn check_settings(
    Path(token): Path<String>,
    state: Extension<Arc<OnboardState>>,
) -> impl IntoResponse {
    check(&state, Scope::SettingsUpdate, &token).await
}

#[utoipa::path(
    post,
    path = "/settings/{token}",
    params(("token" = String, Path, description = "Settings update link token")),
    request_body = PracticeSettings,
    responses(
        (status = 200, description = "Link redeemed, settings handed off", body = OnboardResponse),
        (status = 400, description = "Missing or invalid settings payload", body = ErrorResponse),
        (status = 401, description = "Malformed, tampered, wrong-scope or unknown token", body = ErrorResponse),
        (status = 409, description = "Link already used", body = ErrorResponse),
        (status = 410, description = "Link expired", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    tag = "onboard"
)]
pub async fn redeem_settings(
    Path(token): Path<String>,
    state: Extension<Arc<OnboardState>>,
    payload: Option<Json<PracticeSettings>>,
) -> impl IntoResponse {
    redeem(&state, Scope::SettingsUpdate, &token, payload).await
}
