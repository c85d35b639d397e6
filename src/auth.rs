//! Request identity.
//!
//! Users sign in with the external identity provider, which hands out HS256
//! tokens signed with the shared `JWT_SECRET`. Browsers carry the token in
//! the session cookie, the mobile app in an `Authorization: Bearer` header.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    Extension, Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::User;
use crate::routes::{error, ApiError};
use crate::AppState;

pub const SESSION_COOKIE: &str = "teller_session";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String, // user_id
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

pub struct TokenService;

impl TokenService {
    pub const SESSION_HOURS: i64 = 12;

    pub fn create_session_token(
        user_id: Uuid,
        email: &str,
        secret: &str,
        ttl: Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    pub fn verify_session_token(token: &str, secret: &str) -> Option<SessionClaims> {
        decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .ok()
        .map(|data| data.claims)
    }
}

/// Admins are flagged on the user row or listed in `ADMIN_EMAILS`
pub fn is_admin(user: &User, admin_emails: &[String]) -> bool {
    user.is_admin || admin_emails.iter().any(|e| e.eq_ignore_ascii_case(&user.email))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn load_user(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = TokenService::verify_session_token(token, &state.jwt_secret)
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    let user_id: Uuid = claims
        .sub
        .parse()
        .map_err(|_| error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    User::find_by_id(&state.pool, user_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to find user: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        })?
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "User not found"))
}

/// Browser routes: session cookie, falling back to a bearer header
pub async fn web_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| bearer_token(req.headers()).map(str::to_string))
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    let user = load_user(&state, &token).await?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Mobile routes: bearer header only
pub async fn mobile_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .map(str::to_string)
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    let user = load_user(&state, &token).await?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Runs after `web_auth`; rejects signed-in users who are not admins
pub async fn require_admin(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !is_admin(&user, &state.admin_emails) {
        tracing::warn!("Admin route refused for {}", user.email);
        return Err(error(StatusCode::FORBIDDEN, "Admin access required"));
    }
    Ok(next.run(req).await)
}
