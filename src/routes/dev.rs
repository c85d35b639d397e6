//! Development-only sign in. Mounted only when `ENVIRONMENT=development`.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use time::Duration;

use super::{bad_request, error, internal, ApiError};
use crate::auth::{TokenService, SESSION_COOKIE};
use crate::models::User;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/auth/dev-login", post(dev_login))
}

#[derive(Debug, Deserialize)]
pub struct DevLoginPayload {
    #[serde(default)]
    email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevLoginResponse {
    success: bool,
    access_token: String,
    user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    id: String,
    email: String,
    name: String,
}

async fn dev_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<DevLoginPayload>,
) -> Result<(CookieJar, Json<DevLoginResponse>), ApiError> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(bad_request("Email is required"));
    }

    // Existing users only; accounts are provisioned by the identity provider
    let user = User::find_by_email(&state.pool, &email)
        .await
        .map_err(|e| internal("Authentication failed", e))?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "User not found"))?;

    let token = TokenService::create_session_token(
        user.id,
        &user.email,
        &state.jwt_secret,
        chrono::Duration::hours(TokenService::SESSION_HOURS),
    )
    .map_err(|e| internal("Failed to create session", e))?;

    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .secure(false)
        .same_site(SameSite::Lax)
        .max_age(Duration::hours(TokenService::SESSION_HOURS));

    tracing::warn!("Development login for {}", user.email);

    Ok((
        jar.add(cookie),
        Json(DevLoginResponse {
            success: true,
            access_token: token,
            user: UserResponse {
                id: user.id.to_string(),
                email: user.email,
                name: user.name,
            },
        }),
    ))
}
