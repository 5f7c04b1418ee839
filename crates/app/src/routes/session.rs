use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::CookieJar;

use bone_gateway_storage::{UserRecord, ROLE_ADMIN};

use crate::problem::ApiError;
use crate::router::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Session token from the `session` cookie, falling back to a bearer token.
pub fn session_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

pub async fn current_user(
    state: &AppState,
    jar: &CookieJar,
    headers: &HeaderMap,
) -> Result<UserRecord, ApiError> {
    let token = session_token(jar, headers).ok_or(ApiError::Unauthorized)?;
    state
        .storage()
        .sessions()
        .find_user(&token)
        .await
        .map_err(ApiError::internal)?
        .ok_or(ApiError::Unauthorized)
}

pub async fn require_admin(
    state: &AppState,
    jar: &CookieJar,
    headers: &HeaderMap,
) -> Result<UserRecord, ApiError> {
    let user = current_user(state, jar, headers).await?;
    if user.role == ROLE_ADMIN {
        Ok(user)
    } else {
        Err(ApiError::Forbidden)
    }
}
