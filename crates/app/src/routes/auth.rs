use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tracing::info;

use bone_gateway_storage::UserRecord;

use super::session::{current_user, session_token, SESSION_COOKIE};
use crate::password::verify_password;
use crate::problem::ApiError;
use crate::router::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

/// Cross-site frontends only send the cookie back when it is `SameSite=None; Secure`.
fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let production = state.environment().is_production();
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(production)
        .same_site(if production {
            SameSite::None
        } else {
            SameSite::Lax
        })
        .build()
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<UserRecord>), ApiError> {
    let credentials = state
        .storage()
        .users()
        .find_credentials_by_email(request.email.trim())
        .await
        .map_err(ApiError::internal)?
        .ok_or(ApiError::Unauthorized)?;

    if !verify_password(
        &request.password,
        &credentials.password_salt,
        &credentials.password_hash,
    ) {
        return Err(ApiError::Unauthorized);
    }

    let token = state
        .storage()
        .sessions()
        .create(&credentials.user.id, state.now())
        .await
        .map_err(ApiError::internal)?;
    info!(stage = "auth", user_id = %credentials.user.id, "session opened");

    let jar = jar.add(session_cookie(&state, token));
    Ok((jar, Json(credentials.user)))
}

async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, StatusCode), ApiError> {
    if let Some(token) = session_token(&jar, &headers) {
        state
            .storage()
            .sessions()
            .revoke(&token)
            .await
            .map_err(ApiError::internal)?;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, StatusCode::NO_CONTENT))
}

async fn me(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<Json<UserRecord>, ApiError> {
    current_user(&state, &jar, &headers).await.map(Json)
}
