use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;

use bone_gateway_storage::UserRecord;

use super::session::require_admin;
use crate::problem::ApiError;
use crate::router::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/:id", get(fetch))
}

async fn list(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<Json<Vec<UserRecord>>, ApiError> {
    require_admin(&state, &jar, &headers).await?;
    let users = state.storage().users().list().await.map_err(ApiError::internal)?;
    Ok(Json(users))
}

async fn fetch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<Json<UserRecord>, ApiError> {
    require_admin(&state, &jar, &headers).await?;
    state
        .storage()
        .users()
        .find_by_id(&id)
        .await
        .map_err(ApiError::internal)?
        .map(Json)
        .ok_or(ApiError::NotFound("user"))
}
