use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;

use bone_gateway_storage::{NewProduct, ProductError, ProductRecord, ProductUpdate};

use super::session::require_admin;
use crate::problem::ApiError;
use crate::router::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(fetch).put(update).delete(remove))
}

fn map_error(err: ProductError) -> ApiError {
    match err {
        ProductError::NotFound => ApiError::NotFound("product"),
        other => ApiError::internal(other),
    }
}

fn validate(name: Option<&str>, price_cents: Option<i64>) -> Result<(), ApiError> {
    if name.is_some_and(|name| name.trim().is_empty()) {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    if price_cents.is_some_and(|price| price < 0) {
        return Err(ApiError::BadRequest("price_cents must not be negative".to_string()));
    }
    Ok(())
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<ProductRecord>>, ApiError> {
    let products = state.storage().products().list().await.map_err(map_error)?;
    Ok(Json(products))
}

async fn fetch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductRecord>, ApiError> {
    let product = state.storage().products().find(&id).await.map_err(map_error)?;
    Ok(Json(product))
}

async fn create(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(product): Json<NewProduct>,
) -> Result<(StatusCode, Json<ProductRecord>), ApiError> {
    require_admin(&state, &jar, &headers).await?;
    validate(Some(&product.name), Some(product.price_cents))?;
    let created = state
        .storage()
        .products()
        .create(product, state.now())
        .await
        .map_err(map_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(changes): Json<ProductUpdate>,
) -> Result<Json<ProductRecord>, ApiError> {
    require_admin(&state, &jar, &headers).await?;
    validate(changes.name.as_deref(), changes.price_cents)?;
    let updated = state
        .storage()
        .products()
        .update(&id, changes, state.now())
        .await
        .map_err(map_error)?;
    Ok(Json(updated))
}

async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    require_admin(&state, &jar, &headers).await?;
    state
        .storage()
        .products()
        .delete(&id)
        .await
        .map_err(map_error)?;
    Ok(StatusCode::NO_CONTENT)
}
