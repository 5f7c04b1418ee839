use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{DefaultBodyLimit, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;

use bone_gateway_storage::Database;
use bone_gateway_util::Environment;

use crate::origin::{self, OriginGate};
use crate::routes;

/// Ceiling for URL-encoded and JSON request bodies.
pub const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

pub const LIVENESS_MESSAGE: &str = "Backend is working now!";

#[derive(Clone)]
pub struct AppState {
    storage: Database,
    gate: OriginGate,
    environment: Environment,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl AppState {
    pub fn new(storage: Database, gate: OriginGate, environment: Environment) -> Self {
        Self {
            storage,
            gate,
            environment,
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn gate(&self) -> &OriginGate {
        &self.gate
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

/// The three delegated route groups. Tests substitute their own routers.
pub struct RouteGroups {
    pub users: Router<AppState>,
    pub products: Router<AppState>,
    pub auth: Router<AppState>,
}

impl RouteGroups {
    pub fn standard() -> Self {
        Self {
            users: routes::users::router(),
            products: routes::products::router(),
            auth: routes::auth::router(),
        }
    }
}

/// Builds the HTTP surface. Layers run outermost first: unsized body buffering,
/// declared length ceiling, origin gate, CORS headers, then routing.
pub fn compose(state: AppState, groups: RouteGroups) -> Router {
    let gate = state.gate().clone();

    Router::new()
        .route("/", get(liveness))
        .nest("/api/users", groups.users)
        .nest("/api/products", groups.products)
        .nest("/api/auth", groups.auth)
        .layer(gate.cors_layer())
        .layer(middleware::from_fn_with_state(gate, origin::enforce))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(middleware::from_fn(buffer_unsized_body))
        .with_state(state)
}

/// Reads a body that arrives without `Content-Length` up to the ceiling.
/// The length limit layers only fire when something consumes the body, so a
/// handler that ignores its body would otherwise run for any upload size.
async fn buffer_unsized_body(request: Request, next: Next) -> Response {
    if request.headers().contains_key(header::CONTENT_LENGTH) {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    match to_bytes(body, BODY_LIMIT_BYTES).await {
        Ok(bytes) => next.run(Request::from_parts(parts, Body::from(bytes))).await,
        Err(_) => StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    }
}

#[derive(Debug, Serialize)]
struct Liveness {
    message: &'static str,
    environment: &'static str,
    timestamp: String,
}

async fn liveness(State(state): State<AppState>) -> Json<Liveness> {
    Json(Liveness {
        message: LIVENESS_MESSAGE,
        environment: state.environment().as_str(),
        timestamp: state.now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::http::{Method, Request};
    use bone_gateway_core::{AllowList, OriginPolicy};
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    pub(crate) const FRONTEND: &str = "https://shop.example.com";

    pub(crate) async fn setup_state(environment: Environment) -> AppState {
        let database = Database::connect("sqlite::memory:?cache=shared")
            .await
            .expect("connect");
        database.run_migrations().await.expect("migrations");

        let policy = OriginPolicy::new(
            environment,
            AllowList::from_urls(FRONTEND, None),
            "http://192.168.18.118",
        );
        AppState::new(database, OriginGate::new(Arc::new(policy)), environment)
    }

    fn counting_groups(hits: Arc<AtomicUsize>) -> RouteGroups {
        let counter = move || {
            let get_hits = hits.clone();
            let post_hits = hits.clone();
            Router::new().route(
                "/",
                get(move || async move {
                    get_hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::OK
                })
                .post(move |_body: axum::body::Bytes| async move {
                    post_hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::CREATED
                }),
            )
        };
        RouteGroups {
            users: counter(),
            products: counter(),
            auth: counter(),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let collected = response.into_body().collect().await.expect("body should read");
        serde_json::from_slice(&collected.to_bytes()).expect("json body")
    }

    #[tokio::test]
    async fn liveness_reports_environment_and_timestamp() {
        let fixed: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().expect("timestamp");
        let state = setup_state(Environment::Production)
            .await
            .with_clock(Arc::new(move || fixed));
        let app = compose(state, RouteGroups::standard());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], LIVENESS_MESSAGE);
        assert_eq!(body["environment"], "production");
        let timestamp = body["timestamp"].as_str().expect("timestamp string");
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert_eq!(timestamp, "2024-05-01T12:00:00.000Z");
    }

    #[tokio::test]
    async fn route_groups_are_mounted_under_api_prefixes() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = compose(
            setup_state(Environment::Production).await,
            counting_groups(hits.clone()),
        );

        for uri in ["/api/users", "/api/products", "/api/auth"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .expect("handler should respond");
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn denied_origin_is_forbidden_outright_rather_than_only_missing_cors_headers() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = compose(
            setup_state(Environment::Production).await,
            counting_groups(hits.clone()),
        );

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/users")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
        let body = response.into_body().collect().await.expect("body").to_bytes();
        assert!(body.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn allowed_origin_receives_credentialed_cors_headers() {
        let app = compose(
            setup_state(Environment::Production).await,
            RouteGroups::standard(),
        );

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::ORIGIN, FRONTEND)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some(FRONTEND)
        );
        assert_eq!(
            headers
                .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
                .and_then(|v| v.to_str().ok()),
            Some("true")
        );
    }

    #[tokio::test]
    async fn preflight_lists_allowed_methods_and_headers() {
        let app = compose(
            setup_state(Environment::Development).await,
            RouteGroups::standard(),
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/products")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert!(response.status().is_success());
        let headers = response.headers();
        let methods = headers
            .get(header::ACCESS_CONTROL_ALLOW_METHODS)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        for method in ["GET", "POST", "PUT", "DELETE", "OPTIONS"] {
            assert!(methods.contains(method), "{methods}");
        }
        let allowed_headers = headers
            .get(header::ACCESS_CONTROL_ALLOW_HEADERS)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        for name in ["content-type", "authorization", "accept"] {
            assert!(allowed_headers.contains(name), "{allowed_headers}");
        }
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_before_dispatch() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = compose(
            setup_state(Environment::Production).await,
            counting_groups(hits.clone()),
        );

        let oversized = vec![b'x'; BODY_LIMIT_BYTES + 1];
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/products")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::CONTENT_LENGTH, oversized.len())
                    .body(Body::from(oversized))
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/products")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("name=bone"))
                    .unwrap(),
            )
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn streamed_oversized_body_never_reaches_a_handler_that_ignores_it() {
        let hits = Arc::new(AtomicUsize::new(0));
        let handler_hits = hits.clone();
        let users = Router::new().route(
            "/",
            axum::routing::post(move || async move {
                handler_hits.fetch_add(1, Ordering::SeqCst);
                StatusCode::NO_CONTENT
            }),
        );
        let app = compose(
            setup_state(Environment::Production).await,
            RouteGroups {
                users,
                products: Router::new(),
                auth: Router::new(),
            },
        );

        let chunk = vec![b'x'; 1024 * 1024];
        let chunks = (0..11).map(move |_| Ok::<_, std::io::Error>(chunk.clone()));
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/users")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from_stream(tokio_stream::iter(chunks)))
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(hits.load(Ordering::SeqCst), 0, "handler ran for an 11 MiB body");

        let small = (0..2).map(|_| Ok::<_, std::io::Error>(b"{}".to_vec()));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/users")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from_stream(tokio_stream::iter(small)))
                    .unwrap(),
            )
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
