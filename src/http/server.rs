//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the guarded API routes and `/health`
//! - Wire up the request pipeline (rate limit, sanitize, validate)
//! - Wire up cross-cutting layers (tracing, timeout, request ID, headers)
//! - Bind server to listener and drain on shutdown
//!
//! # Data Flow
//! ```text
//! request
//!     → request ID, trace, timeout, metrics, security headers
//!     → general rate limit (every /api route)
//!     → route rate limit (auth, search, csrf_token, upload, daily)
//!     → sanitize_body_middleware
//!     → validation_middleware (params, query, body)
//!     → file_upload_middleware (document uploads)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Route handlers are thin: they answer with the normalized input they
//!   were given, business logic lives behind this service
//! - Client addresses come from `ConnectInfo`, so the router must be served
//!   with `into_make_service_with_connect_info`

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put, MethodRouter},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{GuardConfig, RateLimitConfig, TimeoutConfig};
use crate::datastore::Connections;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, track_metrics};
use crate::sanitize::{sanitize_body_middleware, InputGuard};
use crate::security::headers::{security_headers_middleware, SecurityHeaders};
use crate::security::rate_limit::rate_limit_middleware;
use crate::security::{RateLimitState, RateLimiter};
use crate::validation::{
    file_upload_middleware, schemas, validate_request, validation_middleware, FileRules,
    RequestPart, RequestValidator, Validated,
};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub connections: Option<Arc<Connections>>,
    pub started_at: Instant,
}

/// Per-route guard settings shared by every route.
#[derive(Clone)]
struct Guards {
    limiter: Arc<RateLimiter>,
    rate_limit: Arc<ArcSwap<RateLimitConfig>>,
    input: InputGuard,
    uploads: Arc<FileRules>,
}

impl Guards {
    fn rate_limit(&self, policy: &str) -> RateLimitState {
        RateLimitState::new(self.limiter.clone(), self.rate_limit.clone(), policy)
    }

    /// Screen file descriptors once the body has been validated.
    fn with_upload_screening(&self, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
        route.layer(middleware::from_fn_with_state(
            self.uploads.clone(),
            file_upload_middleware,
        ))
    }

    fn validator(&self, schema: crate::validation::Schema, part: RequestPart) -> RequestValidator {
        validate_request(schema, part)
            .with_sanitizer(self.input.sanitizer)
            .with_body_limit(self.input.max_body_bytes)
    }

    /// Wrap `route` so requests pass the route policy, then sanitization,
    /// then each validator in order.
    fn guard(
        &self,
        route: MethodRouter<AppState>,
        policy: Option<&str>,
        validators: Vec<RequestValidator>,
    ) -> MethodRouter<AppState> {
        let mut route = route;
        for validator in validators.into_iter().rev() {
            route = route.layer(middleware::from_fn_with_state(validator, validation_middleware));
        }
        route = route.layer(middleware::from_fn_with_state(
            self.input,
            sanitize_body_middleware,
        ));
        match policy {
            Some(policy) => route.layer(middleware::from_fn_with_state(
                self.rate_limit(policy),
                rate_limit_middleware,
            )),
            None => route,
        }
    }
}

/// HTTP server for the guarded API.
pub struct HttpServer {
    router: Router,
    config: GuardConfig,
    rate_limit: Arc<ArcSwap<RateLimitConfig>>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(
        config: GuardConfig,
        limiter: Arc<RateLimiter>,
        connections: Option<Connections>,
    ) -> Self {
        let rate_limit = Arc::new(ArcSwap::from_pointee(config.rate_limit.clone()));
        let guards = Guards {
            limiter,
            rate_limit: rate_limit.clone(),
            input: InputGuard::from_config(&config.sanitize),
            uploads: Arc::new(FileRules::from_config(&config.upload)),
        };
        let state = AppState {
            connections: connections.map(Arc::new),
            started_at: Instant::now(),
        };

        let router = Self::build_router(&config, &guards, state);
        Self {
            router,
            config,
            rate_limit,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GuardConfig, guards: &Guards, state: AppState) -> Router {
        let api = Router::new()
            .route(
                "/auth/register",
                guards.guard(
                    post(accept_body),
                    Some("auth"),
                    vec![guards.validator(schemas::register(), RequestPart::Body)],
                ),
            )
            .route(
                "/auth/login",
                guards.guard(
                    post(accept_body),
                    Some("auth"),
                    vec![guards.validator(schemas::login(), RequestPart::Body)],
                ),
            )
            .route(
                "/auth/role",
                guards.guard(
                    put(accept_body),
                    None,
                    vec![guards.validator(schemas::update_role(), RequestPart::Body)],
                ),
            )
            .route(
                "/auth/csrf-token",
                guards.guard(get(csrf_token), Some("csrf_token"), vec![]),
            )
            .route(
                "/users/{id}",
                guards.guard(
                    get(accept_params),
                    None,
                    vec![guards.validator(schemas::user_params(), RequestPart::Params)],
                ),
            )
            .route(
                "/profile",
                guards.guard(
                    put(accept_body),
                    None,
                    vec![guards.validator(schemas::extended_profile(), RequestPart::Body)],
                ),
            )
            .route(
                "/investors",
                guards.guard(
                    post(accept_body),
                    None,
                    vec![guards.validator(schemas::investor_profile(), RequestPart::Body)],
                ),
            )
            .route(
                "/documents",
                guards.guard(
                    guards.with_upload_screening(post(accept_body)),
                    Some("upload"),
                    vec![guards.validator(schemas::document_upload(), RequestPart::Body)],
                ),
            )
            .route(
                "/documents/share",
                guards.guard(
                    post(accept_body),
                    Some("daily"),
                    vec![guards.validator(schemas::document_share(), RequestPart::Body)],
                ),
            )
            .route(
                "/startups",
                guards.guard(
                    post(accept_body),
                    None,
                    vec![guards.validator(schemas::startup_profile(), RequestPart::Body)],
                ),
            )
            .route(
                "/tasks",
                guards.guard(
                    post(accept_body),
                    None,
                    vec![guards.validator(schemas::task_create(), RequestPart::Body)],
                ),
            )
            .route(
                "/tasks/{id}",
                guards.guard(
                    put(accept_body),
                    None,
                    vec![
                        guards.validator(schemas::task_params(), RequestPart::Params),
                        guards.validator(schemas::task_update(), RequestPart::Body),
                    ],
                ),
            )
            .route(
                "/search",
                guards.guard(
                    get(accept_query),
                    Some("search"),
                    vec![guards.validator(schemas::search_query(), RequestPart::Query)],
                ),
            )
            .layer(middleware::from_fn_with_state(
                guards.rate_limit("general"),
                rate_limit_middleware,
            ));

        let headers = Arc::new(SecurityHeaders::from_config(&config.security));

        Router::new()
            .route("/health", get(health))
            .nest("/api", api)
            .with_state(state)
            .layer(middleware::from_fn_with_state(
                headers,
                security_headers_middleware,
            ))
            .layer(middleware::from_fn(track_metrics))
            .layer(request_timeout(&config.timeouts))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Handle to the live rate limit section, for config hot reload.
    pub fn rate_limit_config(&self) -> Arc<ArcSwap<RateLimitConfig>> {
        self.rate_limit.clone()
    }

    /// The assembled router, for driving the stack without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves, then drain in-flight requests.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }
}

/// Requests still running after the configured timeout get a 408.
fn request_timeout(timeouts: &TimeoutConfig) -> TimeoutLayer {
    TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(timeouts.request_secs),
    )
}

/// Liveness plus the datastore endpoints reached at startup.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime_secs = state.started_at.elapsed().as_secs();
    match &state.connections {
        Some(connections) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "uptimeSecs": uptime_secs,
                "datastores": {
                    "relational": connections.relational.endpoint,
                    "document": connections.document.endpoint,
                },
            })),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unavailable",
                "uptimeSecs": uptime_secs,
            })),
        ),
    }
}

async fn accept_body(Json(body): Json<Value>) -> impl IntoResponse {
    Json(json!({ "status": "accepted", "data": body }))
}

async fn accept_query(Extension(validated): Extension<Validated>) -> impl IntoResponse {
    Json(json!({ "status": "accepted", "data": validated.query }))
}

async fn accept_params(Extension(validated): Extension<Validated>) -> impl IntoResponse {
    Json(json!({ "status": "accepted", "data": validated.params }))
}

async fn csrf_token() -> impl IntoResponse {
    Json(json!({ "csrfToken": uuid::Uuid::new_v4().to_string() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitPolicy;
    use crate::datastore::{Connection, DatastoreKind};
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::Request;
    use std::time::SystemTime;
    use tower::ServiceExt;

    fn connection(kind: DatastoreKind, endpoint: &str) -> Connection {
        Connection {
            kind,
            endpoint: endpoint.to_string(),
            peer: None,
            established_at: SystemTime::now(),
        }
    }

    fn server(config: GuardConfig) -> HttpServer {
        HttpServer::new(
            config,
            Arc::new(RateLimiter::in_memory()),
            Some(Connections {
                relational: connection(DatastoreKind::Relational, "db:5432"),
                document: connection(DatastoreKind::Document, "mongo:27017"),
            }),
        )
    }

    fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .extension(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000))));
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_of(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_datastores() {
        let response = server(GuardConfig::default())
            .router()
            .oneshot(request("GET", "/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = json_of(response).await;
        assert_eq!(body["datastores"]["document"], "mongo:27017");
    }

    #[tokio::test]
    async fn test_health_without_connections() {
        let server = HttpServer::new(
            GuardConfig::default(),
            Arc::new(RateLimiter::in_memory()),
            None,
        );
        let response = server
            .router()
            .oneshot(request("GET", "/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_login_normalized_and_quota_headers_set() {
        let response = server(GuardConfig::default())
            .router()
            .oneshot(request(
                "POST",
                "/api/auth/login",
                Some(json!({ "email": "  Ada@Example.com ", "password": "pw", "extra": 1 })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "10");
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        let body = json_of(response).await;
        assert_eq!(
            body["data"],
            json!({ "email": "ada@example.com", "password": "pw" })
        );
    }

    #[tokio::test]
    async fn test_route_policy_throttles() {
        let mut config = GuardConfig::default();
        config
            .rate_limit
            .policies
            .insert("search".into(), RateLimitPolicy::new(60_000, 2, "Too many searches"));
        let router = server(config).router();

        for _ in 0..2 {
            let response = router
                .clone()
                .oneshot(request("GET", "/api/search?q=rust", None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = router
            .oneshot(request("GET", "/api/search?q=rust", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
        let body = json_of(response).await;
        assert_eq!(body["message"], "Too many searches");
    }

    #[tokio::test]
    async fn test_search_query_defaults() {
        let response = server(GuardConfig::default())
            .router()
            .oneshot(request("GET", "/api/search?q=rust&page=3", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_of(response).await;
        assert_eq!(body["data"], json!({ "q": "rust", "page": 3, "limit": 20 }));
    }

    #[tokio::test]
    async fn test_user_params_validated() {
        let router = server(GuardConfig::default()).router();
        let response = router
            .clone()
            .oneshot(request("GET", "/api/users/not-a-uuid", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router
            .oneshot(request(
                "GET",
                "/api/users/3f2b8c1e-9d4a-4b6f-8e2a-1c5d7f9a0b3e",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_collects_errors() {
        let response = server(GuardConfig::default())
            .router()
            .oneshot(request(
                "POST",
                "/api/auth/register",
                Some(json!({
                    "email": "ada@example.com",
                    "password": "short",
                    "role": "admin",
                    "fullName": "Ada Lovelace",
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_of(response).await;
        assert_eq!(body["message"], "Validation failed");
        let fields: Vec<_> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(fields, ["password", "role"]);
    }

    #[tokio::test]
    async fn test_disabled_limiter_sets_no_headers() {
        let mut config = GuardConfig::default();
        config.rate_limit.enabled = false;
        let response = server(config)
            .router()
            .oneshot(request("GET", "/api/auth/csrf-token", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }

    fn document(file: Value) -> Value {
        json!({ "documentType": "financial", "category": "financial", "file": file })
    }

    #[tokio::test]
    async fn test_document_upload_screened_under_upload_policy() {
        let router = server(GuardConfig::default()).router();

        let response = router
            .clone()
            .oneshot(request(
                "POST",
                "/api/documents",
                Some(document(json!({
                    "originalName": "q3-report.pdf",
                    "mimeType": "application/pdf",
                    "size": 4096,
                }))),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "20");
        let body = json_of(response).await;
        assert_eq!(body["data"]["isPublic"], false);

        let response = router
            .clone()
            .oneshot(request(
                "POST",
                "/api/documents",
                Some(document(json!({ "originalName": "payload.exe", "size": 10 }))),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_of(response).await["message"],
            "Suspicious file detected. Upload rejected for security reasons."
        );

        let response = router
            .oneshot(request(
                "POST",
                "/api/documents",
                Some(document(json!({
                    "originalName": "q3-report.pdf",
                    "mimeType": "image/png",
                    "size": 10,
                }))),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_of(response).await["message"],
            "File extension and MIME type mismatch. Potential security risk detected."
        );
    }

    #[tokio::test]
    async fn test_document_size_cap_from_config() {
        let mut config = GuardConfig::default();
        config.upload.max_file_bytes = 1024 * 1024;
        let response = server(config)
            .router()
            .oneshot(request(
                "POST",
                "/api/documents",
                Some(document(json!({
                    "originalName": "scan.png",
                    "mimeType": "image/png",
                    "size": 5 * 1024 * 1024,
                }))),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_of(response).await["message"],
            "File too large. Maximum size is 1MB"
        );
    }

    #[tokio::test]
    async fn test_document_share_uses_daily_policy() {
        let mut config = GuardConfig::default();
        config
            .rate_limit
            .policies
            .insert("daily".into(), RateLimitPolicy::new(86_400_000, 1, "Daily API limit exceeded."));
        let router = server(config).router();
        let share = json!({ "emailAddresses": ["partner@example.com"] });

        let response = router
            .clone()
            .oneshot(request("POST", "/api/documents/share", Some(share.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "1");

        let response = router
            .oneshot(request("POST", "/api/documents/share", Some(share)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_task_update_validates_params_and_body() {
        let router = server(GuardConfig::default()).router();
        let response = router
            .clone()
            .oneshot(request(
                "PUT",
                "/api/tasks/3f2b8c1e-9d4a-4b6f-8e2a-1c5d7f9a0b3e",
                Some(json!({ "completed": true, "priority": "high" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(request(
                "PUT",
                "/api/tasks/42",
                Some(json!({ "completed": true })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(response).await["errors"][0]["field"], "id");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_request_times_out_with_408() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "done"
                }),
            )
            .layer(request_timeout(&TimeoutConfig { request_secs: 1 }));

        let response = app
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
