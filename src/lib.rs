use axum::{
    Router,
    extract::{FromRef, Request, State},
    http::{HeaderName, HeaderValue, StatusCode, Uri, header},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Access control core: token handling, route table, decision engine.
pub mod auth;
pub mod engine;
pub mod policy;

// Service plumbing.
pub mod config;
pub mod handlers;
pub mod models;
pub mod upstream;

pub mod routes;
use routes::{access, public};

// --- Public Re-exports ---

pub use auth::{Credential, CredentialReader, CredentialState};
pub use config::AppConfig;
pub use engine::{DASHBOARD_PATH, DecisionEngine, EngineState, LOGIN_PATH};
pub use policy::RouteTable;
pub use upstream::{HttpUpstream, MockUpstream, UpstreamState};

use models::{Decision, DenialReason};
use policy::normalize_path;

/// ApiDoc
///
/// OpenAPI document for the access API, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(handlers::health, handlers::check_access, handlers::get_navigation),
    components(
        schemas(
            models::AccessReport, models::NavigationResponse, models::Role,
            models::Decision, models::RouteClass, models::DenialReason,
        )
    ),
    tags(
        (name = "cms-gate", description = "Dashboard route access gate")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, immutable container shared by every request: configuration,
/// the credential reader, the decision engine and the upstream front-end.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub credentials: CredentialState,
    pub engine: EngineState,
    pub upstream: UpstreamState,
}

impl AppState {
    /// new
    ///
    /// Wires the gate from a loaded configuration and route table. The
    /// table is moved into the engine and never mutated again.
    pub fn new(config: AppConfig, routes: RouteTable, upstream: UpstreamState) -> Self {
        let credentials = Arc::new(CredentialReader::from_config(&config));
        let engine = Arc::new(DecisionEngine::new(routes, config.unclassified_routes));
        Self {
            config,
            credentials,
            engine,
            upstream,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for CredentialState {
    fn from_ref(app_state: &AppState) -> CredentialState {
        app_state.credentials.clone()
    }
}

impl FromRef<AppState> for EngineState {
    fn from_ref(app_state: &AppState) -> EngineState {
        app_state.engine.clone()
    }
}

impl FromRef<AppState> for UpstreamState {
    fn from_ref(app_state: &AppState) -> UpstreamState {
        app_state.upstream.clone()
    }
}

/// access_gate
///
/// The route access middleware. Reads the token cookie, asks the decision
/// engine, and either passes the request on or answers with a 307 redirect
/// to `/login` or `/dashboard`. Authorization failures are silent
/// redirects; the only error status is 400 for a path that cannot be
/// rebuilt after normalization.
///
/// Matching and forwarding both use the normalized path, so the page the
/// gate judged is the page the front-end serves.
///
/// A redirect to `/login` caused by an unusable cookie also expires that
/// cookie, otherwise the browser would bounce between the same pages.
async fn access_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = normalize_path(request.uri().path());
    match with_path(request.uri(), &path) {
        Some(uri) => *request.uri_mut() = uri,
        None => return StatusCode::BAD_REQUEST.into_response(),
    }
    if state.config.is_bypassed(&path) {
        return next.run(request).await;
    }

    let credential = state.credentials.read(request.headers());
    let verdict = state.engine.evaluate(&credential, &path);
    let role = credential.claims().and_then(|c| c.role());

    match verdict.decision {
        Decision::Continue => {
            tracing::debug!(%path, class = ?verdict.class, ?role, "access granted");
            next.run(request).await
        }
        Decision::RedirectToLogin => {
            tracing::info!(%path, reason = ?verdict.reason, "redirecting to login");
            let mut response = Redirect::temporary(LOGIN_PATH).into_response();
            if matches!(
                verdict.reason,
                Some(DenialReason::MalformedCredential | DenialReason::NoDashboardAccess)
            ) {
                let expired = format!(
                    "{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax",
                    state.credentials.cookie_name()
                );
                if let Ok(value) = HeaderValue::from_str(&expired) {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
            }
            response
        }
        Decision::RedirectToDashboard => {
            tracing::info!(%path, reason = ?verdict.reason, ?role, "redirecting to dashboard");
            Redirect::temporary(DASHBOARD_PATH).into_response()
        }
    }
}

/// The same URI with its path replaced, keeping the query.
fn with_path(uri: &Uri, path: &str) -> Option<Uri> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_owned(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().ok()?);
    Uri::from_parts(parts).ok()
}

/// create_router
///
/// Assembles the routing structure: the gate's own endpoints, then the
/// gated fallback that forwards every other page to the front-end.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Gated Pages: everything not routed explicitly.
    let gated_pages = Router::new()
        .fallback(handlers::forward_page)
        .layer(middleware::from_fn_with_state(state.clone(), access_gate));

    // 3. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(access::access_routes())
        .merge(gated_pages)
        .with_state(state);

    // 4. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span so every log line of a request carries the
/// same `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
