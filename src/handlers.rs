use crate::{
    AppState,
    auth::Credential,
    engine::EngineState,
    models::{AccessQuery, AccessReport, NavigationResponse},
    policy::normalize_path,
};
use axum::{
    Json,
    extract::{Query, Request, State},
    response::Response,
};

// --- Handlers ---

/// health
///
/// [Public Route] Liveness probe for load balancers. Never gated.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}

/// check_access
///
/// [Access API] Reports what the gate would decide if the caller opened
/// `path` with the cookie sent on this request. The front-end uses it to
/// pre-check links; it does not change any state.
#[utoipa::path(
    get,
    path = "/api/access/check",
    params(AccessQuery),
    responses((status = 200, description = "Access verdict", body = AccessReport))
)]
pub async fn check_access(
    credential: Credential,
    State(engine): State<EngineState>,
    Query(query): Query<AccessQuery>,
) -> Json<AccessReport> {
    // Only the path part takes part in matching.
    let raw = query.path.split(['?', '#']).next().unwrap_or_default();
    let path = normalize_path(raw);
    let verdict = engine.evaluate(&credential, &path);
    let claims = credential.claims();

    Json(AccessReport {
        path,
        classification: verdict.class,
        decision: verdict.decision,
        reason: verdict.reason,
        authenticated: claims.is_some(),
        role: claims.and_then(|c| c.role()),
        subject: claims.and_then(|c| c.sub.clone()),
        expires_at: claims.and_then(|c| c.expires_at()),
    })
}

/// get_navigation
///
/// [Access API] Lists the dashboard routes the caller's role may open.
/// Anonymous callers, broken cookies and unrecognized roles get an empty
/// list.
#[utoipa::path(
    get,
    path = "/api/access/navigation",
    responses((status = 200, description = "Reachable dashboard routes", body = NavigationResponse))
)]
pub async fn get_navigation(
    credential: Credential,
    State(engine): State<EngineState>,
) -> Json<NavigationResponse> {
    let role = credential.claims().and_then(|c| c.role());
    let routes = role
        .map(|role| engine.routes().navigation(role))
        .unwrap_or_default();

    Json(NavigationResponse { role, routes })
}

/// forward_page
///
/// [Gated Fallback] Every page request the access gate lets through is
/// served by the dashboard front-end.
pub async fn forward_page(State(state): State<AppState>, request: Request) -> Response {
    state.upstream.forward(request).await
}
