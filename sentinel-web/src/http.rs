/**
 * API HTTP SENTINEL - Plan de contrôle local de l'agent de monitoring
 *
 * RÔLE :
 * Expose l'état de l'agent (status, historique, alertes, actions, config) et
 * accepte les commandes de remédiation (restart, kill, config, triage).
 *
 * FONCTIONNEMENT :
 * - Couche "edge" en tête : preflight CORS (OPTIONS toujours 204), slash final
 *   retiré avant le routage
 * - CorsLayer (tower-http) : Access-Control-Allow-Origin: * sur chaque réponse
 * - Routes GET en lecture seule, sans authentification
 * - Routes POST /api/action/{restart,kill,config,triage} derrière le middleware d'accès (token + sous-réseau)
 * - Corps POST : vide = {}, JSON invalide = 400 avant toute validation métier
 * - Route ou méthode inconnue = 404 {"error": "not found"}
 *
 * SÉCURITÉ :
 * - Header X-Sentinel-Token comparé en temps constant
 * - Refus loggés avec l'adresse du client, jamais le token
 */

use crate::access::{AccessPolicy, Decision, RequestContext, TOKEN_HEADER};
use crate::actions::{ActionDispatcher, ActionKind, ActionRequest};
use crate::config::{ConfigError, WebConfig};
use crate::credential::Credential;
use crate::error::{ActionError, ApiError};
use crate::store::{FsStore, MonitorStore};
use crate::{dashboard, resources};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::{header, HeaderName, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<WebConfig>,
    pub policy: Arc<AccessPolicy>,
    pub store: Arc<dyn MonitorStore>,
    pub dispatcher: Arc<ActionDispatcher>,
}

impl AppState {
    /// Wires the file store and dispatcher for `config`.
    pub fn new(config: WebConfig, credential: Credential) -> Result<Self, ConfigError> {
        let store: Arc<dyn MonitorStore> = Arc::new(FsStore::new(&config));
        let dispatcher = ActionDispatcher::new(&config, store.clone())?;
        Ok(Self {
            config: Arc::new(config),
            policy: Arc::new(AccessPolicy::new(credential)),
            store,
            dispatcher: Arc::new(dispatcher),
        })
    }
}

/// Full application: routes wrapped by CORS, then by the edge layer.
pub fn build_app(app_state: AppState) -> Router {
    Router::new()
        .fallback_service(build_router(app_state))
        .layer(build_cors_layer())
        .layer(middleware::from_fn(edge))
}

// Adds `Access-Control-Allow-Origin: *` to every response. OPTIONS never
// reaches it: `edge` answers those first with a 204.
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(TOKEN_HEADER)])
}

/// Route table only, without path normalization or CORS.
pub fn build_router(app_state: AppState) -> Router {
    let actions = Router::new()
        .route("/api/action/restart", post(restart))
        .route("/api/action/kill", post(kill))
        .route("/api/action/config", post(set_config))
        .route("/api/action/triage", post(triage))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), require_action_access));

    Router::new()
        .route("/", get(get_dashboard))
        .route("/api/status", get(get_status))
        .route("/api/history", get(get_history))
        .route("/api/alerts", get(get_alerts))
        .route("/api/actions", get(get_actions))
        .route("/api/config", get(get_config))
        .merge(actions)
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .with_state(app_state)
}

async fn edge(mut req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return preflight();
    }
    strip_trailing_slash(&mut req);

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let resp = next.run(req).await;
    debug!(
        %method,
        %path,
        status = resp.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );
    resp
}

fn preflight() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, X-Sentinel-Token"),
            (header::CONTENT_LENGTH, "0"),
        ],
    )
        .into_response()
}

// "/api/status//" -> "/api/status", "/" reste "/"
fn strip_trailing_slash(req: &mut Request) {
    let path = req.uri().path();
    let trimmed = match path.trim_end_matches('/') {
        "" => "/",
        p => p,
    };
    if trimmed == path {
        return;
    }

    let path_and_query = match req.uri().query() {
        Some(q) => format!("{trimmed}?{q}"),
        None => trimmed.to_string(),
    };
    let mut parts = req.uri().clone().into_parts();
    parts.path_and_query = path_and_query.parse().ok();
    if let Ok(uri) = Uri::from_parts(parts) {
        *req.uri_mut() = uri;
    }
}

async fn require_action_access(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let ctx = RequestContext::new(req.method().clone(), req.uri().path(), req.uri().query(), peer, req.headers());

    match app.policy.authorize(&ctx) {
        Decision::Allow => next.run(req).await,
        Decision::Deny(denial) => {
            warn!(peer = ?ctx.peer, path = %ctx.path, reason = denial.message(), "action request denied");
            ApiError::from(denial).into_response()
        }
    }
}

async fn not_found() -> ApiError {
    ApiError::not_found("not found")
}

// GET /
async fn get_dashboard(State(app): State<AppState>) -> Result<Html<String>, ApiError> {
    dashboard::render(&app.config, app.policy.credential()).map(Html)
}

// GET /api/status
async fn get_status(State(app): State<AppState>) -> Result<Json<Value>, ApiError> {
    resources::status(app.store.as_ref()).map(Json)
}

// GET /api/history?hours=N
async fn get_history(
    State(app): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let hours = resources::parse_hours(params.get("hours").map(String::as_str));
    resources::history(app.store.as_ref(), hours).map(Json)
}

// GET /api/alerts
async fn get_alerts(State(app): State<AppState>) -> Result<Json<Vec<Value>>, ApiError> {
    resources::alerts(app.store.as_ref()).map(Json)
}

// GET /api/actions
async fn get_actions(State(app): State<AppState>) -> Result<Json<Vec<Value>>, ApiError> {
    resources::actions(app.store.as_ref()).map(Json)
}

// GET /api/config
async fn get_config(State(app): State<AppState>) -> Result<Json<Value>, ApiError> {
    resources::config(app.store.as_ref()).map(Json)
}

async fn restart(State(app): State<AppState>, body: Bytes) -> Response {
    run_action(&app, ActionKind::Restart, &body).await
}

async fn kill(State(app): State<AppState>, body: Bytes) -> Response {
    run_action(&app, ActionKind::Kill, &body).await
}

async fn set_config(State(app): State<AppState>, body: Bytes) -> Response {
    run_action(&app, ActionKind::ConfigSet, &body).await
}

async fn triage(State(app): State<AppState>, body: Bytes) -> Response {
    run_action(&app, ActionKind::Triage, &body).await
}

/// Body parse, then field validation, then exactly one side effect.
async fn run_action(app: &AppState, kind: ActionKind, body: &[u8]) -> Response {
    let body = match parse_body(body) {
        Ok(value) => value,
        Err(e) => return e.into_response(),
    };
    let request = match ActionRequest::parse(kind, &body) {
        Ok(request) => request,
        Err(e) => {
            debug!(action = kind.as_str(), error = %e, "rejected action payload");
            return ActionError(e).into_response();
        }
    };

    match app.dispatcher.dispatch(request).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => ActionError(e).into_response(),
    }
}

/// Empty body counts as `{}`.
fn parse_body(raw: &[u8]) -> Result<Value, ApiError> {
    if raw.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(raw).map_err(|_| ApiError::validation("invalid JSON"))
}
