//!
//! WorkLocus gateway server
//! ------------------------
//! Axum HTTP server that runs the authorization gate in front of page
//! delivery.
//!
//! Responsibilities:
//! - Per-request id (`x-request-id`) and a tracing span for every request.
//! - The gate middleware on the entry route and the protected prefixes.
//! - Reverse proxy to the upstream page renderer when one is configured;
//!   otherwise a minimal built-in page listing the caller's menu.
//! - `/healthz` for liveness probes, outside the gate.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use reqwest::Url;
use tracing::{error, info, Instrument};

use crate::client::{BackendApi, ReqwestTransport, Transport};
use crate::config::{GateConfig, ServerConfig};
use crate::gate::{self, AuthorizationGate};
use crate::identity::{menu_for_role, CallerIdentity, RoutePermissionTable, ADMIN_MENU};

/// Largest request body forwarded to the upstream renderer.
const MAX_PROXY_BODY: usize = 8 * 1024 * 1024;

const HOP_BY_HOP: &[&str] = &["connection", "keep-alive", "transfer-encoding", "upgrade", "te", "trailer", "host", "content-length"];

/// Shared state for page handlers.
#[derive(Clone)]
pub struct AppState {
    /// Upstream page renderer. `None` serves the built-in page.
    pub upstream: Option<Url>,
    pub http: reqwest::Client,
    pub permissions: Arc<RoutePermissionTable>,
}

impl AppState {
    pub fn new(upstream: Option<Url>, permissions: RoutePermissionTable) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("building upstream HTTP client")?;
        Ok(Self { upstream, http, permissions: Arc::new(permissions) })
    }
}

pub async fn request_id(req: Request, next: Next) -> Response {
    let id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("request", id = %id, method = %req.method(), path = %req.uri().path());
    let mut resp = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        resp.headers_mut().insert("x-request-id", value);
    }
    resp
}

/// Full application router. The gate decides itself which paths it guards,
/// so `/healthz` passes straight through.
pub fn router<T: Transport>(authz: Arc<AuthorizationGate<T>>, state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .fallback(page)
        .with_state(state)
        .layer(middleware::from_fn_with_state(authz, gate::authorize::<T>))
        .layer(middleware::from_fn(request_id))
}

async fn page(State(state): State<AppState>, req: Request) -> Response {
    match state.upstream.clone() {
        Some(base) => proxy(&state, &base, req).await,
        None => builtin_page(&state, &req),
    }
}

fn builtin_page(state: &AppState, req: &Request) -> Response {
    let path = req.uri().path();
    let Some(who) = req.extensions().get::<CallerIdentity>() else {
        return Html(format!("<!doctype html><title>WorkLocus</title><h1>WorkLocus</h1><p>{}</p>", path)).into_response();
    };
    let items: String = menu_for_role(&state.permissions, ADMIN_MENU, &who.role)
        .iter()
        .map(|m| format!("<li><a href=\"{}\">{}</a></li>", m.href, m.label))
        .collect();
    let name = who.full_name.as_deref().unwrap_or(who.id.as_str());
    Html(format!(
        "<!doctype html><title>WorkLocus</title><header>{} ({})</header><nav><ul>{}</ul></nav><main>{}</main>",
        name, who.initials(), items, path
    ))
    .into_response()
}

async fn proxy(state: &AppState, base: &Url, req: Request) -> Response {
    let target = req.uri().path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let url = match base.join(target) {
        Ok(u) => u,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("invalid path: {}", e)).into_response(),
    };
    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_PROXY_BODY).await {
        Ok(b) => b,
        Err(e) => return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response(),
    };
    let mut rb = state.http.request(parts.method.clone(), url).body(bytes);
    for (name, value) in parts.headers.iter() {
        if !HOP_BY_HOP.contains(&name.as_str()) {
            rb = rb.header(name.clone(), value.clone());
        }
    }
    let upstream = match rb.send().await {
        Ok(r) => r,
        Err(e) => {
            error!(target: "server", "upstream request failed: {}", e);
            return (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response();
        }
    };
    let status = upstream.status();
    let headers = upstream.headers().clone();
    let body = match upstream.bytes().await {
        Ok(b) => b,
        Err(e) => {
            error!(target: "server", "upstream body failed: {}", e);
            return (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response();
        }
    };
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    for (name, value) in headers.iter() {
        if !HOP_BY_HOP.contains(&name.as_str()) {
            resp.headers_mut().append(name.clone(), value.clone());
        }
    }
    if !resp.headers().contains_key(header::CONTENT_TYPE) {
        resp.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    }
    resp
}

/// Build the gate over the real backend transport.
pub fn build_gate(config: &ServerConfig) -> anyhow::Result<Arc<AuthorizationGate<ReqwestTransport>>> {
    let transport = ReqwestTransport::new(&config.api)
        .with_context(|| format!("while configuring backend at {}", config.api.base_url))?;
    let gate_cfg: GateConfig = config.gate.clone();
    Ok(Arc::new(AuthorizationGate::new(BackendApi::new(Arc::new(transport)), gate_cfg)))
}

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let authz = build_gate(&config)?;
    let upstream = match &config.frontend_url {
        Some(u) => Some(Url::parse(u).with_context(|| format!("invalid WORKLOCUS_FRONTEND_URL: {}", u))?),
        None => None,
    };
    let state = AppState::new(upstream, config.gate.permissions.clone())?;
    let app = router(authz, state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!(target: "server", "Starting gateway on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
