//! axum middleware running the gate in front of page delivery.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::uri::PathAndQuery;
use axum::http::Uri;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::{debug, info};

use super::decision::{AuthorizationGate, GateOutcome};
use crate::client::Transport;
use crate::identity::cookies;
use crate::identity::permissions::normalize_path;

/// Rewrite the request URI to its canonical path so the gate and every
/// handler behind it see the same page. `None` when no canonical form exists.
fn canonicalize(req: &mut Request) -> Option<String> {
    let path = normalize_path(req.uri().path())?;
    if path == req.uri().path() {
        return Some(path);
    }
    let target = match req.uri().query() {
        Some(q) => format!("{}?{}", path, q),
        None => path.clone(),
    };
    let mut parts = req.uri().clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(target.as_str()).ok()?);
    let uri = Uri::from_parts(parts).ok()?;
    debug!(target: "gate", from = %req.uri().path(), to = %path, "request path canonicalized");
    *req.uri_mut() = uri;
    Some(path)
}

pub async fn authorize<T: Transport>(
    State(gate): State<Arc<AuthorizationGate<T>>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(path) = canonicalize(&mut req) else {
        info!(target: "gate", path = %req.uri().path(), "refusing path without canonical form");
        return Redirect::temporary(&gate.config().entry_route).into_response();
    };
    if !gate.intercepts(&path) {
        return next.run(req).await;
    }
    let session = cookies::session_from_headers(req.headers());
    let decision = gate.evaluate(&path, session).await;
    let secure = gate.config().secure_cookies;
    if let Some(who) = decision.identity {
        req.extensions_mut().insert(who);
    }
    match decision.outcome {
        GateOutcome::Continue => next.run(req).await,
        GateOutcome::ContinueWithSession(session) => {
            cookies::replace_session_cookies(req.headers_mut(), &session);
            let mut resp = next.run(req).await;
            for v in cookies::set_session_cookies(&session, secure) {
                resp.headers_mut().append(SET_COOKIE, v);
            }
            resp
        }
        GateOutcome::Redirect { location } => Redirect::temporary(&location).into_response(),
        GateOutcome::RedirectAndClear { location } => {
            let mut resp = Redirect::temporary(&location).into_response();
            for v in cookies::clear_session_cookies(secure) {
                resp.headers_mut().append(SET_COOKIE, v);
            }
            resp
        }
    }
}
