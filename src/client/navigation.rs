//! Page navigation through the gate from a client runtime that keeps its own
//! session store: send the stored pair as cookies, adopt whatever the gate
//! writes back.

use reqwest::header::{COOKIE, LOCATION};
use reqwest::Url;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::identity::cookies::{self, SessionChange};
use crate::identity::SessionStore;

#[derive(Debug, Clone)]
pub struct Navigation {
    pub status: u16,
    /// Redirect target when the gate sent the caller elsewhere.
    pub location: Option<String>,
    pub change: Option<SessionChange>,
    pub body: String,
}

impl Navigation {
    pub fn is_redirect(&self) -> bool { (300..400).contains(&self.status) }
}

/// HTTP client for navigations. Redirects are reported, not followed.
pub fn navigation_client() -> AppResult<reqwest::Client> {
    Ok(reqwest::Client::builder().redirect(reqwest::redirect::Policy::none()).build()?)
}

pub async fn navigate(
    http: &reqwest::Client,
    gate_base: &Url,
    path: &str,
    store: &dyn SessionStore,
) -> AppResult<Navigation> {
    let url = gate_base
        .join(path)
        .map_err(|e| AppError::UserInput { code: "invalid_path".into(), message: format!("{}: {}", path, e) })?;
    let current = store.read();
    let mut rb = http.get(url);
    if let Some(cookie) = current.as_ref().and_then(cookies::cookie_header) {
        rb = rb.header(COOKIE, cookie);
    }
    let resp = rb.send().await?;
    let status = resp.status().as_u16();
    let location = resp.headers().get(LOCATION).and_then(|v| v.to_str().ok()).map(str::to_string);
    let change = cookies::session_change_from_set_cookie(resp.headers(), current.as_ref());
    match &change {
        Some(SessionChange::Replaced(session)) => store.write(session.clone()),
        Some(SessionChange::Cleared) => store.clear(),
        None => {}
    }
    debug!(target: "client", path, status, ?location, changed = change.is_some(), "navigation");
    let body = resp.text().await?;
    Ok(Navigation { status, location, change, body })
}
