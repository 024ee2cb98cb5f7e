//! Cookie form of the session.
//!
//! The cookie pair `accessToken` / `refreshToken` is the medium both sides
//! agree on: the gate reads it from `Cookie` and answers with `Set-Cookie`,
//! and the client runtime sends its stored pair the same way when it navigates
//! through the gate.

use axum::http::{header, HeaderMap, HeaderValue};

use super::session::Session;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const RENEWAL_COOKIE: &str = "refreshToken";

/// How a `Set-Cookie` batch changes the session a client holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    Replaced(Session),
    Cleared,
}

pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(header::COOKIE).iter() {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k.trim() == name {
                    return urlencoding::decode(v.trim()).ok().map(|c| c.into_owned());
                }
            }
        }
    }
    None
}

/// Session carried by a request, if both cookies are present and non-empty.
pub fn session_from_headers(headers: &HeaderMap) -> Option<Session> {
    let access = parse_cookie(headers, ACCESS_COOKIE)?;
    let renewal = parse_cookie(headers, RENEWAL_COOKIE)?;
    Session::new(access, renewal)
}

/// `Cookie` request header value carrying the session.
pub fn cookie_header(session: &Session) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{}={}; {}={}",
        ACCESS_COOKIE,
        urlencoding::encode(&session.access_credential),
        RENEWAL_COOKIE,
        urlencoding::encode(&session.renewal_credential)
    ))
    .ok()
}

/// Rewrite the request's `Cookie` header so downstream handlers see `session`
/// instead of the pair the caller sent. Other cookies are kept.
pub fn replace_session_cookies(headers: &mut HeaderMap, session: &Session) {
    let mut parts: Vec<String> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(str::trim)
        .filter(|p| {
            let name = p.split_once('=').map(|(k, _)| k.trim()).unwrap_or(*p);
            !p.is_empty() && name != ACCESS_COOKIE && name != RENEWAL_COOKIE
        })
        .map(str::to_string)
        .collect();
    if let Some(own) = cookie_header(session).and_then(|v| v.to_str().map(str::to_string).ok()) {
        parts.push(own);
    }
    headers.remove(header::COOKIE);
    if let Ok(v) = HeaderValue::from_str(&parts.join("; ")) {
        headers.insert(header::COOKIE, v);
    }
}

fn attributes(secure: bool) -> &'static str {
    if secure { "Path=/; HttpOnly; Secure; SameSite=Lax" } else { "Path=/; HttpOnly; SameSite=Lax" }
}

/// `Set-Cookie` values writing both credentials together.
pub fn set_session_cookies(session: &Session, secure: bool) -> Vec<HeaderValue> {
    [(ACCESS_COOKIE, &session.access_credential), (RENEWAL_COOKIE, &session.renewal_credential)]
        .into_iter()
        .filter_map(|(name, value)| {
            HeaderValue::from_str(&format!("{}={}; {}", name, urlencoding::encode(value), attributes(secure))).ok()
        })
        .collect()
}

/// `Set-Cookie` values deleting both credentials together.
pub fn clear_session_cookies(secure: bool) -> Vec<HeaderValue> {
    [ACCESS_COOKIE, RENEWAL_COOKIE]
        .into_iter()
        .map(|name| {
            HeaderValue::from_str(&format!(
                "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; {}",
                name,
                attributes(secure)
            ))
            .unwrap_or_else(|_| deletion_fallback(name))
        })
        .collect()
}

fn deletion_fallback(name: &str) -> HeaderValue {
    if name == RENEWAL_COOKIE {
        HeaderValue::from_static("refreshToken=deleted; Max-Age=0; Path=/")
    } else {
        HeaderValue::from_static("accessToken=deleted; Max-Age=0; Path=/")
    }
}

fn is_deletion(attrs: &str) -> bool {
    attrs.split(';').any(|a| {
        let a = a.trim();
        a.eq_ignore_ascii_case("Max-Age=0") || a.to_ascii_lowercase().starts_with("expires=thu, 01 jan 1970")
    })
}

/// Interpret the session cookies of a gate response against the pair the
/// client currently holds. Deleting either cookie clears the whole session;
/// a partial update is merged so the result always holds both credentials.
pub fn session_change_from_set_cookie(headers: &HeaderMap, current: Option<&Session>) -> Option<SessionChange> {
    let mut access: Option<String> = None;
    let mut renewal: Option<String> = None;
    for raw in headers.get_all(header::SET_COOKIE).iter() {
        let Ok(s) = raw.to_str() else { continue };
        let (pair, attrs) = s.split_once(';').unwrap_or((s, ""));
        let Some((name, value)) = pair.split_once('=') else { continue };
        let name = name.trim();
        if name != ACCESS_COOKIE && name != RENEWAL_COOKIE {
            continue;
        }
        if is_deletion(attrs) {
            return Some(SessionChange::Cleared);
        }
        let value = urlencoding::decode(value.trim()).ok()?.into_owned();
        if name == ACCESS_COOKIE { access = Some(value) } else { renewal = Some(value) }
    }
    if access.is_none() && renewal.is_none() {
        return None;
    }
    let access = access.or_else(|| current.map(|s| s.access_credential.clone()))?;
    let renewal = renewal.or_else(|| current.map(|s| s.renewal_credential.clone()))?;
    Session::new(access, renewal).map(SessionChange::Replaced)
}
