//! Gateway router over a real socket: redirects, cookie rewrites, and a client
//! runtime absorbing them through `navigate`.

mod common;

use std::sync::Arc;

use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use reqwest::Url;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use worklocus::client::{navigate, navigation_client, BackendApi};
use worklocus::config::GateConfig;
use worklocus::error::AppError;
use worklocus::gate::AuthorizationGate;
use worklocus::identity::cookies::SessionChange;
use worklocus::identity::{MemorySessionStore, SessionStore, DEFAULT_ROUTE_PERMISSIONS};
use worklocus::server::{router, AppState};

use common::{stale_session, MockBackend};

struct Guard(JoinHandle<()>);
impl Drop for Guard { fn drop(&mut self) { self.0.abort(); } }

async fn serve_on_ephemeral(app: axum::Router) -> (Guard, Url) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind 127.0.0.1:0");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("server task error: {e:?}");
        }
    });
    (Guard(handle), Url::parse(&format!("http://{}/", addr)).unwrap())
}

// Serve the gateway (built-in pages, no upstream) on an ephemeral localhost port.
async fn start_gateway(backend: &Arc<MockBackend>) -> (Guard, Url) {
    start_gateway_with(backend, None).await
}

async fn start_gateway_with(backend: &Arc<MockBackend>, upstream: Option<Url>) -> (Guard, Url) {
    let gate = Arc::new(AuthorizationGate::new(BackendApi::new(backend.clone()), GateConfig::default()));
    let state = AppState::new(upstream, DEFAULT_ROUTE_PERMISSIONS.clone()).expect("state");
    serve_on_ephemeral(router(gate, state)).await
}

// Page renderer stand-in that answers with the path it was asked for.
async fn start_echo_upstream() -> (Guard, Url) {
    let app = axum::Router::new().fallback(|uri: axum::http::Uri| async move { format!("served {}", uri.path()) });
    serve_on_ephemeral(app).await
}

// reqwest normalizes dot segments before sending, so these go out by hand.
async fn raw_get(base: &Url, target: &str, cookie: Option<&str>) -> (u16, String) {
    let addr = format!("{}:{}", base.host_str().unwrap(), base.port().unwrap());
    let mut stream = TcpStream::connect(addr).await.expect("connect gateway");
    let mut req = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n", target);
    if let Some(c) = cookie {
        req.push_str(&format!("Cookie: {}\r\n", c));
    }
    req.push_str("\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8_lossy(&raw).into_owned();
    let status = text.split_whitespace().nth(1).and_then(|s| s.parse().ok()).unwrap_or(0);
    (status, text)
}

fn set_cookies(resp: &reqwest::Response) -> Vec<String> {
    resp.headers().get_all(SET_COOKIE).iter().filter_map(|v| v.to_str().ok()).map(str::to_string).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn healthz_bypasses_the_gate() {
    let backend = MockBackend::new("admin");
    let (_g, base) = start_gateway(&backend).await;
    let http = navigation_client().unwrap();

    let resp = http.get(base.join("/healthz").unwrap()).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(resp.text().await.unwrap(), "ok");
    assert!(backend.seen().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn anonymous_navigation_is_redirected() {
    let backend = MockBackend::new("admin");
    let (_g, base) = start_gateway(&backend).await;
    let http = navigation_client().unwrap();

    let resp = http.get(base.join("/admin/payroll").unwrap()).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 307);
    assert_eq!(resp.headers().get(LOCATION).unwrap(), "/");
    assert!(set_cookies(&resp).is_empty());

    let resp = http.get(base.join("/").unwrap()).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn renewed_session_is_written_back() {
    let backend = MockBackend::new("admin");
    let (_g, base) = start_gateway(&backend).await;
    let http = navigation_client().unwrap();

    let resp = http
        .get(base.join("/admin/payroll").unwrap())
        .header(COOKIE, "theme=dark; accessToken=stale-access; refreshToken=renew-0")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let cookies = set_cookies(&resp);
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=access-1;")), "{:?}", cookies);
    assert!(cookies.iter().any(|c| c.starts_with("refreshToken=renew-0;")), "{:?}", cookies);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Payroll"));
    assert!(body.contains("(NA)"));
    assert_eq!(backend.refreshes(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_renewal_deletes_both_cookies() {
    let backend = MockBackend::new("admin");
    backend.fail_refresh();
    let (_g, base) = start_gateway(&backend).await;
    let http = navigation_client().unwrap();

    let resp = http
        .get(base.join("/admin").unwrap())
        .header(COOKIE, "accessToken=stale-access; refreshToken=renew-0")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 307);
    assert_eq!(resp.headers().get(LOCATION).unwrap(), "/");
    let cookies = set_cookies(&resp);
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().all(|c| c.contains("Expires=Thu, 01 Jan 1970")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn navigation_keeps_the_client_store_in_step() {
    let backend = MockBackend::new("project_manager");
    let (_g, base) = start_gateway(&backend).await;
    let http = navigation_client().unwrap();
    let store = MemorySessionStore::with_session(stale_session());

    let nav = navigate(&http, &base, "/admin/timekeeping", &store).await.unwrap();
    assert_eq!(nav.status, 200);
    assert!(matches!(nav.change, Some(SessionChange::Replaced(_))));
    assert_eq!(store.read().unwrap().access_credential, "access-1");
    // Project managers only see their sections.
    assert!(nav.body.contains("Timekeeping"));
    assert!(!nav.body.contains("Payroll"));

    let nav = navigate(&http, &base, "/admin/payroll", &store).await.unwrap();
    assert!(nav.is_redirect());
    assert_eq!(nav.location.as_deref(), Some("/"));
    assert_eq!(nav.change, Some(SessionChange::Cleared));
    assert!(store.read().is_none());
    assert_eq!(backend.refreshes(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dot_segments_cannot_slip_past_the_gate() {
    let backend = MockBackend::new("project_manager");
    let (_u, upstream) = start_echo_upstream().await;
    let (_g, base) = start_gateway_with(&backend, Some(upstream)).await;
    let pm = Some("accessToken=access-0; refreshToken=renew-0");

    let (status, text) = raw_get(&base, "/x/../admin/payroll", None).await;
    assert_eq!(status, 307, "{}", text);
    assert!(!text.contains("served"));

    for target in [
        "/admin/project/../payroll",
        "/admin/project/%2e%2e/payroll",
        "/admin/project/%2E./payroll",
        "/%61dmin/payroll",
    ] {
        let (status, text) = raw_get(&base, target, pm).await;
        assert_eq!(status, 307, "{} -> {}", target, text);
        assert!(text.contains("Expires=Thu, 01 Jan 1970"), "{}", text);
        assert!(!text.contains("served"));
    }

    let (status, text) = raw_get(&base, "/admin%2Fpayroll", pm).await;
    assert_eq!(status, 307, "{}", text);
    assert!(!text.contains("served"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upstream_sees_the_path_the_gate_judged() {
    let backend = MockBackend::new("project_manager");
    let (_u, upstream) = start_echo_upstream().await;
    let (_g, base) = start_gateway_with(&backend, Some(upstream)).await;
    let pm = Some("accessToken=access-0; refreshToken=renew-0");

    let (status, text) = raw_get(&base, "/admin/./task/../project/7?tab=hours", pm).await;
    assert_eq!(status, 200, "{}", text);
    assert!(text.contains("served /admin/project/7"), "{}", text);

    let (status, text) = raw_get(&base, "/admin/task/%2E%2E/project", pm).await;
    assert_eq!(status, 200, "{}", text);
    assert!(text.contains("served /admin/project"), "{}", text);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cut_off_page_body_is_an_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = sock.read(&mut buf).await.unwrap();
        let head = "HTTP/1.1 200 OK\r\nContent-Length: 100\r\nSet-Cookie: accessToken=access-9; Path=/\r\n\r\n";
        sock.write_all(head.as_bytes()).await.unwrap();
        sock.write_all(b"<main>partial").await.unwrap();
    });

    let http = navigation_client().unwrap();
    let store = MemorySessionStore::with_session(stale_session());
    let err = navigate(&http, &base, "/admin", &store).await.unwrap_err();
    assert!(matches!(err, AppError::Io { .. } | AppError::Internal { .. }), "{:?}", err);
    // Headers arrived whole, so the renewed credential is still kept.
    assert_eq!(store.read().unwrap().access_credential, "access-9");
    server.await.unwrap();
}
