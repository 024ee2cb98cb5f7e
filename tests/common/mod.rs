#![allow(dead_code)]
//! Scripted in-process backend for integration tests.
//!
//! Accepts exactly one access credential at a time. `/api/auth/refresh-token`
//! issues `access-<n>` for the n-th successful renewal and makes it the only
//! accepted one. Refresh can be held until the test releases it, so tests can
//! pile requests up behind an in-flight renewal.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;

use worklocus::client::{ApiRequest, ApiResponse, AuthenticatedClient, Transport};
use worklocus::config::{LOGIN_PATH, REFRESH_PATH, WHOAMI_PATH};
use worklocus::error::{AppError, AppResult};
use worklocus::identity::{MemorySessionStore, Session, SharedSessionStore};

pub const RENEWAL: &str = "renew-0";
pub const PASSWORD: &str = "secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seen {
    pub method: String,
    pub path: String,
    pub bearer: Option<String>,
}

pub struct MockBackend {
    valid_access: Mutex<String>,
    role: Mutex<String>,
    refresh_fails: AtomicBool,
    hold_refresh: AtomicBool,
    refresh_release: Notify,
    slow_release: Notify,
    offline: AtomicBool,
    refresh_unreachable: AtomicBool,
    unusable_renewals: AtomicBool,
    issued: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub whoami_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    seen: Mutex<Vec<Seen>>,
}

impl MockBackend {
    pub fn new(role: &str) -> Arc<Self> {
        Arc::new(Self {
            valid_access: Mutex::new("access-0".to_string()),
            role: Mutex::new(role.to_string()),
            refresh_fails: AtomicBool::new(false),
            hold_refresh: AtomicBool::new(false),
            refresh_release: Notify::new(),
            slow_release: Notify::new(),
            offline: AtomicBool::new(false),
            refresh_unreachable: AtomicBool::new(false),
            unusable_renewals: AtomicBool::new(false),
            issued: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            whoami_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn set_role(&self, role: &str) { *self.role.lock() = role.to_string(); }
    pub fn fail_refresh(&self) { self.refresh_fails.store(true, Ordering::SeqCst); }
    pub fn go_offline(&self) { self.offline.store(true, Ordering::SeqCst); }
    /// Refresh calls fail without a response.
    pub fn drop_refresh_connections(&self) { self.refresh_unreachable.store(true, Ordering::SeqCst); }
    /// Refresh succeeds but the issued credential is rejected like the old one.
    pub fn issue_unusable_credentials(&self) { self.unusable_renewals.store(true, Ordering::SeqCst); }

    /// Park refresh calls until `release_refresh`.
    pub fn hold_refresh(&self) { self.hold_refresh.store(true, Ordering::SeqCst); }
    pub fn release_refresh(&self) { self.refresh_release.notify_one(); }

    /// `/api/slow` answers only after this.
    pub fn release_slow(&self) { self.slow_release.notify_one(); }

    pub fn refreshes(&self) -> usize { self.refresh_calls.load(Ordering::SeqCst) }

    pub fn seen(&self) -> Vec<Seen> { self.seen.lock().clone() }

    pub fn requests_to(&self, path: &str) -> usize { self.seen.lock().iter().filter(|s| s.path == path).count() }

    fn accepts(&self, bearer: &Option<String>) -> bool {
        bearer.as_deref() == Some(self.valid_access.lock().as_str())
    }

    fn identity(&self) -> Value {
        json!({"data": {"_id": "u1", "role": self.role.lock().clone(), "email": "an@worklocus.io", "full_name": "Nguyen Van An"}})
    }

    async fn refresh(&self, body: Option<&Value>) -> ApiResponse {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_refresh.load(Ordering::SeqCst) {
            self.refresh_release.notified().await;
        }
        let presented = body.and_then(|b| b.get("refreshToken")).and_then(|v| v.as_str());
        if self.refresh_fails.load(Ordering::SeqCst) || presented != Some(RENEWAL) {
            return ApiResponse::new(401, json!({"message": "refresh token expired"}));
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let access = format!("access-{}", n);
        if !self.unusable_renewals.load(Ordering::SeqCst) {
            *self.valid_access.lock() = access.clone();
        }
        ApiResponse::new(200, json!({"data": {"accessToken": access}}))
    }
}

impl Transport for MockBackend {
    async fn send(&self, request: &ApiRequest) -> AppResult<ApiResponse> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::io("connect", "connection refused"));
        }
        let path = request.route().to_string();
        self.seen.lock().push(Seen {
            method: request.method.to_string(),
            path: path.clone(),
            bearer: request.bearer.clone(),
        });
        if path == LOGIN_PATH {
            self.login_calls.fetch_add(1, Ordering::SeqCst);
            let password = request.body.as_ref().and_then(|b| b.get("password")).and_then(|v| v.as_str());
            if password != Some(PASSWORD) {
                return Ok(ApiResponse::new(401, json!({"message": "Invalid email or password"})));
            }
            let access = self.valid_access.lock().clone();
            return Ok(ApiResponse::new(200, json!({"data": {"accessToken": access, "refreshToken": RENEWAL}})));
        }
        if path == REFRESH_PATH {
            if self.refresh_unreachable.load(Ordering::SeqCst) {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                return Err(AppError::io("connect", "connection reset"));
            }
            return Ok(self.refresh(request.body.as_ref()).await);
        }
        if path == "/api/slow" {
            self.slow_release.notified().await;
        }
        if !self.accepts(&request.bearer) {
            return Ok(ApiResponse::new(401, json!({"message": "jwt expired"})));
        }
        if path == WHOAMI_PATH {
            self.whoami_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(ApiResponse::new(200, self.identity()));
        }
        if path == "/api/fail" {
            return Ok(ApiResponse::new(422, json!({"errors": [{"message": "name required"}, {"message": "hours invalid"}]})));
        }
        Ok(ApiResponse::new(200, json!({"data": {"path": path}})))
    }
}

/// The pair a client holds after its access credential has gone stale.
pub fn stale_session() -> Session {
    Session::new("stale-access", RENEWAL).expect("session")
}

pub fn valid_session() -> Session {
    Session::new("access-0", RENEWAL).expect("session")
}

pub fn client_with(backend: &Arc<MockBackend>, session: Option<Session>) -> (AuthenticatedClient<MockBackend>, SharedSessionStore) {
    let store: SharedSessionStore = match session {
        Some(s) => Arc::new(MemorySessionStore::with_session(s)),
        None => Arc::new(MemorySessionStore::new()),
    };
    (AuthenticatedClient::new(backend.clone(), store.clone()), store)
}

/// Poll `cond` until it holds, failing the test after two seconds.
pub async fn wait_for(what: &str, cond: impl Fn() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        if std::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
