//! Authenticated API client with single-flight credential renewal.
//!
//! Every call carries the current access credential. When the backend rejects
//! one with 401 the client moves from `Idle` to `Renewing`, spawns exactly one
//! renewal task and parks the failed request in the pending queue. Requests
//! that fail while a renewal is in flight join the same queue. When the
//! renewal settles the task dispatches the queue front to back: replaying
//! each request with the new credential (without waiting for one replay to
//! finish before sending the next), or rejecting each with `SessionExpired`
//! after clearing the session and signalling logout.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{decode_data, BackendApi};
use super::signal::{LogoutEvent, LogoutReason, LogoutSignal};
use super::transport::{ApiRequest, ApiResponse, Transport};
use crate::config::{LOGIN_PATH, WHOAMI_PATH};
use crate::error::{AppError, AppResult};
use crate::identity::{CallerIdentity, RoutePermissionTable, Session, SharedSessionStore};

struct PendingRequest {
    request: ApiRequest,
    reply: oneshot::Sender<AppResult<ApiResponse>>,
}

enum RenewalState {
    Idle,
    Renewing { queue: VecDeque<PendingRequest> },
}

enum Admission {
    /// A renewal already completed after this request went out.
    ReplayNow(ApiRequest, String),
    /// A renewal already failed after this request went out.
    Expired,
    Wait(oneshot::Receiver<AppResult<ApiResponse>>),
}

struct Inner<T: Transport> {
    transport: Arc<T>,
    backend: BackendApi<T>,
    store: SharedSessionStore,
    renewal: Mutex<RenewalState>,
    logout: LogoutSignal,
    renewals_started: AtomicU64,
}

pub struct AuthenticatedClient<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for AuthenticatedClient<T> {
    fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<T: Transport> AuthenticatedClient<T> {
    pub fn new(transport: Arc<T>, store: SharedSessionStore) -> Self {
        Self::with_signal(transport, store, LogoutSignal::new())
    }

    pub fn with_signal(transport: Arc<T>, store: SharedSessionStore, logout: LogoutSignal) -> Self {
        let backend = BackendApi::new(transport.clone());
        Self {
            inner: Arc::new(Inner {
                transport,
                backend,
                store,
                renewal: Mutex::new(RenewalState::Idle),
                logout,
                renewals_started: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &SharedSessionStore { &self.inner.store }

    pub fn backend(&self) -> &BackendApi<T> { &self.inner.backend }

    pub fn logout_signal(&self) -> &LogoutSignal { &self.inner.logout }

    pub fn subscribe_logout(&self) -> broadcast::Receiver<LogoutEvent> { self.inner.logout.subscribe() }

    pub fn is_renewing(&self) -> bool {
        matches!(*self.inner.renewal.lock(), RenewalState::Renewing { .. })
    }

    /// Requests parked behind the in-flight renewal.
    pub fn queued_requests(&self) -> usize {
        match &*self.inner.renewal.lock() {
            RenewalState::Renewing { queue } => queue.len(),
            RenewalState::Idle => 0,
        }
    }

    /// Renewals this client has started since it was built.
    pub fn renewals_started(&self) -> u64 { self.inner.renewals_started.load(Ordering::SeqCst) }

    /// Send `request` with the current access credential attached and recover
    /// transparently from an expired one.
    pub async fn execute(&self, request: ApiRequest) -> AppResult<ApiResponse> {
        let sent_with = self.inner.store.read().map(|s| s.access_credential);
        let outbound = request.clone().with_bearer(sent_with.clone());
        let response = self.inner.transport.send(&outbound).await?;
        if !response.is_authorization_failure() {
            return response.into_result();
        }
        // Wrong credentials on the login call are not an expiry.
        if request.route() == LOGIN_PATH {
            let message = response.message().unwrap_or_else(|| "Invalid email or password".to_string());
            return Err(AppError::CredentialInvalid { code: "invalid_credentials".into(), message });
        }
        debug!(target: "client", path = %request.route(), "access credential rejected");
        match self.admit(request, sent_with) {
            Admission::ReplayNow(request, access) => replay(self.inner.transport.as_ref(), request, &access).await,
            Admission::Expired => Err(AppError::expired()),
            // The renewal task always answers; a dropped sender means it died.
            Admission::Wait(rx) => rx.await.unwrap_or_else(|_| Err(AppError::expired())),
        }
    }

    fn admit(&self, request: ApiRequest, sent_with: Option<String>) -> Admission {
        let mut state = self.inner.renewal.lock();
        if matches!(*state, RenewalState::Idle) {
            match self.inner.store.read() {
                Some(current) if sent_with.as_deref() != Some(current.access_credential.as_str()) => {
                    debug!(target: "client", path = %request.route(), "credential already renewed; replaying");
                    return Admission::ReplayNow(request, current.access_credential);
                }
                // Sent with a session that has since been cleared: already logged out.
                None if sent_with.is_some() => {
                    debug!(target: "client", path = %request.route(), "session cleared while in flight");
                    return Admission::Expired;
                }
                _ => {}
            }
        }
        let (reply, rx) = oneshot::channel();
        let pending = PendingRequest { request, reply };
        match &mut *state {
            RenewalState::Renewing { queue } => {
                queue.push_back(pending);
                debug!(target: "client", queued = queue.len(), "renewal in flight; request queued");
            }
            RenewalState::Idle => {
                let mut queue = VecDeque::new();
                queue.push_back(pending);
                *state = RenewalState::Renewing { queue };
                self.inner.renewals_started.fetch_add(1, Ordering::SeqCst);
                info!(target: "client", "access credential expired; starting renewal");
                tokio::spawn(run_renewal(self.inner.clone()));
            }
        }
        Admission::Wait(rx)
    }

    pub async fn get(&self, path: &str) -> AppResult<ApiResponse> { self.execute(ApiRequest::get(path)).await }
    pub async fn post(&self, path: &str, body: Value) -> AppResult<ApiResponse> { self.execute(ApiRequest::post(path, body)).await }
    pub async fn patch(&self, path: &str, body: Value) -> AppResult<ApiResponse> { self.execute(ApiRequest::patch(path, body)).await }
    pub async fn put(&self, path: &str, body: Value) -> AppResult<ApiResponse> { self.execute(ApiRequest::put(path, body)).await }
    pub async fn delete(&self, path: &str) -> AppResult<ApiResponse> { self.execute(ApiRequest::delete(path)).await }

    /// GET `path` and decode the envelope's `data`.
    pub async fn get_data<D: DeserializeOwned>(&self, path: &str) -> AppResult<D> {
        let resp = self.get(path).await?;
        decode_data(&resp, path)
    }

    /// Log in and store the issued pair.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<Session> {
        let session = self.inner.backend.login(email, password).await?;
        self.inner.store.write(session.clone());
        info!(target: "client", "signed in");
        Ok(session)
    }

    pub async fn current_user(&self) -> AppResult<CallerIdentity> {
        let resp = self.execute(ApiRequest::get(WHOAMI_PATH)).await?;
        decode_data(&resp, "whoami")
    }

    /// Log in, identify the caller and keep the session only if the caller's
    /// role may enter some route of `permissions`.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        permissions: &RoutePermissionTable,
    ) -> AppResult<CallerIdentity> {
        self.login(email, password).await?;
        let who = match self.current_user().await {
            Ok(who) => who,
            Err(e) => {
                self.inner.store.clear();
                return Err(e);
            }
        };
        if !permissions.grants_any(&who.role) {
            warn!(target: "client", role = %who.role, "signed-in role has no console access");
            self.inner.store.clear();
            return Err(AppError::Forbidden {
                code: "forbidden".into(),
                message: "You do not have access to the administration console.".into(),
            });
        }
        Ok(who)
    }

    /// Clear the session and tell the application.
    pub fn logout(&self) {
        self.inner.store.clear();
        self.inner.logout.publish(LogoutReason::UserInitiated);
    }
}

async fn replay<T: Transport>(transport: &T, request: ApiRequest, access: &str) -> AppResult<ApiResponse> {
    let outbound = request.with_bearer(Some(access.to_string()));
    let response = transport.send(&outbound).await?;
    if response.is_authorization_failure() {
        warn!(target: "client", path = %outbound.route(), "replayed request rejected again");
    }
    response.into_result()
}

async fn renew<T: Transport>(inner: &Inner<T>) -> AppResult<String> {
    let Some(session) = inner.store.read() else {
        return Err(AppError::session_expired("no_session", "No renewal credential is available."));
    };
    let access = inner.backend.refresh(&session.renewal_credential).await?;
    inner.store.write(session.renewed(access.clone()));
    Ok(access)
}

/// Returns the client to `Idle` and hands back whatever was queued.
fn take_queue<T: Transport>(inner: &Inner<T>) -> VecDeque<PendingRequest> {
    match std::mem::replace(&mut *inner.renewal.lock(), RenewalState::Idle) {
        RenewalState::Renewing { queue } => queue,
        RenewalState::Idle => VecDeque::new(),
    }
}

/// Settles the renewal if the task is dropped before doing so itself.
struct RenewalReset<T: Transport> {
    inner: Arc<Inner<T>>,
    settled: bool,
}

impl<T: Transport> RenewalReset<T> {
    fn settle(&mut self) -> VecDeque<PendingRequest> {
        self.settled = true;
        take_queue(&self.inner)
    }
}

impl<T: Transport> Drop for RenewalReset<T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        for pending in take_queue(&self.inner) {
            let _ = pending.reply.send(Err(AppError::expired()));
        }
    }
}

async fn run_renewal<T: Transport>(inner: Arc<Inner<T>>) {
    let mut reset = RenewalReset { inner: inner.clone(), settled: false };
    let outcome = AssertUnwindSafe(renew(&inner)).catch_unwind().await.unwrap_or_else(|_| {
        error!(target: "client", "renewal task panicked");
        Err(AppError::internal("renewal_panicked", "Credential renewal failed unexpectedly."))
    });
    match outcome {
        Ok(access) => {
            let queue = reset.settle();
            info!(target: "client", replaying = queue.len(), "renewal succeeded");
            // join_all polls in queue order, so replays go out FIFO while each
            // caller is answered as soon as its own response arrives.
            let transport = inner.transport.as_ref();
            let access = access.as_str();
            let replays = queue.into_iter().map(|pending| async move {
                let result = replay(transport, pending.request, access).await;
                let _ = pending.reply.send(result);
            });
            join_all(replays).await;
        }
        Err(e) => {
            warn!(target: "client", error = %e, "renewal failed; clearing session");
            // Cleared before leaving `Renewing` so no request can slip through with the dead pair.
            inner.store.clear();
            let queue = reset.settle();
            for pending in queue {
                let _ = pending.reply.send(Err(AppError::expired()));
            }
            inner.logout.publish(LogoutReason::SessionExpired);
        }
    }
}
