use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::client::{BackendApi, Transport};
use crate::config::GateConfig;
use crate::identity::permissions::{normalize_path, path_segments};
use crate::identity::{CallerIdentity, Session};

/// What the hosting runtime should do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Serve the page; the session is unchanged.
    Continue,
    /// Serve the page and store the renewed session on the response.
    ContinueWithSession(Session),
    /// Send the caller elsewhere, keeping the session.
    Redirect { location: String },
    /// Send the caller elsewhere and delete the session.
    RedirectAndClear { location: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NoSession,
    RenewalFailed,
    IdentityUnavailable,
    RoleNotPermitted,
    /// The path does not reduce to a canonical form.
    MalformedPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub outcome: GateOutcome,
    /// The caller, when the gate resolved one. Lives for this navigation only.
    pub identity: Option<CallerIdentity>,
    pub denied: Option<DenyReason>,
}

impl GateDecision {
    fn allow(outcome: GateOutcome, identity: Option<CallerIdentity>) -> Self {
        Self { outcome, identity, denied: None }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self.outcome, GateOutcome::Continue | GateOutcome::ContinueWithSession(_))
    }
}

/// Per-navigation authorization: session present, identity resolvable (with
/// at most one renewal), role permitted for the path.
pub struct AuthorizationGate<T: Transport> {
    backend: BackendApi<T>,
    config: Arc<GateConfig>,
}

impl<T: Transport> AuthorizationGate<T> {
    pub fn new(backend: BackendApi<T>, config: GateConfig) -> Self {
        Self { backend, config: Arc::new(config) }
    }

    pub fn config(&self) -> &GateConfig { &self.config }

    pub fn is_entry_route(&self, path: &str) -> bool {
        path_segments(path) == path_segments(&self.config.entry_route)
    }

    /// Whether navigations to `path` pass through the gate at all. A path
    /// without a canonical form is always intercepted.
    pub fn intercepts(&self, path: &str) -> bool {
        let Some(path) = normalize_path(path) else { return true };
        if self.is_entry_route(&path) {
            return true;
        }
        let segs = path_segments(&path);
        self.config.protected_prefixes.iter().any(|prefix| {
            let p = path_segments(prefix);
            segs.len() >= p.len() && p.iter().zip(&segs).all(|(a, b)| a == b)
        })
    }

    fn deny(&self, path: &str, reason: DenyReason, clear: bool) -> GateDecision {
        let location = self.config.entry_route.clone();
        info!(target: "gate", path, ?reason, clear, "navigation denied");
        let outcome = if clear { GateOutcome::RedirectAndClear { location } } else { GateOutcome::Redirect { location } };
        GateDecision { outcome, identity: None, denied: Some(reason) }
    }

    /// Decide a navigation. `path` is judged in its canonical form, so dot
    /// segments cannot step out of the rule that governs the final page.
    pub async fn evaluate(&self, path: &str, session: Option<Session>) -> GateDecision {
        let Some(canonical) = normalize_path(path) else {
            return self.deny(path, DenyReason::MalformedPath, false);
        };
        let path = canonical.as_str();
        if self.is_entry_route(path) {
            return match session {
                // Never show the sign-in page to a signed-in caller.
                Some(_) => GateDecision::allow(GateOutcome::Redirect { location: self.config.landing_route.clone() }, None),
                None => GateDecision::allow(GateOutcome::Continue, None),
            };
        }
        let Some(session) = session else {
            return self.deny(path, DenyReason::NoSession, false);
        };

        let (identity, renewed) = match self.backend.whoami(&session.access_credential).await {
            Ok(who) => (who, None),
            Err(e) if e.is_authorization_failure() => {
                debug!(target: "gate", path, "access credential rejected; renewing once");
                let access = match self.backend.refresh(&session.renewal_credential).await {
                    Ok(access) => access,
                    Err(e) => {
                        warn!(target: "gate", error = %e, "renewal failed");
                        return self.deny(path, DenyReason::RenewalFailed, true);
                    }
                };
                let renewed = session.renewed(access);
                match self.backend.whoami(&renewed.access_credential).await {
                    Ok(who) => (who, Some(renewed)),
                    Err(e) => {
                        warn!(target: "gate", error = %e, "identity still unavailable after renewal");
                        return self.deny(path, DenyReason::RenewalFailed, true);
                    }
                }
            }
            Err(e) => {
                warn!(target: "gate", error = %e, "identity lookup failed");
                return self.deny(path, DenyReason::IdentityUnavailable, true);
            }
        };

        let rule = self.config.permissions.lookup(path);
        let permitted = rule.map(|r| r.allows(&identity.role)).unwrap_or(false);
        debug!(
            target: "gate",
            path,
            role = %identity.role,
            rule = rule.map(|r| r.prefix.as_str()).unwrap_or("<none>"),
            permitted,
            "permission check"
        );
        if !permitted {
            return self.deny(path, DenyReason::RoleNotPermitted, true);
        }
        let outcome = match renewed {
            Some(s) => GateOutcome::ContinueWithSession(s),
            None => GateOutcome::Continue,
        };
        GateDecision::allow(outcome, Some(identity))
    }
}
