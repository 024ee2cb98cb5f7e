//! Edge authorization gate: decides, before a protected page is served,
//! whether the caller may see it.

mod decision;
pub mod middleware;

pub use decision::{AuthorizationGate, DenyReason, GateDecision, GateOutcome};
pub use middleware::authorize;
